//! State-file provisioning back-end.
//!
//! Persists hosts as JSON so that separate CLI invocations see each other's
//! work. Every operation is a read-modify-write of the whole file under a
//! process-local lock; writes go to a temporary file in the same directory
//! and are renamed into place.

use super::{BackendError, BackendResult, Operation, ProviderErrorKind, ProvisioningBackend};
use crate::drivers::{Capabilities, DriverRegistry};
use crate::machine::{DriverOptions, ObservedHost};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const STATE_VERSION: u32 = 1;

/// On-disk layout of the state file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub machines: IndexMap<String, ObservedHost>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            machines: IndexMap::new(),
        }
    }
}

/// Hosts persisted to a JSON file
pub struct FileBackend {
    path: PathBuf,
    registry: DriverRegistry,
    auto_start: bool,
    force_remove: bool,
    lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            registry: DriverRegistry::with_builtins(),
            auto_start: true,
            force_remove: false,
            lock: Mutex::new(()),
        }
    }

    /// Default location: `~/.rustible-machine/machines.json`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".rustible-machine"))
            .unwrap_or_else(|| PathBuf::from(".rustible-machine"))
            .join("machines.json")
    }

    pub fn with_registry(mut self, registry: DriverRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn with_force_remove(mut self, force_remove: bool) -> Self {
        self.force_remove = force_remove;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state file. A missing file is an empty state.
    pub fn load(&self) -> BackendResult<StateFile> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StateFile::default()),
            Err(e) => return Err(self.io_error("read", e)),
        };
        if content.trim().is_empty() {
            return Ok(StateFile::default());
        }
        serde_json::from_str(&content).map_err(|e| {
            BackendError::Unreachable(format!(
                "corrupt state file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn save(&self, state: &mut StateFile) -> BackendResult<()> {
        state.updated_at = Utc::now();
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| self.io_error("create directory for", e))?;

        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| BackendError::Unreachable(format!("serialize state: {}", e)))?;
        let mut tmp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| self.io_error("write", e))?;
        tmp.write_all(&json).map_err(|e| self.io_error("write", e))?;
        tmp.persist(&self.path)
            .map_err(|e| self.io_error("replace", e.error))?;
        trace!(path = %self.path.display(), machines = state.machines.len(), "state saved");
        Ok(())
    }

    fn io_error(&self, action: &str, error: std::io::Error) -> BackendError {
        BackendError::Unreachable(format!(
            "failed to {} state file {}: {}",
            action,
            self.path.display(),
            error
        ))
    }

    /// Run `f` against the loaded state and save it if `f` succeeds.
    fn transact<T>(
        &self,
        f: impl FnOnce(&mut StateFile) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let _guard = self.lock.lock();
        let mut state = self.load()?;
        let out = f(&mut state)?;
        self.save(&mut state)?;
        Ok(out)
    }

    fn not_found(operation: Operation, name: &str) -> BackendError {
        BackendError::provider(
            operation,
            ProviderErrorKind::NotFound,
            format!("machine '{}' does not exist", name),
        )
    }
}

#[async_trait]
impl ProvisioningBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn describe(&self, name: &str) -> BackendResult<Option<ObservedHost>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.machines.get(name).cloned())
    }

    async fn create(
        &self,
        name: &str,
        driver: &str,
        options: &DriverOptions,
    ) -> BackendResult<ObservedHost> {
        let schema = self.registry.get(driver).ok_or_else(|| {
            BackendError::provider(
                Operation::Create,
                ProviderErrorKind::InvalidOptions,
                format!("unknown driver '{}'", driver),
            )
        })?;
        let options = schema.normalize(options).map_err(|e| {
            BackendError::provider(Operation::Create, ProviderErrorKind::InvalidOptions, e.to_string())
        })?;
        let auto_start = self.auto_start;

        self.transact(|state| {
            if state.machines.contains_key(name) {
                return Err(BackendError::provider(
                    Operation::Create,
                    ProviderErrorKind::Rejected,
                    format!("machine '{}' already exists", name),
                ));
            }
            let host = ObservedHost::new(name, driver)
                .with_options(options)
                .with_running(auto_start);
            state.machines.insert(name.to_string(), host.clone());
            debug!(backend = "file", host = name, driver, "machine created");
            Ok(host)
        })
    }

    async fn remove(&self, name: &str) -> BackendResult<()> {
        let force_remove = self.force_remove;
        self.transact(|state| {
            let host = state
                .machines
                .get(name)
                .ok_or_else(|| Self::not_found(Operation::Remove, name))?;
            if host.running && !force_remove {
                return Err(BackendError::provider(
                    Operation::Remove,
                    ProviderErrorKind::HostRunning,
                    format!("machine '{}' is running", name),
                ));
            }
            state.machines.shift_remove(name);
            Ok(())
        })
    }

    async fn start(&self, name: &str) -> BackendResult<()> {
        self.transact(|state| {
            let host = state
                .machines
                .get_mut(name)
                .ok_or_else(|| Self::not_found(Operation::Start, name))?;
            if host.running {
                return Err(BackendError::provider(
                    Operation::Start,
                    ProviderErrorKind::AlreadyRunning,
                    format!("machine '{}' is already running", name),
                ));
            }
            host.running = true;
            Ok(())
        })
    }

    async fn stop(&self, name: &str) -> BackendResult<()> {
        self.transact(|state| {
            let host = state
                .machines
                .get_mut(name)
                .ok_or_else(|| Self::not_found(Operation::Stop, name))?;
            if !host.running {
                return Err(BackendError::provider(
                    Operation::Stop,
                    ProviderErrorKind::AlreadyStopped,
                    format!("machine '{}' is already stopped", name),
                ));
            }
            host.running = false;
            Ok(())
        })
    }

    async fn update(&self, name: &str, changes: &DriverOptions) -> BackendResult<ObservedHost> {
        self.transact(|state| {
            let host = state
                .machines
                .get_mut(name)
                .ok_or_else(|| Self::not_found(Operation::Update, name))?;
            let capabilities = self
                .registry
                .capabilities(&host.driver_name)
                .unwrap_or_default();
            if let Some(field) = changes.keys().find(|k| !capabilities.is_updatable(k)) {
                return Err(BackendError::provider(
                    Operation::Update,
                    ProviderErrorKind::ImmutableField,
                    format!(
                        "'{}' cannot be changed on a live {} machine",
                        field, host.driver_name
                    ),
                ));
            }
            for (key, value) in changes {
                host.driver_options.insert(key.clone(), value.clone());
            }
            host.config_version += 1;
            Ok(host.clone())
        })
    }

    async fn capabilities(&self, driver: &str) -> BackendResult<Capabilities> {
        self.registry.capabilities(driver).map_err(|e| {
            BackendError::provider(
                Operation::Capabilities,
                ProviderErrorKind::InvalidOptions,
                e.to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn generic_options() -> DriverOptions {
        serde_json::from_value(json!({"ip_address": "10.0.0.5"})).unwrap()
    }

    #[tokio::test]
    async fn test_state_survives_new_backend_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("machines.json");

        let backend = FileBackend::new(&path);
        backend.create("m1", "generic", &generic_options()).await.unwrap();
        assert!(path.exists());

        let reopened = FileBackend::new(&path);
        let host = reopened.describe("m1").await.unwrap().unwrap();
        assert_eq!(host.driver_name, "generic");
        assert!(host.running);
    }

    #[tokio::test]
    async fn test_missing_and_empty_files_are_empty_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("machines.json");
        let backend = FileBackend::new(&path);
        assert!(backend.describe("m1").await.unwrap().is_none());

        fs::write(&path, "").unwrap();
        assert!(backend.describe("m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_unreachable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("machines.json");
        fs::write(&path, "{not json").unwrap();

        let err = FileBackend::new(&path).describe("m1").await.unwrap_err();
        assert!(matches!(err, BackendError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("machines.json")).with_auto_start(false);

        backend.create("m1", "generic", &generic_options()).await.unwrap();
        backend.start("m1").await.unwrap();
        assert_eq!(
            backend.start("m1").await.unwrap_err().provider_kind(),
            Some(ProviderErrorKind::AlreadyRunning)
        );
        assert_eq!(
            backend.remove("m1").await.unwrap_err().provider_kind(),
            Some(ProviderErrorKind::HostRunning)
        );

        let changes: DriverOptions = serde_json::from_value(json!({"ssh_port": "2222"})).unwrap();
        let host = backend.update("m1", &changes).await.unwrap();
        assert_eq!(host.config_version, 2);

        backend.stop("m1").await.unwrap();
        backend.remove("m1").await.unwrap();
        assert!(backend.describe("m1").await.unwrap().is_none());
        assert!(backend.load().unwrap().machines.is_empty());
    }
}
