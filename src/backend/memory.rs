//! In-memory provisioning back-end.
//!
//! Keeps hosts in a map guarded by a `parking_lot` lock. Behaviour mirrors
//! what real providers do closely enough to exercise the engine: hosts may
//! auto-start on create, removing a running host may be refused, and only
//! options marked updatable in the capability table can change in place.
//!
//! Faults can be injected per operation with [`MemoryBackend::fail_next`],
//! and every call is recorded in order so tests can assert on the exact
//! conversation between engine and back-end.

use super::{BackendError, BackendResult, Operation, ProviderErrorKind, ProvisioningBackend};
use crate::drivers::{Capabilities, DriverRegistry};
use crate::machine::{DriverOptions, ObservedHost};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{debug, trace};

/// Hosts held in memory
pub struct MemoryBackend {
    hosts: RwLock<HashMap<String, ObservedHost>>,
    registry: DriverRegistry,
    capability_overrides: HashMap<String, Capabilities>,
    auto_start: bool,
    force_remove: bool,
    latency: Option<Duration>,
    faults: Mutex<HashMap<Operation, VecDeque<BackendError>>>,
    calls: Mutex<Vec<Operation>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Empty back-end using the built-in driver catalog. Hosts start on
    /// create and running hosts cannot be removed.
    pub fn new() -> Self {
        Self {
            hosts: RwLock::new(HashMap::new()),
            registry: DriverRegistry::with_builtins(),
            capability_overrides: HashMap::new(),
            auto_start: true,
            force_remove: false,
            latency: None,
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_registry(mut self, registry: DriverRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Whether `create` leaves the host running.
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Whether `remove` accepts running hosts.
    pub fn with_force_remove(mut self, force_remove: bool) -> Self {
        self.force_remove = force_remove;
        self
    }

    /// Delay applied to every call before it does anything.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Replace the capability table of one driver.
    pub fn with_capabilities(mut self, driver: impl Into<String>, capabilities: Capabilities) -> Self {
        self.capability_overrides.insert(driver.into(), capabilities);
        self
    }

    /// Seed a host.
    pub fn with_host(self, host: ObservedHost) -> Self {
        self.insert(host);
        self
    }

    pub fn insert(&self, host: ObservedHost) {
        self.hosts.write().insert(host.name.clone(), host);
    }

    pub fn host(&self, name: &str) -> Option<ObservedHost> {
        self.hosts.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.hosts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.read().is_empty()
    }

    /// Make the next call of `operation` fail with `error`. Queued faults are
    /// consumed in order.
    pub fn fail_next(&self, operation: Operation, error: BackendError) {
        self.faults
            .lock()
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<Operation> {
        self.calls.lock().clone()
    }

    /// Calls that change state, in order.
    pub fn mutating_calls(&self) -> Vec<Operation> {
        self.calls()
            .into_iter()
            .filter(|op| !matches!(op, Operation::Describe | Operation::Capabilities))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    async fn enter(&self, operation: Operation, name: &str) -> BackendResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        trace!(backend = "memory", %operation, host = name, "call");
        self.calls.lock().push(operation);

        let fault = self
            .faults
            .lock()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        match fault {
            Some(error) => {
                debug!(backend = "memory", %operation, host = name, %error, "injected fault");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn not_found(operation: Operation, name: &str) -> BackendError {
        BackendError::provider(
            operation,
            ProviderErrorKind::NotFound,
            format!("machine '{}' does not exist", name),
        )
    }

    fn capabilities_for(&self, driver: &str) -> BackendResult<Capabilities> {
        if let Some(caps) = self.capability_overrides.get(driver) {
            return Ok(caps.clone());
        }
        self.registry.capabilities(driver).map_err(|e| {
            BackendError::provider(
                Operation::Capabilities,
                ProviderErrorKind::InvalidOptions,
                e.to_string(),
            )
        })
    }
}

#[async_trait]
impl ProvisioningBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn describe(&self, name: &str) -> BackendResult<Option<ObservedHost>> {
        self.enter(Operation::Describe, name).await?;
        Ok(self.host(name))
    }

    async fn create(
        &self,
        name: &str,
        driver: &str,
        options: &DriverOptions,
    ) -> BackendResult<ObservedHost> {
        self.enter(Operation::Create, name).await?;

        let schema = self.registry.get(driver).ok_or_else(|| {
            BackendError::provider(
                Operation::Create,
                ProviderErrorKind::InvalidOptions,
                format!("unknown driver '{}'", driver),
            )
        })?;
        let options = schema.normalize(options).map_err(|e| {
            BackendError::provider(
                Operation::Create,
                ProviderErrorKind::InvalidOptions,
                e.to_string(),
            )
        })?;

        let mut hosts = self.hosts.write();
        if hosts.contains_key(name) {
            return Err(BackendError::provider(
                Operation::Create,
                ProviderErrorKind::Rejected,
                format!("machine '{}' already exists", name),
            ));
        }

        let host = ObservedHost::new(name, driver)
            .with_options(options)
            .with_running(self.auto_start);
        hosts.insert(name.to_string(), host.clone());
        Ok(host)
    }

    async fn remove(&self, name: &str) -> BackendResult<()> {
        self.enter(Operation::Remove, name).await?;

        let mut hosts = self.hosts.write();
        let host = hosts
            .get(name)
            .ok_or_else(|| Self::not_found(Operation::Remove, name))?;
        if host.running && !self.force_remove {
            return Err(BackendError::provider(
                Operation::Remove,
                ProviderErrorKind::HostRunning,
                format!("machine '{}' is running", name),
            ));
        }
        hosts.remove(name);
        Ok(())
    }

    async fn start(&self, name: &str) -> BackendResult<()> {
        self.enter(Operation::Start, name).await?;

        let mut hosts = self.hosts.write();
        let host = hosts
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
    }

    async fn stop(&self, name: &str) -> BackendResult<()> {
        self.enter(Operation::Stop, name).await?;

        let mut hosts = self.hosts.write();
        let host = hosts
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
    }

    async fn update(&self, name: &str, changes: &DriverOptions) -> BackendResult<ObservedHost> {
        self.enter(Operation::Update, name).await?;

        let driver = self
            .host(name)
            .map(|h| h.driver_name)
            .ok_or_else(|| Self::not_found(Operation::Update, name))?;
        let capabilities = self.capabilities_for(&driver)?;
        if let Some(field) = changes.keys().find(|k| !capabilities.is_updatable(k)) {
            return Err(BackendError::provider(
                Operation::Update,
                ProviderErrorKind::ImmutableField,
                format!("'{}' cannot be changed on a live {} machine", field, driver),
            ));
        }

        let mut hosts = self.hosts.write();
        let host = hosts
            .get_mut(name)
            .ok_or_else(|| Self::not_found(Operation::Update, name))?;
        for (key, value) in changes {
            host.driver_options.insert(key.clone(), value.clone());
        }
        host.config_version += 1;
        Ok(host.clone())
    }

    async fn capabilities(&self, driver: &str) -> BackendResult<Capabilities> {
        self.enter(Operation::Capabilities, driver).await?;
        self.capabilities_for(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn do_options() -> DriverOptions {
        serde_json::from_value(json!({"region": "nyc3", "size": "512mb"})).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_describe() {
        let backend = MemoryBackend::new();
        assert!(backend.describe("m1").await.unwrap().is_none());

        let host = backend.create("m1", "digitalocean", &do_options()).await.unwrap();
        assert!(host.running);
        assert_eq!(host.driver_name, "digitalocean");

        let described = backend.describe("m1").await.unwrap().unwrap();
        assert_eq!(described, host);
        assert_eq!(
            backend.calls(),
            vec![Operation::Describe, Operation::Create, Operation::Describe]
        );
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_driver_and_duplicates() {
        let backend = MemoryBackend::new();
        let err = backend.create("m1", "nope", &DriverOptions::new()).await.unwrap_err();
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::InvalidOptions));

        backend.create("m1", "digitalocean", &do_options()).await.unwrap();
        let err = backend.create("m1", "digitalocean", &do_options()).await.unwrap_err();
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::Rejected));
    }

    #[tokio::test]
    async fn test_start_stop_idempotence_errors() {
        let backend = MemoryBackend::new().with_auto_start(false);
        backend.create("m1", "digitalocean", &do_options()).await.unwrap();

        let err = backend.stop("m1").await.unwrap_err();
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::AlreadyStopped));

        backend.start("m1").await.unwrap();
        let err = backend.start("m1").await.unwrap_err();
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::AlreadyRunning));
    }

    #[tokio::test]
    async fn test_remove_running_requires_force() {
        let backend = MemoryBackend::new();
        backend.create("m1", "digitalocean", &do_options()).await.unwrap();

        let err = backend.remove("m1").await.unwrap_err();
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::HostRunning));

        let forcing = MemoryBackend::new().with_force_remove(true);
        forcing.create("m1", "digitalocean", &do_options()).await.unwrap();
        forcing.remove("m1").await.unwrap();
        assert!(forcing.is_empty());
    }

    #[tokio::test]
    async fn test_update_respects_capabilities() {
        let backend = MemoryBackend::new();
        backend.create("m1", "digitalocean", &do_options()).await.unwrap();

        let changes: DriverOptions = serde_json::from_value(json!({"backups": true})).unwrap();
        let host = backend.update("m1", &changes).await.unwrap();
        assert_eq!(host.driver_options["backups"], json!(true));
        assert_eq!(host.config_version, 2);

        let changes: DriverOptions = serde_json::from_value(json!({"image": "ubuntu"})).unwrap();
        let err = backend.update("m1", &changes).await.unwrap_err();
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::ImmutableField));
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed_in_order() {
        let backend = MemoryBackend::new();
        backend.fail_next(Operation::Describe, BackendError::Unreachable("down".into()));

        assert!(matches!(
            backend.describe("m1").await,
            Err(BackendError::Unreachable(_))
        ));
        assert!(backend.describe("m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_capability_override() {
        let backend = MemoryBackend::new()
            .with_capabilities("digitalocean", Capabilities::new(["size"]));
        let caps = backend.capabilities("digitalocean").await.unwrap();
        assert!(caps.is_updatable("size"));
        assert!(!caps.is_updatable("backups"));
    }
}
