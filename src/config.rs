//! Configuration module for rustible-machine
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/rustible-machine/config.toml)
//! - User configuration (~/.rustible-machine/config.toml)
//! - Project configuration (./rustible-machine.toml)
//! - Environment variables
//!
//! Command-line flags are applied on top by the binary.

use crate::backend::FileBackend;
use crate::drivers::DriverRegistry;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "RUSTIBLE_MACHINE_CONFIG";

const DEFAULT_FORKS: usize = 5;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default settings
    pub defaults: Defaults,

    /// Back-end behaviour
    pub backend: BackendConfig,

    /// Colors and output settings
    pub colors: ColorsConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Per-driver overrides, keyed by driver name
    pub drivers: IndexMap<String, DriverOverride>,
}

/// Which provisioning back-end the CLI talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// JSON state file
    #[default]
    File,
    /// In-process, forgotten on exit
    Memory,
}

/// Default configuration values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Upper bound for a single back-end call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Hosts reconciled concurrently
    pub forks: usize,

    /// Back-end used by the CLI
    pub backend: BackendKind,

    /// State file of the file back-end
    pub state_file: Option<PathBuf>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            forks: DEFAULT_FORKS,
            backend: BackendKind::File,
            state_file: None,
        }
    }
}

/// Back-end behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Hosts come up running right after create
    pub auto_start: bool,

    /// Remove running hosts without stopping them first
    pub force_remove: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            force_remove: false,
        }
    }
}

/// Colors and output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorsConfig {
    /// Enable colored output
    pub enabled: bool,
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when neither `-v` nor `RUST_LOG` is given
    pub level: String,

    /// Log format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Overrides for one driver
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverOverride {
    /// Extra options the back-end can change on a live host
    pub updatable: Vec<String>,
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                config = config.merge_from_file(&path)?;
            }
        }

        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        if let Some(path) = explicit_path {
            return vec![path.clone()];
        }

        let mut paths = vec![PathBuf::from("/etc/rustible-machine/config.toml")];

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".rustible-machine/config.toml"));
        }

        paths.push(PathBuf::from("rustible-machine.toml"));

        if let Ok(env_config) = std::env::var(CONFIG_ENV) {
            paths.push(PathBuf::from(env_config));
        }

        paths
    }

    /// Merge configuration from a file. Only the keys the file sets
    /// replace values already in `self`.
    fn merge_from_file(&self, path: &Path) -> Result<Self> {
        let layer = Self::read_layer(path)?;
        self.merge(layer)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Read one config file as a document, keeping only the keys it sets.
    fn read_layer(path: &Path) -> Result<Value> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let layer: Value = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
        };

        match layer {
            Value::Null => Ok(Value::Object(Map::new())),
            Value::Object(_) => Ok(layer),
            _ => anyhow::bail!("Config file is not a mapping: {}", path.display()),
        }
    }

    /// Overlay a config document on this config.
    fn merge(&self, layer: Value) -> Result<Config> {
        let mut document = serde_json::to_value(self)?;
        overlay(&mut document, layer);
        Ok(serde_json::from_value(document)?)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(timeout) = std::env::var("RUSTIBLE_MACHINE_TIMEOUT") {
            self.defaults.timeout = parse_duration(&timeout)
                .with_context(|| format!("Invalid RUSTIBLE_MACHINE_TIMEOUT: {}", timeout))?;
        }

        if let Ok(forks) = std::env::var("RUSTIBLE_MACHINE_FORKS") {
            if let Ok(n) = forks.parse() {
                self.defaults.forks = n;
            }
        }

        if let Ok(path) = std::env::var("RUSTIBLE_MACHINE_STATE_FILE") {
            self.defaults.state_file = Some(PathBuf::from(path));
        }

        if let Ok(format) = std::env::var("RUSTIBLE_MACHINE_LOG_FORMAT") {
            match format.to_lowercase().as_str() {
                "json" => self.logging.format = LogFormat::Json,
                "text" => self.logging.format = LogFormat::Text,
                _ => anyhow::bail!("Invalid RUSTIBLE_MACHINE_LOG_FORMAT: {}", format),
            }
        }

        if std::env::var("NO_COLOR").is_ok() || std::env::var("RUSTIBLE_MACHINE_NO_COLOR").is_ok()
        {
            self.colors.enabled = false;
        }

        Ok(())
    }

    /// Effective path of the file back-end's state file
    pub fn state_file(&self) -> PathBuf {
        self.defaults
            .state_file
            .clone()
            .unwrap_or_else(FileBackend::default_path)
    }

    /// Built-in driver catalog with the configured overrides applied
    pub fn registry(&self) -> Result<DriverRegistry> {
        let mut registry = DriverRegistry::with_builtins();
        for (driver, overrides) in &self.drivers {
            let schema = registry
                .get_mut(driver)
                .with_context(|| format!("Config names unknown driver '{}'", driver))?;
            schema
                .mark_updatable(&overrides.updatable)
                .with_context(|| format!("Invalid updatable options for driver '{}'", driver))?;
        }
        Ok(registry)
    }

    /// Load from a specific file, without other sources
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Config::default().merge_from_file(path.as_ref())
    }
}

/// Copy every key of `layer` onto `base`, descending into mappings.
fn overlay(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => overlay(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

/// Parse a human readable duration such as `90s` or `5m`.
pub fn parse_duration(value: &str) -> Result<Duration> {
    humantime_serde::re::humantime::parse_duration(value.trim())
        .with_context(|| format!("Invalid duration '{}'", value))
}
