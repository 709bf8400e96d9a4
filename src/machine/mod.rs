//! Machine model: desired and observed host state.
//!
//! A [`HostSpec`] is what the caller wants, an [`ObservedHost`] is what the
//! provisioning back-end currently knows. The reconciliation engine only ever
//! compares the two; it never stores either.
//!
//! ## Parameters
//!
//! Host specs are usually built from a flat, Ansible-style parameter map where
//! a handful of keys are reserved and everything else is a driver option:
//!
//! | Parameter | Required | Description |
//! |-----------|----------|-------------|
//! | `name` | Yes | Name of the managed machine |
//! | `state` | No | absent, present, stopped, started (default: started) |
//! | `recreate` | No | Always remove and re-create a matching machine (default: false) |
//! | `restart` | No | Stop and start a matching running machine (default: false) |
//! | *other* | No | Driver options, validated by [`crate::drivers`] |
//!
//! ```yaml
//! name: machine01
//! driver: digitalocean
//! state: started
//! region: nyc3
//! size: 512mb
//! ```

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Driver options, keyed by option name. Order is preserved for reporting.
pub type DriverOptions = IndexMap<String, serde_json::Value>;

/// Flat parameters as handed over by a front-end.
pub type MachineParams = IndexMap<String, serde_json::Value>;

/// Parameter keys that belong to the host spec rather than to the driver.
pub const RESERVED_PARAMS: &[&str] = &["name", "driver", "state", "recreate", "restart"];

/// Desired lifecycle state of a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    /// Machine should not exist
    Absent,
    /// Machine should exist, running or not
    Present,
    /// Machine should exist and be stopped
    Stopped,
    /// Machine should exist and be running
    #[default]
    Started,
}

impl MachineState {
    /// All states, in documentation order.
    pub const ALL: [MachineState; 4] = [
        MachineState::Absent,
        MachineState::Present,
        MachineState::Stopped,
        MachineState::Started,
    ];

    /// Returns the lowercase name used in spec files.
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Absent => "absent",
            MachineState::Present => "present",
            MachineState::Stopped => "stopped",
            MachineState::Started => "started",
        }
    }

    /// Whether a host must exist in this state.
    pub fn requires_existence(&self) -> bool {
        !matches!(self, MachineState::Absent)
    }

    /// Returns true if `observed` satisfies this state.
    pub fn is_satisfied_by(&self, observed: Option<&ObservedHost>) -> bool {
        match (self, observed) {
            (MachineState::Absent, host) => host.is_none(),
            (_, None) => false,
            (MachineState::Present, Some(_)) => true,
            (MachineState::Started, Some(host)) => host.running,
            (MachineState::Stopped, Some(host)) => !host.running,
        }
    }
}

impl FromStr for MachineState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "absent" => Ok(MachineState::Absent),
            "present" => Ok(MachineState::Present),
            "stopped" => Ok(MachineState::Stopped),
            "started" | "running" => Ok(MachineState::Started),
            _ => Err(Error::config(format!(
                "Invalid state '{}'. Valid states: absent, present, stopped, started",
                s
            ))),
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state of a single named host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSpec {
    /// Unique machine name
    pub name: String,
    /// Driver tag, e.g. `digitalocean`
    pub driver: String,
    /// Driver specific options
    #[serde(default, rename = "options")]
    pub driver_options: DriverOptions,
    /// Target lifecycle state
    #[serde(default, rename = "state")]
    pub requested_state: MachineState,
    /// Force remove and re-create even when the configuration matches
    #[serde(default)]
    pub recreate: bool,
    /// Force stop and start of a running machine
    #[serde(default)]
    pub restart: bool,
}

impl HostSpec {
    /// Create a spec for `name` on `driver` with the default state (started).
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
            driver_options: DriverOptions::new(),
            requested_state: MachineState::default(),
            recreate: false,
            restart: false,
        }
    }

    pub fn with_state(mut self, state: MachineState) -> Self {
        self.requested_state = state;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.driver_options.insert(key.into(), value);
        self
    }

    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.driver_options = options;
        self
    }

    pub fn with_recreate(mut self, recreate: bool) -> Self {
        self.recreate = recreate;
        self
    }

    pub fn with_restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    /// Build a spec from flat parameters.
    ///
    /// `driver` wins over a `driver` key in the parameters; it is how the
    /// per-provider entry points pin their driver tag.
    pub fn from_params(driver: Option<&str>, params: &MachineParams) -> Result<Self> {
        let name = params.get_string_required("name")?;
        let driver = match driver {
            Some(d) => d.to_string(),
            None => params.get_string_required("driver")?,
        };
        let requested_state = match params.get_string("state")? {
            Some(s) => s.parse()?,
            None => MachineState::default(),
        };

        let driver_options = params
            .iter()
            .filter(|(k, v)| !RESERVED_PARAMS.contains(&k.as_str()) && !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            name,
            driver,
            driver_options,
            requested_state,
            recreate: params.get_bool("recreate")?.unwrap_or(false),
            restart: params.get_bool("restart")?.unwrap_or(false),
        })
    }

    /// Reject self-contradictory specs. Never touches a back-end.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("name must not be empty"));
        }
        if self.driver.trim().is_empty() {
            return Err(Error::config(format!(
                "driver must not be empty for machine '{}'",
                self.name
            )));
        }
        match self.requested_state {
            MachineState::Absent if self.recreate => Err(Error::config(format!(
                "recreate cannot be combined with state=absent for machine '{}'",
                self.name
            ))),
            MachineState::Absent if self.restart => Err(Error::config(format!(
                "restart cannot be combined with state=absent for machine '{}'",
                self.name
            ))),
            MachineState::Stopped if self.restart => Err(Error::config(format!(
                "restart cannot be combined with state=stopped for machine '{}'",
                self.name
            ))),
            _ => Ok(()),
        }
    }
}

/// What the back-end currently knows about a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedHost {
    /// Machine name
    pub name: String,
    /// Driver the machine was created with
    pub driver_name: String,
    /// Driver options as last applied
    #[serde(default, rename = "options")]
    pub driver_options: DriverOptions,
    /// Whether the machine is running
    pub running: bool,
    /// Incremented on every applied configuration change
    #[serde(default)]
    pub config_version: u32,
}

impl ObservedHost {
    pub fn new(name: impl Into<String>, driver_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver_name: driver_name.into(),
            driver_options: DriverOptions::new(),
            running: false,
            config_version: 1,
        }
    }

    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.driver_options = options;
        self
    }

    pub fn with_running(mut self, running: bool) -> Self {
        self.running = running;
        self
    }

    /// Short status word for reports.
    pub fn status(&self) -> &'static str {
        if self.running {
            "running"
        } else {
            "stopped"
        }
    }
}

/// Helper trait for extracting typed values from [`MachineParams`].
pub trait ParamExt {
    fn get_string(&self, key: &str) -> Result<Option<String>>;
    fn get_string_required(&self, key: &str) -> Result<String>;
    fn get_bool(&self, key: &str) -> Result<Option<bool>>;
}

impl ParamExt for MachineParams {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
            Some(v @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => {
                Ok(Some(v.to_string()))
            }
            Some(_) => Err(Error::config(format!("{} must be a string", key))),
        }
    }

    fn get_string_required(&self, key: &str) -> Result<String> {
        self.get_string(key)?
            .ok_or_else(|| Error::config(format!("missing required parameter: {}", key)))
    }

    fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(v) => parse_bool(v)
                .map(Some)
                .ok_or_else(|| Error::config(format!("{} must be a boolean", key))),
        }
    }
}

/// Ansible-flavoured boolean parsing (`yes`, `on`, `1`, ...).
pub fn parse_bool(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => n.as_i64().and_then(|n| match n {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }),
        serde_json::Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(true),
            "false" | "no" | "0" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
