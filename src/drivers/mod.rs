//! Driver catalog for rustible-machine
//!
//! Every provider is described by data instead of code: a [`DriverSchema`]
//! lists the options the driver understands, which of them are required,
//! their value type, and which can be changed on a live machine. The
//! [`DriverRegistry`] holds the schemas and validates host specs once, at the
//! front-end boundary, before anything reaches the reconciliation engine.

pub mod catalog;

use crate::error::{Error, Result};
use crate::machine::{parse_bool, DriverOptions, HostSpec};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Value type of a driver option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Str,
    Int,
    Bool,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::Str => write!(f, "str"),
            OptionKind::Int => write!(f, "int"),
            OptionKind::Bool => write!(f, "bool"),
        }
    }
}

/// A single option understood by a driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
    pub name: String,
    pub kind: OptionKind,
    #[serde(default)]
    pub required: bool,
    /// Whether the back-end can apply a change without re-creating the machine
    #[serde(default)]
    pub updatable: bool,
    #[serde(default)]
    pub description: String,
}

impl OptionSpec {
    pub fn new(name: impl Into<String>, kind: OptionKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            updatable: false,
            description: description.into(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn updatable(mut self) -> Self {
        self.updatable = true;
        self
    }

    /// Coerce `value` to this option's type.
    fn coerce(&self, driver: &str, value: &serde_json::Value) -> Result<serde_json::Value> {
        let invalid = |message: &str| Error::invalid_option(driver, &self.name, message);

        match (self.kind, value) {
            (OptionKind::Str, serde_json::Value::String(_)) => Ok(value.clone()),
            (OptionKind::Str, serde_json::Value::Number(_) | serde_json::Value::Bool(_)) => {
                Ok(serde_json::Value::String(value.to_string()))
            }
            (OptionKind::Int, serde_json::Value::Number(n)) if n.is_i64() || n.is_u64() => {
                Ok(value.clone())
            }
            (OptionKind::Int, serde_json::Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(serde_json::Value::from)
                .map_err(|_| invalid("must be an integer")),
            (OptionKind::Int, _) => Err(invalid("must be an integer")),
            (OptionKind::Bool, v) => parse_bool(v)
                .map(serde_json::Value::Bool)
                .ok_or_else(|| invalid("must be a boolean")),
            (OptionKind::Str, _) => Err(invalid("must be a string")),
        }
    }
}

/// Set of option names a driver can change on a live machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities {
    updatable: BTreeSet<String>,
}

impl Capabilities {
    pub fn new<I, S>(updatable: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            updatable: updatable.into_iter().map(Into::into).collect(),
        }
    }

    /// Nothing can be updated in place.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_updatable(&self, option: &str) -> bool {
        self.updatable.contains(option)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.updatable.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.updatable.is_empty()
    }
}

/// Schema for one driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverSchema {
    pub name: String,
    pub description: String,
    pub options: Vec<OptionSpec>,
    /// Groups of options of which at most one may be set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusive: Vec<Vec<String>>,
}

impl DriverSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            options: Vec::new(),
            exclusive: Vec::new(),
        }
    }

    pub fn option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }

    pub fn exclusive(mut self, group: &[&str]) -> Self {
        self.exclusive
            .push(group.iter().map(|s| (*s).to_string()).collect());
        self
    }

    pub fn get(&self, name: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|o| o.name == name)
    }

    pub fn required_options(&self) -> impl Iterator<Item = &OptionSpec> {
        self.options.iter().filter(|o| o.required)
    }

    /// The live-updatable options of this driver.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::new(
            self.options
                .iter()
                .filter(|o| o.updatable)
                .map(|o| o.name.clone()),
        )
    }

    /// Mark additional options as live-updatable.
    pub fn mark_updatable<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        for name in names {
            let name = name.as_ref();
            let option = self
                .options
                .iter_mut()
                .find(|o| o.name == name)
                .ok_or_else(|| Error::UnknownOption {
                    driver: self.name.clone(),
                    option: name.to_string(),
                })?;
            option.updatable = true;
        }
        Ok(())
    }

    /// Validate options and return them coerced to their declared types.
    pub fn normalize(&self, options: &DriverOptions) -> Result<DriverOptions> {
        let mut normalized = DriverOptions::with_capacity(options.len());

        for (key, value) in options {
            let spec = self.get(key).ok_or_else(|| Error::UnknownOption {
                driver: self.name.clone(),
                option: key.clone(),
            })?;
            if value.is_null() {
                continue;
            }
            normalized.insert(key.clone(), spec.coerce(&self.name, value)?);
        }

        for required in self.required_options() {
            if !normalized.contains_key(&required.name) {
                return Err(Error::MissingOption {
                    driver: self.name.clone(),
                    option: required.name.clone(),
                });
            }
        }

        for group in &self.exclusive {
            let present: Vec<String> = group
                .iter()
                .filter(|name| normalized.contains_key(name.as_str()))
                .cloned()
                .collect();
            if present.len() > 1 {
                return Err(Error::ConflictingOptions {
                    driver: self.name.clone(),
                    options: present,
                });
            }
        }

        Ok(normalized)
    }
}

/// Registry for looking up driver schemas by name
#[derive(Debug, Clone)]
pub struct DriverRegistry {
    drivers: IndexMap<String, DriverSchema>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: IndexMap::new(),
        }
    }

    /// Create a registry with all built-in drivers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for schema in catalog::builtin_drivers() {
            registry.register(schema);
        }
        registry
    }

    /// Register a driver, replacing any schema with the same name
    pub fn register(&mut self, schema: DriverSchema) {
        self.drivers.insert(schema.name.clone(), schema);
    }

    pub fn get(&self, name: &str) -> Option<&DriverSchema> {
        self.drivers.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DriverSchema> {
        self.drivers.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Get all driver names, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.drivers.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DriverSchema> {
        self.drivers.values()
    }

    fn schema(&self, driver: &str) -> Result<&DriverSchema> {
        self.get(driver)
            .ok_or_else(|| Error::UnknownDriver(driver.to_string()))
    }

    /// Capability table for `driver`.
    pub fn capabilities(&self, driver: &str) -> Result<Capabilities> {
        Ok(self.schema(driver)?.capabilities())
    }

    /// Validate a spec against its driver schema and return a copy with
    /// options coerced to their declared types.
    pub fn prepare(&self, spec: &HostSpec) -> Result<HostSpec> {
        spec.validate()?;
        let schema = self.schema(&spec.driver)?;
        let driver_options = schema.normalize(&spec.driver_options)?;
        Ok(HostSpec {
            driver_options,
            ..spec.clone()
        })
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
