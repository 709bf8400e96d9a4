//! Machine manifests.
//!
//! A manifest is a YAML (or JSON) document listing the machines to manage.
//! Entries use the flat parameter style of the machine modules; driver
//! options may also be nested under `options`:
//!
//! ```yaml
//! - name: web01
//!   driver: digitalocean
//!   access_token: dop_v1_example
//!   region: nyc3
//!
//! - name: build01
//!   driver: virtualbox
//!   state: stopped
//!   options:
//!     memory: 4096
//! ```
//!
//! A single mapping, or a mapping with a `machines` list, is accepted too.

use crate::drivers::DriverRegistry;
use crate::error::{Error, Result};
use crate::machine::{HostSpec, MachineParams};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

/// The machines named by a manifest file, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub machines: Vec<HostSpec>,
}

impl Manifest {
    /// Read and parse a manifest file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse manifest text. JSON is accepted as a subset of YAML.
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let document: Value = serde_yaml::from_str(content)?;

        let entries = match document {
            Value::Array(entries) => entries,
            Value::Object(mut map) if !map.contains_key("name") => match map.remove("machines") {
                Some(Value::Array(entries)) => entries,
                _ => {
                    return Err(Error::config(
                        "manifest must be a list of machines, a single machine, or a 'machines' list",
                    ))
                }
            },
            entry @ Value::Object(_) => vec![entry],
            Value::Null => Vec::new(),
            _ => return Err(Error::config("manifest must be a list of machines")),
        };

        let machines = entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                parse_entry(entry).map_err(|e| match e {
                    Error::Config(msg) => Error::config(format!("machine #{}: {}", index + 1, msg)),
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let manifest = Self { machines };
        manifest.check_unique()?;
        Ok(manifest)
    }

    fn check_unique(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.machines {
            if !seen.insert(spec.name.as_str()) {
                return Err(Error::config(format!(
                    "machine '{}' is defined more than once",
                    spec.name
                )));
            }
        }
        Ok(())
    }

    /// Validate every machine against its driver and coerce option types.
    pub fn prepare(&self, registry: &DriverRegistry) -> Result<Self> {
        let machines = self
            .machines
            .iter()
            .map(|spec| registry.prepare(spec))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { machines })
    }

    pub fn names(&self) -> Vec<&str> {
        self.machines.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }
}

fn parse_entry(entry: Value) -> Result<HostSpec> {
    let mut params: MachineParams = match entry {
        Value::Object(map) => map.into_iter().collect(),
        _ => return Err(Error::config("entry must be a mapping")),
    };

    match params.shift_remove("options") {
        Some(Value::Object(options)) => {
            for (key, value) in options {
                if params.contains_key(&key) {
                    return Err(Error::config(format!(
                        "option '{}' is given both inline and under 'options'",
                        key
                    )));
                }
                params.insert(key, value);
            }
        }
        Some(Value::Null) | None => {}
        Some(_) => return Err(Error::config("'options' must be a mapping")),
    }

    HostSpec::from_params(None, &params)
}
