//! Configuration diff between a host spec and an observed host.
//!
//! Only options the host spec actually sets are compared. An option that is
//! missing from the host spec, or explicitly null, means "don't care" and never
//! produces a change. Scalars compare loosely, the way Ansible parameters
//! arrive: `"512"` equals `512` and `"yes"` equals `true`.

use crate::drivers::Capabilities;
use crate::machine::{parse_bool, DriverOptions, HostSpec, ObservedHost};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};
use std::fmt;

/// A single option whose observed value differs from the desired one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChange {
    pub option: String,
    /// Observed value, `None` if the back-end does not report the option
    pub before: Option<Value>,
    pub after: Value,
}

impl fmt::Display for OptionChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.before {
            Some(before) => write!(f, "{}: {} -> {}", self.option, before, self.after),
            None => write!(f, "{}: (unset) -> {}", self.option, self.after),
        }
    }
}

/// Driver tag change. Never updatable in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverChange {
    pub before: String,
    pub after: String,
}

/// Differences between desired and observed configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<OptionChange>,
}

impl ConfigDiff {
    /// Compare `spec` against what the back-end reports for the host.
    pub fn compute(spec: &HostSpec, observed: &ObservedHost) -> Self {
        let driver = (spec.driver != observed.driver_name).then(|| DriverChange {
            before: observed.driver_name.clone(),
            after: spec.driver.clone(),
        });

        let changes = spec
            .driver_options
            .iter()
            .filter(|(_, desired)| !desired.is_null())
            .filter_map(|(option, desired)| {
                let current = observed.driver_options.get(option);
                match current {
                    Some(current) if loosely_equal(desired, current) => None,
                    _ => Some(OptionChange {
                        option: option.clone(),
                        before: current.cloned(),
                        after: desired.clone(),
                    }),
                }
            })
            .collect();

        Self { driver, changes }
    }

    /// True when desired and observed configuration agree.
    pub fn is_empty(&self) -> bool {
        self.driver.is_none() && self.changes.is_empty()
    }

    /// Options that `capabilities` cannot change on a live host.
    pub fn immutable_options<'a>(&'a self, capabilities: &Capabilities) -> Vec<&'a str> {
        self.changes
            .iter()
            .filter(|c| !capabilities.is_updatable(&c.option))
            .map(|c| c.option.as_str())
            .collect()
    }

    /// Whether every difference can be applied with an in-place update.
    pub fn all_updatable(&self, capabilities: &Capabilities) -> bool {
        self.driver.is_none()
            && self
                .changes
                .iter()
                .all(|c| capabilities.is_updatable(&c.option))
    }

    /// The option map to hand to `update`.
    pub fn as_update(&self) -> DriverOptions {
        self.changes
            .iter()
            .map(|c| (c.option.clone(), c.after.clone()))
            .collect()
    }

    /// Line-oriented rendering, `-` for observed and `+` for desired values.
    pub fn render(&self) -> String {
        let mut before = String::new();
        let mut after = String::new();

        if let Some(driver) = &self.driver {
            before.push_str(&format!("driver: {}\n", driver.before));
            after.push_str(&format!("driver: {}\n", driver.after));
        }
        for change in &self.changes {
            if let Some(value) = &change.before {
                before.push_str(&format!("{}: {}\n", change.option, value));
            }
            after.push_str(&format!("{}: {}\n", change.option, change.after));
        }

        let mut out = String::new();
        for change in TextDiff::from_lines(&before, &after).iter_all_changes() {
            let line = change.value().trim_end();
            match change.tag() {
                ChangeTag::Delete => out.push_str(&format!("-{}\n", line)),
                ChangeTag::Insert => out.push_str(&format!("+{}\n", line)),
                ChangeTag::Equal => out.push_str(&format!(" {}\n", line)),
            }
        }
        out
    }
}

/// Scalar comparison tolerant of the string/number/bool mix front-ends produce.
pub fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Bool(x), other) | (other, Value::Bool(x)) => parse_bool(other) == Some(*x),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            let s = s.trim();
            s == n.to_string() || matches!((s.parse::<f64>(), n.as_f64()), (Ok(x), Some(y)) if x == y)
        }
        _ => false,
    }
}
