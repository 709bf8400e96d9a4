//! Action planning.
//!
//! [`plan`] is a pure function of the spec, the observed host, the
//! configuration diff and the driver capabilities. It never calls a back-end,
//! which is what makes check mode and the plan tests cheap.

use super::diff::ConfigDiff;
use crate::backend::Operation;
use crate::drivers::Capabilities;
use crate::machine::{DriverOptions, HostSpec, MachineState, ObservedHost};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single back-end operation issued by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    Create {
        driver: String,
        #[serde(default)]
        options: DriverOptions,
    },
    Remove,
    Start,
    Stop,
    Update {
        changes: DriverOptions,
    },
}

impl Action {
    /// The back-end operation this action maps to.
    pub fn operation(&self) -> Operation {
        match self {
            Action::Create { .. } => Operation::Create,
            Action::Remove => Operation::Remove,
            Action::Start => Operation::Start,
            Action::Stop => Operation::Stop,
            Action::Update { .. } => Operation::Update,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create { driver, .. } => write!(f, "create ({})", driver),
            Action::Update { changes } => {
                let keys: Vec<&str> = changes.keys().map(String::as_str).collect();
                write!(f, "update ({})", keys.join(", "))
            }
            other => write!(f, "{}", other.operation()),
        }
    }
}

/// Ordered actions issued against one host. Empty means nothing changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionLog(Vec<Action>);

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        self.0.push(action);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Action] {
        &self.0
    }

    /// Operations only, handy for assertions and summaries.
    pub fn operations(&self) -> Vec<Operation> {
        self.0.iter().map(Action::operation).collect()
    }
}

impl From<Vec<Action>> for ActionLog {
    fn from(actions: Vec<Action>) -> Self {
        Self(actions)
    }
}

impl<'a> IntoIterator for &'a ActionLog {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ActionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("no changes");
        }
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(", "))
    }
}

/// A planned action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub action: Action,
    /// Re-query the host first and skip the step if it is already satisfied.
    /// Used for start/stop after create, since some providers start hosts
    /// on creation.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub conditional: bool,
}

impl PlannedStep {
    fn always(action: Action) -> Self {
        Self {
            action,
            conditional: false,
        }
    }

    fn conditional(action: Action) -> Self {
        Self {
            action,
            conditional: true,
        }
    }

    /// Whether `host` already satisfies a conditional step.
    pub fn is_satisfied_by(&self, host: Option<&ObservedHost>) -> bool {
        match (&self.action, host) {
            (Action::Start, Some(h)) => h.running,
            (Action::Stop, Some(h)) => !h.running,
            _ => false,
        }
    }
}

/// The ordered steps needed to reach the requested state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlannedStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<ConfigDiff>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// All planned actions, conditional ones included.
    pub fn actions(&self) -> ActionLog {
        self.steps.iter().map(|s| s.action.clone()).collect::<Vec<_>>().into()
    }

    fn push(&mut self, action: Action) {
        self.steps.push(PlannedStep::always(action));
    }

    fn push_conditional(&mut self, action: Action) {
        self.steps.push(PlannedStep::conditional(action));
    }

    fn push_create(&mut self, spec: &HostSpec) {
        let options = spec
            .driver_options
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.push(Action::Create {
            driver: spec.driver.clone(),
            options,
        });
        match spec.requested_state {
            MachineState::Started => self.push_conditional(Action::Start),
            MachineState::Stopped => self.push_conditional(Action::Stop),
            _ => {}
        }
    }
}

/// Derive the steps that take `observed` to the state `spec` asks for.
///
/// `diff` is the configuration diff against `observed` (ignored when the host
/// does not exist). `capabilities` lists the options of the driver that can be
/// updated in place; pass [`Capabilities::none`] when unknown.
pub fn plan(
    spec: &HostSpec,
    observed: Option<&ObservedHost>,
    diff: Option<ConfigDiff>,
    capabilities: &Capabilities,
) -> Plan {
    let diff = diff.filter(|d| !d.is_empty());
    let mut plan = Plan::default();

    let host = match (spec.requested_state, observed) {
        (MachineState::Absent, Some(host)) => {
            if host.running {
                plan.push(Action::Stop);
            }
            plan.push(Action::Remove);
            return plan;
        }
        (MachineState::Absent, None) => return plan,
        (_, None) => {
            plan.push_create(spec);
            return plan;
        }
        (_, Some(host)) => host,
    };

    let needs_recreate = spec.recreate
        || diff
            .as_ref()
            .is_some_and(|d| !d.all_updatable(capabilities));

    if needs_recreate {
        if host.running {
            plan.push(Action::Stop);
        }
        plan.push(Action::Remove);
        plan.push_create(spec);
        plan.diff = diff;
        return plan;
    }

    if let Some(d) = &diff {
        plan.push(Action::Update {
            changes: d.as_update(),
        });
    }

    if spec.restart && host.running {
        plan.push(Action::Stop);
        plan.push(Action::Start);
    } else {
        match spec.requested_state {
            MachineState::Started if !host.running => plan.push(Action::Start),
            MachineState::Stopped if host.running => plan.push(Action::Stop),
            _ => {}
        }
    }

    plan.diff = diff;
    plan
}
