//! Reconciliation engine.
//!
//! Given a [`HostSpec`] and a [`ProvisioningBackend`], the [`Reconciler`]
//! reads the current state of the host, derives the actions needed to reach
//! the requested state, and executes them in order.
//!
//! The engine is stateless. It keeps no cache between calls, holds no lock,
//! and never retries. A failed step aborts the run; the error carries the
//! actions that did complete so the caller can report them and simply run
//! the reconciliation again, which re-derives the plan from the new state.
//!
//! # Example
//!
//! ```rust,no_run
//! use rustible_machine::prelude::*;
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let backend = MemoryBackend::new();
//! let spec = HostSpec::new("machine01", "virtualbox");
//!
//! let result = Reconciler::new().reconcile(&spec, &backend).await?;
//! assert!(result.changed);
//! # Ok(())
//! # }
//! ```

pub mod diff;
pub mod plan;

pub use diff::{ConfigDiff, DriverChange, OptionChange};
pub use plan::{plan, Action, ActionLog, Plan, PlannedStep};

use crate::backend::{BackendError, BackendResult, Operation, ProviderErrorKind, ProvisioningBackend};
use crate::drivers::Capabilities;
use crate::error::Error;
use crate::machine::{HostSpec, ObservedHost};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Default bound on a single back-end call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(600);

/// Outcome of a successful reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileResult {
    /// True iff at least one action was applied (or, in check mode, planned)
    pub changed: bool,
    /// Actions in the order they were issued
    pub actions: ActionLog,
    /// Final snapshot of the host, `None` when it does not exist
    #[serde(rename = "machine")]
    pub host: Option<ObservedHost>,
    /// Configuration differences that drove the plan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<ConfigDiff>,
    /// The plan was computed but not executed
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub check_mode: bool,
}

impl ReconcileResult {
    /// The result as a JSON document: `{changed, actions, machine, ...}`.
    pub fn to_facts(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// A reconciliation that stopped part way.
#[derive(Error, Debug)]
#[error("Failed to reconcile '{host}': {error}")]
pub struct ReconcileError {
    pub host: String,
    /// Actions that completed before the failure
    pub completed: ActionLog,
    /// The action that failed, `None` if the failure was not an action
    pub failed_action: Option<Action>,
    #[source]
    pub error: Error,
}

impl ReconcileError {
    fn new(spec: &HostSpec, completed: ActionLog, failed_action: Option<Action>, error: Error) -> Self {
        Self {
            host: spec.name.clone(),
            completed,
            failed_action,
            error,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }
}

/// Per-run options
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Upper bound for each individual back-end call
    pub call_timeout: Duration,
    /// Plan only, execute nothing
    pub check_mode: bool,
    /// Checked before every back-end call
    pub cancel: CancellationToken,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            check_mode: false,
            cancel: CancellationToken::new(),
        }
    }
}

/// Drives a host towards its requested state.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ReconcileOptions) -> Self {
        Self { options }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.call_timeout = timeout;
        self
    }

    pub fn with_check_mode(mut self, check_mode: bool) -> Self {
        self.options.check_mode = check_mode;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.options.cancel = token;
        self
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Reconcile one host.
    pub async fn reconcile(
        &self,
        spec: &HostSpec,
        backend: &dyn ProvisioningBackend,
    ) -> Result<ReconcileResult, ReconcileError> {
        let span = info_span!(
            "reconcile",
            host = %spec.name,
            driver = %spec.driver,
            state = %spec.requested_state,
            backend = backend.name(),
        );
        self.run(spec, backend).instrument(span).await
    }

    async fn run(
        &self,
        spec: &HostSpec,
        backend: &dyn ProvisioningBackend,
    ) -> Result<ReconcileResult, ReconcileError> {
        let fail = |completed: ActionLog, action: Option<Action>, error: Error| {
            ReconcileError::new(spec, completed, action, error)
        };

        spec.validate()
            .map_err(|e| fail(ActionLog::new(), None, e))?;

        let observed = self
            .describe(spec, backend)
            .await
            .map_err(|e| fail(ActionLog::new(), None, e))?;

        let diff = match (&observed, spec.requested_state.requires_existence()) {
            (Some(host), true) => Some(ConfigDiff::compute(spec, host)).filter(|d| !d.is_empty()),
            _ => None,
        };

        let capabilities = match &diff {
            Some(d) if d.driver.is_none() && !spec.recreate => {
                self.call(Operation::Capabilities, backend.capabilities(&spec.driver))
                    .await
                    .map_err(|e| fail(ActionLog::new(), None, e))?
            }
            _ => Capabilities::none(),
        };

        let plan = plan(spec, observed.as_ref(), diff.clone(), &capabilities);
        debug!(steps = plan.len(), plan = %plan.actions(), "plan derived");

        if self.options.check_mode {
            return Ok(ReconcileResult {
                changed: !plan.is_empty(),
                actions: plan.actions(),
                host: observed,
                diff,
                check_mode: true,
            });
        }

        let mut completed = ActionLog::new();
        for step in plan.steps {
            if self.options.cancel.is_cancelled() {
                warn!(completed = completed.len(), "reconciliation cancelled");
                return Err(fail(completed, None, Error::Cancelled));
            }

            if step.conditional {
                let current = match self.describe(spec, backend).await {
                    Ok(current) => current,
                    Err(e) => return Err(fail(completed, Some(step.action), e)),
                };
                if step.is_satisfied_by(current.as_ref()) {
                    debug!(action = %step.action, "already satisfied, skipping");
                    continue;
                }
            }

            match self.execute(spec, backend, &step.action).await {
                Ok(true) => {
                    info!(action = %step.action, "action applied");
                    completed.push(step.action);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(action = %step.action, error = %e, "action failed");
                    return Err(fail(completed, Some(step.action), e));
                }
            }
        }

        let host = match self.describe(spec, backend).await {
            Ok(host) => host,
            Err(e) => return Err(fail(completed, None, e)),
        };

        if !spec.requested_state.is_satisfied_by(host.as_ref()) {
            let error = Error::NotConverged {
                host: spec.name.clone(),
                state: spec.requested_state,
            };
            return Err(fail(completed, None, error));
        }

        Ok(ReconcileResult {
            changed: !completed.is_empty(),
            actions: completed,
            host,
            diff,
            check_mode: false,
        })
    }

    /// Run one action. `Ok(false)` means the provider reported the target
    /// run state was already in place.
    async fn execute(
        &self,
        spec: &HostSpec,
        backend: &dyn ProvisioningBackend,
        action: &Action,
    ) -> Result<bool, Error> {
        let name = spec.name.as_str();
        let operation = action.operation();
        let outcome = match action {
            Action::Create { driver, options } => self
                .call(operation, backend.create(name, driver, options))
                .await
                .map(drop),
            Action::Remove => self.call(operation, backend.remove(name)).await,
            Action::Start => self.call(operation, backend.start(name)).await,
            Action::Stop => self.call(operation, backend.stop(name)).await,
            Action::Update { changes } => self
                .call(operation, backend.update(name, changes))
                .await
                .map(drop),
        };

        match outcome {
            Ok(()) => Ok(true),
            Err(Error::Backend(e)) if is_tolerated(action, &e) => {
                warn!(action = %action, error = %e, "treating provider response as success");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn describe(
        &self,
        spec: &HostSpec,
        backend: &dyn ProvisioningBackend,
    ) -> Result<Option<ObservedHost>, Error> {
        if self.options.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.call(Operation::Describe, backend.describe(&spec.name))
            .await
    }

    /// Await a back-end call under the per-call timeout.
    async fn call<T, F>(&self, operation: Operation, call: F) -> Result<T, Error>
    where
        F: Future<Output = BackendResult<T>>,
    {
        let timeout = self.options.call_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(BackendError::Timeout { operation, timeout }.into()),
        }
    }
}

fn is_tolerated(action: &Action, error: &BackendError) -> bool {
    matches!(
        (action, error.provider_kind()),
        (Action::Start, Some(ProviderErrorKind::AlreadyRunning))
            | (Action::Stop, Some(ProviderErrorKind::AlreadyStopped))
    )
}
