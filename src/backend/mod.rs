//! Provisioning back-end boundary.
//!
//! The reconciliation engine talks to the outside world only through the
//! [`ProvisioningBackend`] trait. A back-end owns the truth about which hosts
//! exist; the engine re-reads it on every call and keeps nothing.
//!
//! # Implementations
//!
//! - [`MemoryBackend`]: hosts held in memory, with fault injection. Used by
//!   tests and for dry runs.
//! - [`FileBackend`]: hosts persisted to a JSON state file.
//!
//! # Error model
//!
//! Transport-level problems are [`BackendError::Timeout`] and
//! [`BackendError::Unreachable`]. Anything the provider itself rejected is a
//! [`ProviderError`] with a [`ProviderErrorKind`]. Starting a running host and
//! stopping a stopped one are reported as `AlreadyRunning` / `AlreadyStopped`;
//! callers may treat those as success.

pub mod file;
pub mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use crate::drivers::Capabilities;
use crate::machine::{DriverOptions, ObservedHost};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Back-end operations, used for error context and call logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Describe,
    Create,
    Remove,
    Start,
    Stop,
    Update,
    Capabilities,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Describe => "describe",
            Operation::Create => "create",
            Operation::Remove => "remove",
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::Update => "update",
            Operation::Capabilities => "capabilities",
        };
        f.write_str(s)
    }
}

/// Why a provider rejected an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Start on a running host
    AlreadyRunning,
    /// Stop on a stopped host
    AlreadyStopped,
    /// Remove on a running host without force-removal support
    HostRunning,
    /// No host with that name
    NotFound,
    /// Invalid option combination on create
    InvalidOptions,
    /// Update of a field that cannot change on a live host
    ImmutableField,
    /// Quota or capacity exhausted
    Quota,
    /// Credentials rejected
    Auth,
    /// Any other rejection
    Rejected,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderErrorKind::AlreadyRunning => "already running",
            ProviderErrorKind::AlreadyStopped => "already stopped",
            ProviderErrorKind::HostRunning => "host is running",
            ProviderErrorKind::NotFound => "not found",
            ProviderErrorKind::InvalidOptions => "invalid options",
            ProviderErrorKind::ImmutableField => "immutable field",
            ProviderErrorKind::Quota => "quota exceeded",
            ProviderErrorKind::Auth => "authentication failed",
            ProviderErrorKind::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// An operation the provider refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Provider rejected {operation} ({kind}): {message}")]
pub struct ProviderError {
    pub operation: Operation,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(operation: Operation, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
        }
    }
}

/// Errors returned by a provisioning back-end
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The call did not complete within the caller's timeout.
    #[error("Back-end {operation} timed out after {timeout:?}")]
    Timeout {
        operation: Operation,
        timeout: Duration,
    },

    /// The back-end could not be reached at all.
    #[error("Back-end unreachable: {0}")]
    Unreachable(String),

    /// The back-end was reached and refused the operation.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl BackendError {
    /// Shorthand for a provider rejection.
    pub fn provider(
        operation: Operation,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider(ProviderError::new(operation, kind, message))
    }

    /// The provider error kind, if this is a provider rejection.
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            BackendError::Provider(e) => Some(e.kind),
            _ => None,
        }
    }
}

/// Result type for back-end calls
pub type BackendResult<T> = Result<T, BackendError>;

/// Capability of creating, querying and driving named hosts.
///
/// Implementations must be safe to share across tasks. They are not
/// required to serialize calls for the same name; callers do that.
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Current knowledge of `name`, or `None` if no such host exists.
    async fn describe(&self, name: &str) -> BackendResult<Option<ObservedHost>>;

    /// Create a host. Some providers start it as part of creation.
    async fn create(
        &self,
        name: &str,
        driver: &str,
        options: &DriverOptions,
    ) -> BackendResult<ObservedHost>;

    /// Remove a host.
    async fn remove(&self, name: &str) -> BackendResult<()>;

    /// Start a host.
    async fn start(&self, name: &str) -> BackendResult<()>;

    /// Stop a host.
    async fn stop(&self, name: &str) -> BackendResult<()>;

    /// Apply `changes` to a live host.
    async fn update(&self, name: &str, changes: &DriverOptions) -> BackendResult<ObservedHost>;

    /// Options of `driver` that [`update`](Self::update) can change.
    async fn capabilities(&self, driver: &str) -> BackendResult<Capabilities>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::Timeout {
            operation: Operation::Start,
            timeout: Duration::from_secs(3),
        };
        assert_eq!(err.to_string(), "Back-end start timed out after 3s");

        let err = BackendError::provider(
            Operation::Update,
            ProviderErrorKind::ImmutableField,
            "image cannot change",
        );
        assert_eq!(
            err.to_string(),
            "Provider rejected update (immutable field): image cannot change"
        );
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::ImmutableField));
        assert_eq!(BackendError::Unreachable("x".into()).provider_kind(), None);
    }
}
