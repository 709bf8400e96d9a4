//! Error types for rustible-machine.
//!
//! This module defines the error types used throughout the crate, providing
//! rich error information for the reconciliation report and the CLI exit status.
//! Back-end specific failures live in [`crate::backend::BackendError`] and are
//! wrapped by [`Error::Backend`].

use crate::backend::{BackendError, ProviderErrorKind};
use crate::machine::MachineState;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for rustible-machine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for rustible-machine.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Desired-state Errors
    // ========================================================================
    /// The desired state is self-contradictory or incomplete.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested driver is not known to the driver catalog.
    #[error("Unknown driver '{0}'")]
    UnknownDriver(String),

    /// An option was supplied that the driver does not recognize.
    #[error("Unknown option '{option}' for driver '{driver}'")]
    UnknownOption {
        /// Driver name
        driver: String,
        /// Option name
        option: String,
    },

    /// A required driver option is missing.
    #[error("Missing required option '{option}' for driver '{driver}'")]
    MissingOption {
        /// Driver name
        driver: String,
        /// Option name
        option: String,
    },

    /// A driver option has a value of the wrong type.
    #[error("Invalid value for option '{option}' of driver '{driver}': {message}")]
    InvalidOption {
        /// Driver name
        driver: String,
        /// Option name
        option: String,
        /// Error message
        message: String,
    },

    /// Options that may not be combined were supplied together.
    #[error("Options {options:?} are mutually exclusive for driver '{driver}'")]
    ConflictingOptions {
        /// Driver name
        driver: String,
        /// The conflicting options
        options: Vec<String>,
    },

    // ========================================================================
    // Back-end Errors
    // ========================================================================
    /// A provisioning back-end call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The back-end reported success but the host does not satisfy the
    /// requested state afterwards.
    #[error("Host '{host}' did not converge to state '{state}'")]
    NotConverged {
        /// Host name
        host: String,
        /// Requested state
        state: MachineState,
    },

    /// Reconciliation was cancelled between two back-end calls.
    #[error("Reconciliation cancelled")]
    Cancelled,

    // ========================================================================
    // IO Errors
    // ========================================================================
    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

impl Error {
    /// Creates a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a new invalid option error.
    pub fn invalid_option(
        driver: impl Into<String>,
        option: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidOption {
            driver: driver.into(),
            option: option.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error was raised before touching the back-end.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::UnknownDriver(_)
                | Error::UnknownOption { .. }
                | Error::MissingOption { .. }
                | Error::InvalidOption { .. }
                | Error::ConflictingOptions { .. }
        )
    }

    /// Returns true if re-running the whole reconciliation may succeed.
    ///
    /// The engine never retries on its own; this only guides the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Backend(BackendError::Timeout { .. } | BackendError::Unreachable(_)) => true,
            Error::Backend(BackendError::Provider(e)) => {
                matches!(e.kind, ProviderErrorKind::Quota | ProviderErrorKind::HostRunning)
            }
            Error::Cancelled | Error::NotConverged { .. } => true,
            _ => false,
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            e if e.is_config_error() => 4,
            Error::Backend(BackendError::Provider(_)) | Error::NotConverged { .. } => 2,
            Error::Backend(_) => 3,
            Error::Cancelled => 130,
            Error::YamlParse(_) => 5,
            _ => 1,
        }
    }
}
