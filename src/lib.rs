//! # rustible-machine - Desired-state management for docker-machine hosts
//!
//! rustible-machine keeps named hosts on cloud and local drivers (DigitalOcean,
//! Amazon EC2, VirtualBox, vSphere, ...) in a requested lifecycle state. It is
//! the machine-management corner of Rustible, built as a standalone crate.
//!
//! ## Core Concepts
//!
//! - **Host spec**: the desired state of one named host: driver, driver
//!   options, and one of `absent`, `present`, `stopped`, `started`
//! - **Observed host**: what the provisioning back-end currently reports
//! - **Back-end**: anything that can create, remove, start, stop and update
//!   hosts, behind the [`ProvisioningBackend`](backend::ProvisioningBackend) trait
//! - **Reconciler**: compares the two and issues the minimal ordered actions
//! - **Drivers**: per-provider option schemas, validated before reconciliation
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      CLI / Manifest                        │
//! │         (clap commands, YAML machine manifests)            │
//! └───────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                     Driver Registry                        │
//! │   (option schemas, type coercion, live-update table)       │
//! └───────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                  Reconciliation Engine                     │
//! │        (describe, diff, plan, execute, verify)             │
//! └───────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                 Provisioning Back-ends                     │
//! │              (state file, in-memory)                       │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use rustible_machine::prelude::*;
//! use serde_json::json;
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let registry = DriverRegistry::with_builtins();
//! let spec = HostSpec::new("web01", "digitalocean")
//!     .with_option("access_token", json!("dop_v1_example"))
//!     .with_option("region", json!("nyc3"));
//! let spec = registry.prepare(&spec)?;
//!
//! let backend = MemoryBackend::new();
//! let result = Reconciler::new().reconcile(&spec, &backend).await?;
//! println!("changed: {} ({})", result.changed, result.actions);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    // Back-ends
    pub use crate::backend::{
        BackendError, FileBackend, MemoryBackend, Operation, ProviderError, ProviderErrorKind,
        ProvisioningBackend,
    };

    // Drivers
    pub use crate::drivers::{Capabilities, DriverRegistry, DriverSchema};

    // Error handling
    pub use crate::error::{Error, Result};

    // Machine model
    pub use crate::machine::{DriverOptions, HostSpec, MachineState, ObservedHost};

    // Manifests
    pub use crate::manifest::Manifest;

    // Engine
    pub use crate::reconcile::{
        Action, ActionLog, ConfigDiff, ReconcileError, ReconcileOptions, ReconcileResult,
        Reconciler,
    };
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases.
pub mod error;

/// Host specs, observed hosts and requested states.
pub mod machine;

/// Driver option schemas and the built-in catalog.
pub mod drivers;

/// Machine manifest files.
pub mod manifest;

// ============================================================================
// Engine and Back-ends
// ============================================================================

/// Provisioning back-end trait and implementations.
pub mod backend;

/// The reconciliation engine.
pub mod reconcile;

// ============================================================================
// Configuration
// ============================================================================

/// Layered configuration loading.
pub mod config;

// ============================================================================
// Version Information
// ============================================================================

/// Returns the current version of rustible-machine.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
