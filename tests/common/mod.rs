//! Shared test utilities and fixtures for the rustible-machine test suite.
//!
//! This module provides:
//! - Spec and observed-host fixtures for common drivers
//! - Back-end builders
//! - Manifest and state file helpers
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use rustible_machine::backend::{
    BackendResult, FileBackend, MemoryBackend, Operation, ProvisioningBackend,
};
use rustible_machine::drivers::Capabilities;
use rustible_machine::machine::{DriverOptions, HostSpec, MachineState, ObservedHost};
use rustible_machine::reconcile::Reconciler;

// ============================================================================
// Fixtures
// ============================================================================

/// Build driver options from a JSON object literal.
pub fn options(value: serde_json::Value) -> DriverOptions {
    serde_json::from_value(value).expect("options must be a JSON object")
}

/// A DigitalOcean droplet spec in nyc3.
pub fn droplet(name: &str) -> HostSpec {
    HostSpec::new(name, "digitalocean").with_options(options(json!({
        "access_token": "t0ken",
        "region": "nyc3",
        "size": "512mb",
    })))
}

/// A VirtualBox spec with a fixed memory size.
pub fn vbox(name: &str) -> HostSpec {
    HostSpec::new(name, "virtualbox").with_option("memory", json!(1024))
}

/// What the back-end reports for a droplet created from [`droplet`].
pub fn observed_droplet(name: &str, running: bool) -> ObservedHost {
    ObservedHost::new(name, "digitalocean")
        .with_options(options(json!({
            "access_token": "t0ken",
            "region": "nyc3",
            "size": "512mb",
        })))
        .with_running(running)
}

/// What the back-end reports for a host created from [`vbox`].
pub fn observed_vbox(name: &str, running: bool) -> ObservedHost {
    ObservedHost::new(name, "virtualbox")
        .with_options(options(json!({"memory": 1024})))
        .with_running(running)
}

pub const ALL_STATES: [MachineState; 4] = [
    MachineState::Absent,
    MachineState::Present,
    MachineState::Stopped,
    MachineState::Started,
];

// ============================================================================
// Back-ends and reconcilers
// ============================================================================

/// Memory back-end where created hosts stay stopped.
pub fn manual_start_backend() -> MemoryBackend {
    MemoryBackend::new().with_auto_start(false)
}

/// Reconciler with a short call timeout so hung tests fail fast.
pub fn reconciler() -> Reconciler {
    Reconciler::new().with_timeout(Duration::from_secs(5))
}

/// Wraps a [`MemoryBackend`] and cancels a token once a given operation
/// has completed.
pub struct CancelAfter {
    pub inner: MemoryBackend,
    pub operation: Operation,
    pub token: CancellationToken,
}

impl CancelAfter {
    pub fn new(inner: MemoryBackend, operation: Operation) -> Self {
        Self {
            inner,
            operation,
            token: CancellationToken::new(),
        }
    }

    fn done<T>(&self, operation: Operation, result: BackendResult<T>) -> BackendResult<T> {
        if operation == self.operation {
            self.token.cancel();
        }
        result
    }
}

#[async_trait]
impl ProvisioningBackend for CancelAfter {
    fn name(&self) -> &str {
        "cancel-after"
    }

    async fn describe(&self, name: &str) -> BackendResult<Option<ObservedHost>> {
        let result = self.inner.describe(name).await;
        self.done(Operation::Describe, result)
    }

    async fn create(
        &self,
        name: &str,
        driver: &str,
        options: &DriverOptions,
    ) -> BackendResult<ObservedHost> {
        let result = self.inner.create(name, driver, options).await;
        self.done(Operation::Create, result)
    }

    async fn remove(&self, name: &str) -> BackendResult<()> {
        let result = self.inner.remove(name).await;
        self.done(Operation::Remove, result)
    }

    async fn start(&self, name: &str) -> BackendResult<()> {
        let result = self.inner.start(name).await;
        self.done(Operation::Start, result)
    }

    async fn stop(&self, name: &str) -> BackendResult<()> {
        let result = self.inner.stop(name).await;
        self.done(Operation::Stop, result)
    }

    async fn update(&self, name: &str, changes: &DriverOptions) -> BackendResult<ObservedHost> {
        let result = self.inner.update(name, changes).await;
        self.done(Operation::Update, result)
    }

    async fn capabilities(&self, driver: &str) -> BackendResult<Capabilities> {
        let result = self.inner.capabilities(driver).await;
        self.done(Operation::Capabilities, result)
    }
}

// ============================================================================
// Files
// ============================================================================

/// Temporary directory holding manifests and a state file.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    /// Write a manifest and return its path.
    pub fn manifest(&self, file_name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(file_name);
        std::fs::write(&path, content).expect("failed to write manifest");
        path
    }

    pub fn state_file(&self) -> PathBuf {
        self.dir.path().join("state").join("machines.json")
    }

    pub fn file_backend(&self) -> FileBackend {
        FileBackend::new(self.state_file())
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}
