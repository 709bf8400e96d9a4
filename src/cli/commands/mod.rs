//! Subcommands module for the rustible-machine CLI
//!
//! This module contains all the subcommand implementations.

pub mod apply;
pub mod drivers;
pub mod plan;
pub mod status;
pub mod validate;

use crate::cli::output::OutputFormatter;
use anyhow::Result;
use rustible_machine::backend::{FileBackend, MemoryBackend, ProvisioningBackend};
use rustible_machine::config::{BackendKind, Config};
use rustible_machine::drivers::DriverRegistry;
use rustible_machine::error::Error;
use rustible_machine::reconcile::Reconciler;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// Driver catalog with configured overrides
    pub registry: DriverRegistry,
    /// Machines reconciled in parallel
    pub forks: usize,
    /// Per back-end call timeout
    pub timeout: Duration,
    /// Selected back-end
    pub backend: BackendKind,
    /// State file of the file back-end
    pub state_file: PathBuf,
    /// Cancelled on Ctrl-C
    pub cancel: CancellationToken,
}

impl CommandContext {
    /// Create a new command context from CLI arguments. Flags win over
    /// configuration.
    pub fn new(cli: &crate::cli::Cli, config: Config, registry: DriverRegistry) -> Self {
        let use_color = !cli.no_color && config.colors.enabled;
        let output = OutputFormatter::new(use_color, cli.is_json(), cli.verbosity());

        Self {
            output,
            registry,
            forks: cli.forks.unwrap_or(config.defaults.forks).max(1),
            timeout: cli.timeout.unwrap_or(config.defaults.timeout),
            backend: cli.backend.unwrap_or(config.defaults.backend),
            state_file: cli.state_file.clone().unwrap_or_else(|| config.state_file()),
            cancel: CancellationToken::new(),
            config,
        }
    }

    /// Build the selected provisioning back-end.
    pub fn backend(&self) -> Arc<dyn ProvisioningBackend> {
        let settings = &self.config.backend;
        match self.backend {
            BackendKind::File => Arc::new(
                FileBackend::new(&self.state_file)
                    .with_registry(self.registry.clone())
                    .with_auto_start(settings.auto_start)
                    .with_force_remove(settings.force_remove),
            ),
            BackendKind::Memory => Arc::new(
                MemoryBackend::new()
                    .with_registry(self.registry.clone())
                    .with_auto_start(settings.auto_start)
                    .with_force_remove(settings.force_remove),
            ),
        }
    }

    /// A reconciler wired to this context's timeout and cancellation.
    pub fn reconciler(&self, check_mode: bool) -> Reconciler {
        Reconciler::new()
            .with_timeout(self.timeout)
            .with_check_mode(check_mode)
            .with_cancellation(self.cancel.clone())
    }

    /// Report a library error and return its exit code.
    pub fn fail(&self, error: &Error) -> i32 {
        self.output.error(&error.to_string());
        error.exit_code()
    }
}

/// Trait for runnable commands
#[async_trait::async_trait]
pub trait Runnable {
    /// Execute the command
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32>;
}

/// Split a comma separated `--limit` into machine names.
pub(crate) fn parse_limit(limit: Option<&str>) -> Option<Vec<String>> {
    limit.map(|l| {
        l.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None), None);
        assert_eq!(
            parse_limit(Some("web01, db01,,")),
            Some(vec!["web01".to_string(), "db01".to_string()])
        );
    }
}
