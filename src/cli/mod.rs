//! CLI module for rustible-machine
//!
//! This module provides the command-line interface, including argument
//! parsing and subcommand dispatch.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use rustible_machine::config::{parse_duration, BackendKind};
use std::path::PathBuf;
use std::time::Duration;

/// rustible-machine - keep docker-machine hosts in their desired state
///
/// Reads a manifest of machines and drives each one to its requested state
/// (absent, present, stopped or started) through a provisioning back-end.
#[derive(Parser, Debug, Clone)]
#[command(name = "rustible-machine")]
#[command(author = "Rustible Contributors")]
#[command(version)]
#[command(about = "Desired-state management for docker-machine hosts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Provisioning back-end
    #[arg(long, global = true)]
    pub backend: Option<BackendKind>,

    /// State file of the file back-end
    #[arg(long, global = true, env = "RUSTIBLE_MACHINE_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Timeout for a single back-end call (e.g. 90s, 10m)
    #[arg(long, global = true, value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Number of machines reconciled in parallel
    #[arg(short = 'f', long, global = true)]
    pub forks: Option<usize>,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "RUSTIBLE_MACHINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output for scripting
    Json,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Reconcile every machine in a manifest
    Apply(commands::apply::ApplyArgs),

    /// Show what apply would do, without doing it
    Plan(commands::plan::PlanArgs),

    /// Show what the back-end knows about machines
    Status(commands::status::StatusArgs),

    /// List drivers, or show the options of one driver
    Drivers(commands::drivers::DriversArgs),

    /// Validate a manifest against the driver catalog
    Validate(commands::validate::ValidateArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Check if JSON output is requested
    pub fn is_json(&self) -> bool {
        matches!(self.output, OutputFormat::Json)
    }
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}
