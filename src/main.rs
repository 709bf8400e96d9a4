//! rustible-machine - keep docker-machine hosts in their desired state
//!
//! This is the main entry point for the rustible-machine CLI.

mod cli;

use anyhow::Result;
use cli::commands::{CommandContext, Runnable};
use cli::{Cli, Commands};
use rustible_machine::config::{Config, LogFormat, LoggingConfig};
use rustible_machine::drivers::DriverRegistry;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {:#}", e);
        Config::default()
    });

    // Initialize logging based on verbosity and config
    init_logging(cli.verbosity(), &config.logging);
    tracing::debug!(version = VERSION, "rustible-machine starting");

    let registry = config.registry().unwrap_or_else(|e| {
        eprintln!("Warning: Ignoring driver overrides: {:#}", e);
        DriverRegistry::with_builtins()
    });

    // Create command context
    let mut ctx = CommandContext::new(&cli, config, registry);

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current step");
            cancel.cancel();
        }
    });

    // Execute the appropriate command
    let exit_code = match &cli.command {
        Commands::Apply(args) => args.run(&mut ctx).await?,
        Commands::Plan(args) => args.run(&mut ctx).await?,
        Commands::Status(args) => args.run(&mut ctx).await?,
        Commands::Drivers(args) => args.run(&mut ctx).await?,
        Commands::Validate(args) => args.run(&mut ctx).await?,
    };

    std::process::exit(exit_code);
}

/// Initialize logging based on verbosity level. Logs go to stderr so that
/// JSON output on stdout stays parseable.
fn init_logging(verbosity: u8, logging: &LoggingConfig) {
    let filter = match verbosity {
        0 => logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(verbosity >= 3)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init(),
    }
}
