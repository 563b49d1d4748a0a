//! redirect-setup: local HTTPS redirection installer.
//!
//! This is the main entry point for the redirect-setup binary. It handles CLI
//! argument parsing, configuration loading, logging and audit initialization,
//! then hands the selected operation (or the interactive menu) to the
//! orchestrator.
//!
//! # Output
//!
//! - **Audit log**: JSON lines in `<base>/audit.log` (or syslog), never the console
//! - **Diagnostics**: `tracing` on stderr, filtered by `-v` / `RUST_LOG`
//! - **Menu and status**: stdout

use anyhow::{Context, Result};
use clap::Parser;
use redirect_setup::{
    cli::Cli,
    cli_handler,
    config::{ConfigLoader, InstallLayout},
    orchestrator::Orchestrator,
    telemetry,
};
use tracing::{debug, info};

fn main() -> Result<()> {
    // Parse CLI arguments first (before any other initialization)
    let cli = Cli::parse();

    // Load configuration with hierarchy merging; the log level may come from it
    let config = ConfigLoader::new()
        .load(&cli)
        .context("Failed to load configuration")?;

    init_tracing(cli.verbose, &config.general.log_level)?;

    debug!("Parsed CLI arguments: {:?}", cli);
    debug!("Loaded configuration: {:?}", config);

    let layout = InstallLayout::resolve(&config).context("Failed to resolve install layout")?;
    info!("Base directory: {}", layout.base_dir.display());

    telemetry::init_logger(config.audit.sink(), &layout.audit_file)
        .context("Failed to initialize audit log")?;

    let orchestrator =
        Orchestrator::from_config(&config, layout).context("Failed to prepare installer")?;

    cli_handler::handle_command(cli.command, &orchestrator)
}

/// Initialize the tracing subscriber for diagnostic logging.
///
/// This is separate from the audit telemetry, which goes to its own sink.
///
/// # Verbosity Levels
/// - 0 (default): `RUST_LOG`, else the configured `general.log_level`, else warnings
/// - 1 (-v): Info level
/// - 2 (-vv): Debug level
/// - 3+ (-vvv): Trace level
fn init_tracing(verbose: u8, config_level: &str) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env()
            .or_else(|_| match config_level.trim() {
                "" => EnvFilter::try_new("warn"),
                level => EnvFilter::try_new(level),
            })
            .unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
