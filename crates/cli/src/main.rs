//! # Vision CLI
//!
//! Command-line entry point.
//!
//! - `list`: enumerate attached devices
//! - `validate`: check a configuration file
//! - `run`: stream, register and dispatch until stopped

mod cli;
mod commands;
mod error;
mod pipeline;
mod settings;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_list, run_pipeline, run_validate};
use contracts::VisionConfig;
use observability::ObservabilityConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    observability::init_with_config(observability_config(&cli))?;

    info!(version = env!("CARGO_PKG_VERSION"), "vision CLI starting");

    let result = match &cli.command {
        Commands::List(args) => run_list(args),
        Commands::Validate(args) => run_validate(args),
        Commands::Run(args) => run_pipeline(args).await,
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "command failed");
    }

    result
}

/// Logging settings from the config file, with CLI flags on top.
///
/// The file is read leniently: the commands report load errors themselves.
/// The exporter is left to the pipeline, which knows the final port.
fn observability_config(cli: &Cli) -> ObservabilityConfig {
    let file_config = cli
        .command
        .config_path()
        .filter(|path| path.exists())
        .and_then(|path| config_loader::ConfigLoader::load_from_path(path).ok())
        .unwrap_or_else(VisionConfig::default);

    let mut config = ObservabilityConfig::from_vision(&file_config);
    config.metrics_port = None;
    if let Some(level) = cli.level_override() {
        config.default_log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format.into();
    }
    config
}
