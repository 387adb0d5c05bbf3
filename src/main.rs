//! Stepflow - event-driven linear workflow orchestrator
//!
//! Main entry point for the stepflow CLI and server.

mod cli;
mod server;

use std::path::Path;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{error, warn};

use stepflow_config::{Config, ConfigLoader, ConfigValidator, ValidationResult};

use crate::cli::{Cli, Commands};
use crate::server::{init_tracing, run_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or_default() {
        Commands::CheckConfig => check_config(&cli.config),
        Commands::Run { host, port } => {
            let mut config = ConfigLoader::load_or_default(&cli.config)
                .with_context(|| format!("failed to load {}", cli.config.display()))?;
            apply_overrides(&mut config, host, port);

            init_tracing(&config.logging)?;

            let report = ConfigValidator::validate(&config);
            for warning in &report.warnings {
                warn!("Config warning at {}: {}", warning.path, warning.message);
            }
            if !report.is_valid() {
                for err in &report.errors {
                    error!("Config error at {}: {}", err.path, err.message);
                }
                bail!("invalid configuration ({} errors)", report.errors.len());
            }

            run_server(config).await
        }
    }
}

fn apply_overrides(config: &mut Config, host: Option<String>, port: Option<u16>) {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
}

/// Load and validate `path`, printing every finding.
fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = ConfigLoader::load(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let report = ConfigValidator::validate(&config);
    print_report(path, &report);
    if !report.is_valid() {
        bail!("{} has {} errors", path.display(), report.errors.len());
    }
    Ok(())
}

fn print_report(path: &Path, report: &ValidationResult) {
    for err in &report.errors {
        println!("error: {}: {}", err.path, err.message);
    }
    for warning in &report.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    if report.is_valid() {
        println!(
            "{} is valid ({} warnings)",
            path.display(),
            report.warnings.len()
        );
    }
}
