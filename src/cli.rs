//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Stepflow CLI.
#[derive(Parser)]
#[command(name = "stepflow")]
#[command(about = "Event-driven linear workflow orchestrator")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "config/stepflow.toml",
        env = "STEPFLOW_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub(crate) enum Commands {
    /// Run the orchestrator in foreground (default)
    Run {
        /// Override `server.host`
        #[arg(long)]
        host: Option<String>,

        /// Override `server.port`
        #[arg(long)]
        port: Option<u16>,
    },

    /// Load and validate the configuration file, then exit
    CheckConfig,
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Run {
            host: None,
            port: None,
        }
    }
}
