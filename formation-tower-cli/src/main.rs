//! Formation Tower CLI - Command-line interface
//!
//! Runs the tower controller, submits manual jobs and manages the
//! configuration file.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use formation_tower::config::config_file_path;

#[derive(Parser)]
#[command(name = "towerctl")]
#[command(version = formation_tower::VERSION)]
#[command(about = "Orchestrate battery formation fixtures in a tower", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.formation-tower/tower.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every allowed fixture until interrupted
    Run {
        /// Drive simulated fixtures instead of the field bus
        #[arg(long)]
        simulate: bool,
    },

    /// Submit trays to fixtures interactively
    Manual {
        /// Report to the mock Cell API instead of the real one
        #[arg(long)]
        mock: bool,

        /// Drive simulated fixtures instead of the field bus
        #[arg(long)]
        simulate: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config_file_path);

    let result = match cli.command {
        Commands::Run { simulate } => commands::run::run(&config_path, simulate).await,
        Commands::Manual { mock, simulate } => {
            commands::manual::run(&config_path, mock, simulate).await
        }
        Commands::Config { command } => commands::config::run(&config_path, command),
    };

    if let Err(e) = result {
        e.exit();
    }
}
