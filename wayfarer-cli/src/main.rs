//! Wayfarer CLI - command-line driver for the wayfarer core.
//!
//! Runs simulated trips through the navigation tracker and manages the
//! INI configuration file.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "wayfarer")]
#[command(version = wayfarer::VERSION)]
#[command(about = "Resource coordination and navigation tracking core", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.wayfarer/config.ini
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a simulated trip and print progress events
    Simulate(SimulateArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        e.exit();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Simulate(args) => {
            let runner = CliRunner::new(cli.config.as_deref())?;
            commands::simulate::run(args, runner).await
        }
        Commands::Config { command } => commands::config::run(command, cli.config.as_deref()),
    }
}
