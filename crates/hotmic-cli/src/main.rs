//! HotMic command line interface.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Low-latency microphone routing engine.
#[derive(Parser)]
#[command(name = "hotmic", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List audio devices.
    Devices,
    /// Run the engine against real devices.
    Run {
        /// Engine config file (defaults to the user config path).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Headless smoke check: render a test tone through a config.
    Check {
        /// Engine config file (defaults to a single clean channel).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Number of blocks to render.
        #[arg(long, default_value_t = 500)]
        blocks: usize,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Devices => commands::devices::run(),
        Commands::Run { config } => commands::run::run(config),
        Commands::Check { config, blocks } => commands::check::run(config, blocks),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
