mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tursotap",
    version,
    about = "Extract Turso, libSQL and SQLite tables as a Singer message stream"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Replicate the configured tables, writing messages to stdout
    Run {
        /// Path to tap config YAML file
        config: PathBuf,
    },
    /// Validate tap configuration and connectivity
    Check {
        /// Path to tap config YAML file
        config: PathBuf,
    },
    /// List source tables and their schemas as JSON
    Discover {
        /// Path to tap config YAML file
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run { config } => commands::run::execute(&config).await,
        Commands::Check { config } => commands::check::execute(&config).await,
        Commands::Discover { config } => commands::discover::execute(&config).await,
    }
}
