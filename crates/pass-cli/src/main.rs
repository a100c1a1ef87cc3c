//! Pass CLI - developer tool for vault sync and local storage
//!
//! Wires the core to the HTTP API and the on-disk store.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::{load_config, open_store};
use crate::commands::config::run_config;
use crate::commands::store::run_store;
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pass=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).await?;
    let store = open_store(&config, cli.store.as_deref());

    match cli.command {
        Commands::Sync { shares, json } => run_sync(&shares, json, &config, store).await?,
        Commands::Store { command } => run_store(command, &store).await?,
        Commands::Config => run_config(&config),
    }

    Ok(())
}
