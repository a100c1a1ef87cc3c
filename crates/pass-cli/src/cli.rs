use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pass")]
#[command(about = "Sync encrypted vaults and inspect local Pass storage")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the JSON client config
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to the local store file (overrides the config)
    #[arg(long, global = true, value_name = "PATH")]
    pub store: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one sync pass over cached shares plus any listed here
    Sync {
        /// Share IDs to load before syncing
        shares: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or edit the local key/value store
    Store {
        #[command(subcommand)]
        command: StoreCommands,
    },
    /// Print the resolved client configuration
    Config,
}

#[derive(Subcommand)]
pub enum StoreCommands {
    /// Print every stored entry
    Inspect,
    /// Print one entry
    Get {
        key: String,
    },
    /// Store a value (parsed as JSON, falling back to a plain string)
    Set {
        key: String,
        value: String,
    },
    /// Remove one entry
    Remove {
        key: String,
    },
    /// Remove every entry
    Clear,
}
