use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] pass_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{0} is not set. Export it or add it to .env before running `pass sync`.")]
    MissingCredential(&'static str),
    #[error("Local store is not persistent; pass --store or set storage_path to inspect it")]
    NotPersistent,
}
