use serde_json::Value;

use pass_core::storage::{KeyValueStore, StorageBackend};

use crate::cli::StoreCommands;
use crate::error::CliError;

pub async fn run_store(command: StoreCommands, store: &StorageBackend) -> Result<(), CliError> {
    match command {
        StoreCommands::Inspect => {
            let StorageBackend::Disk(disk) = store else {
                return Err(CliError::NotPersistent);
            };
            let entries = disk.entries().await?;
            if entries.is_empty() {
                println!("Store at {} is empty.", disk.path().display());
            } else {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
        }
        StoreCommands::Get { key } => match store.get(&key).await? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => println!("{key} is not set"),
        },
        StoreCommands::Set { key, value } => {
            store.set(&key, parse_store_value(&value)).await?;
            println!("Stored {key}");
        }
        StoreCommands::Remove { key } => {
            store.remove(&key).await?;
            println!("Removed {key}");
        }
        StoreCommands::Clear => {
            store.clear().await?;
            println!("Store cleared");
        }
    }
    Ok(())
}

/// JSON when it parses, otherwise the raw text as a string.
pub fn parse_store_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
