//! Key/value storage backends.
//!
//! Every backend stores opaque JSON values under string keys; callers own the
//! schema. [`StorageBackend::detect`] picks a backend from what the runtime
//! offers, falling back to [`MemoryStore`].

mod cache;
mod disk;
mod memory;
mod session;

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::config::PassConfig;
use crate::error::Result;

pub use cache::StateCache;
pub use disk::DiskStore;
pub use memory::{MemoryStore, StorageChange};
pub use session::SessionStore;

const DEFAULT_STORE_FILE: &str = "pass-store.json";

/// Uniform get/set/remove/clear interface over a backing store.
#[allow(async_fn_in_trait)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, serde_json::to_value(value)?).await
    }
}

/// Preferred storage lifetime
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Survives restarts
    #[default]
    Persistent,
    /// Lives until the session ends
    Session,
    /// Lives as long as the process
    Memory,
}

/// What the host runtime can provide
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuntimeCapabilities {
    /// Writable directory for persistent data
    pub data_dir: Option<PathBuf>,
    /// The host offers session-scoped storage
    pub session_storage: bool,
}

#[derive(Clone, Debug)]
pub enum StorageBackend {
    Disk(DiskStore),
    Session(SessionStore),
    Memory(MemoryStore),
}

impl StorageBackend {
    /// Pick the closest backend to the configured preference.
    #[must_use]
    pub fn detect(capabilities: &RuntimeCapabilities, config: &PassConfig) -> Self {
        let disk_path = config.storage_path.clone().or_else(|| {
            capabilities
                .data_dir
                .as_ref()
                .map(|dir| dir.join(DEFAULT_STORE_FILE))
        });

        let backend = match (config.storage, disk_path) {
            (StorageKind::Persistent, Some(path)) => Self::Disk(DiskStore::new(path)),
            (StorageKind::Persistent | StorageKind::Session, _)
                if capabilities.session_storage =>
            {
                Self::Session(SessionStore::new())
            }
            _ => Self::Memory(MemoryStore::new()),
        };

        if backend.kind() != config.storage {
            info!(
                "Storage preference {:?} unavailable, using {:?}",
                config.storage,
                backend.kind()
            );
        }
        backend
    }

    #[must_use]
    pub const fn kind(&self) -> StorageKind {
        match self {
            Self::Disk(_) => StorageKind::Persistent,
            Self::Session(_) => StorageKind::Session,
            Self::Memory(_) => StorageKind::Memory,
        }
    }
}

impl KeyValueStore for StorageBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        match self {
            Self::Disk(store) => store.get(key).await,
            Self::Session(store) => store.get(key).await,
            Self::Memory(store) => store.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        match self {
            Self::Disk(store) => store.set(key, value).await,
            Self::Session(store) => store.set(key, value).await,
            Self::Memory(store) => store.set(key, value).await,
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match self {
            Self::Disk(store) => store.remove(key).await,
            Self::Session(store) => store.remove(key).await,
            Self::Memory(store) => store.remove(key).await,
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            Self::Disk(store) => store.clear().await,
            Self::Session(store) => store.clear().await,
            Self::Memory(store) => store.clear().await,
        }
    }
}
