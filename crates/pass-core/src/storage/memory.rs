//! In-process store with a change feed.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

use super::KeyValueStore;
use crate::error::Result;

const CHANGE_FEED_CAPACITY: usize = 64;

/// A write observed on a [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageChange {
    Set { key: String, value: Value },
    Removed { key: String },
    Cleared,
}

/// Authoritative in-process map.
///
/// Clones share the same map. Other contexts mirror it by subscribing to the
/// change feed and replaying each change into their own store with
/// [`MemoryStore::apply`].
#[derive(Clone, Debug)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Value>>>,
    changes: broadcast::Sender<StorageChange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }

    /// Replay a change received from another store.
    pub async fn apply(&self, change: StorageChange) {
        {
            let mut entries = self.entries.write().await;
            match &change {
                StorageChange::Set { key, value } => {
                    entries.insert(key.clone(), value.clone());
                }
                StorageChange::Removed { key } => {
                    entries.remove(key);
                }
                StorageChange::Cleared => entries.clear(),
            }
        }
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.apply(StorageChange::Set {
            key: key.to_string(),
            value,
        })
        .await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if self.entries.read().await.contains_key(key) {
            self.apply(StorageChange::Removed {
                key: key.to_string(),
            })
            .await;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.apply(StorageChange::Cleared).await;
        Ok(())
    }
}
