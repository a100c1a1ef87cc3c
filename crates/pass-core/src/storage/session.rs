//! Session-scoped store.

use serde_json::Value;
use tracing::debug;

use super::{KeyValueStore, MemoryStore};
use crate::error::Result;

/// Values that live until [`SessionStore::end_session`] or process exit.
#[derive(Clone, Debug, Default)]
pub struct SessionStore {
    inner: MemoryStore,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything stored during the session (logout, lock).
    pub async fn end_session(&self) {
        let dropped = self.inner.len().await;
        self.inner.apply(super::StorageChange::Cleared).await;
        debug!("Session ended, dropped {dropped} entries");
    }
}

impl KeyValueStore for SessionStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn end_session_drops_everything() {
        let store = SessionStore::new();
        store.set("offline-key", json!("k")).await.unwrap();
        store.end_session().await;
        assert_eq!(store.get("offline-key").await.unwrap(), None);
    }
}
