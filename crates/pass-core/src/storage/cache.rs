//! Encrypted snapshot of the vault state.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::KeyValueStore;
use crate::crypto::{CacheKey, CryptoProvider, Envelope};
use crate::error::Result;
use crate::state::StateSnapshot;

const CACHE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CachedState {
    version: u32,
    /// Sealed JSON of the [`StateSnapshot`]
    data: String,
}

/// Persists [`StateSnapshot`]s through any [`KeyValueStore`].
///
/// Shares, cursors and items are sealed with the cache key; key rings are not
/// part of the snapshot.
pub struct StateCache<S> {
    store: S,
    key: CacheKey,
    entry: String,
}

impl<S: KeyValueStore> StateCache<S> {
    /// `namespace` separates caches of different users in one store.
    pub fn new(store: S, key: CacheKey, namespace: &str) -> Self {
        Self {
            store,
            key,
            entry: format!("{namespace}:state"),
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub async fn save<C: CryptoProvider>(
        &self,
        envelope: &Envelope<C>,
        snapshot: &StateSnapshot,
    ) -> Result<()> {
        let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(snapshot)?);
        let cached = CachedState {
            version: CACHE_VERSION,
            data: envelope.seal_local(&plaintext, &self.key)?,
        };
        self.store.set_json(&self.entry, &cached).await?;
        debug!(
            "Cached {} shares and {} items",
            snapshot.shares.len(),
            snapshot.items.len()
        );
        Ok(())
    }

    /// Load the cached snapshot.
    ///
    /// A cache from another version, or one the key cannot open, is discarded
    /// and reported as absent.
    pub async fn load<C: CryptoProvider>(
        &self,
        envelope: &Envelope<C>,
    ) -> Result<Option<StateSnapshot>> {
        let cached: CachedState = match self.store.get_json(&self.entry).await {
            Ok(Some(cached)) => cached,
            Ok(None) => return Ok(None),
            Err(error) => {
                warn!("Discarding unreadable state cache: {error}");
                self.clear().await?;
                return Ok(None);
            }
        };
        if cached.version != CACHE_VERSION {
            warn!("Discarding state cache version {}", cached.version);
            self.clear().await?;
            return Ok(None);
        }

        let snapshot = envelope
            .open_local(&cached.data, &self.key)
            .and_then(|plaintext| Ok(serde_json::from_slice::<StateSnapshot>(&plaintext)?));
        match snapshot {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(error) => {
                warn!("Discarding state cache: {error}");
                self.clear().await?;
                Ok(None)
            }
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.remove(&self.entry).await
    }
}
