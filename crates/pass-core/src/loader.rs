//! Share/vault loader.
//!
//! Fetches share metadata, every share key rotation and the latest event
//! cursor, then hands them to the envelope. API failures surface unchanged;
//! retrying is the caller's decision.

use tracing::{debug, instrument};

use crate::api::{requests, ApiClient};
use crate::crypto::{CryptoProvider, Envelope, ShareKeyRing, UserKey};
use crate::error::{Error, Result};
use crate::models::{ItemRevision, Share, ShareId, TargetType};

/// A decrypted share together with its opened key ring
#[derive(Debug, Clone)]
pub struct LoadedShare {
    pub share: Share,
    pub keys: ShareKeyRing,
}

pub struct ShareLoader<'a, A, C> {
    api: &'a A,
    envelope: &'a Envelope<C>,
    user_key: &'a UserKey,
}

impl<'a, A: ApiClient, C: CryptoProvider> ShareLoader<'a, A, C> {
    pub const fn new(api: &'a A, envelope: &'a Envelope<C>, user_key: &'a UserKey) -> Self {
        Self {
            api,
            envelope,
            user_key,
        }
    }

    /// Load and decrypt a share of the expected target type.
    #[instrument(level = "debug", skip(self), fields(share_id = %share_id))]
    pub async fn load_share(
        &self,
        share_id: &ShareId,
        target_type: TargetType,
    ) -> Result<LoadedShare> {
        let (encrypted, sealed_keys, event_id) = tokio::try_join!(
            requests::get_share(self.api, share_id),
            requests::get_share_keys(self.api, share_id),
            requests::get_latest_event_id(self.api, share_id),
        )?;

        let actual = TargetType::try_from(encrypted.target_type)?;
        if actual != target_type {
            return Err(Error::InvalidInput(format!(
                "share {share_id} is a {actual:?} share, expected {target_type:?}"
            )));
        }

        let keys = self
            .envelope
            .open_share_keys(share_id, &sealed_keys, self.user_key)?;
        let share = self
            .envelope
            .decrypt_share_content(&encrypted, &keys, event_id)?;

        debug!(rotations = keys.len(), cursor = %share.event_id, "Loaded share");
        Ok(LoadedShare { share, keys })
    }

    /// Fetch and decrypt the current revision of every item in a share.
    #[instrument(level = "debug", skip(self, keys), fields(share_id = %keys.share_id()))]
    pub async fn load_items(&self, keys: &ShareKeyRing) -> Result<Vec<ItemRevision>> {
        let share_id = keys.share_id();
        let encrypted = requests::get_items(self.api, share_id).await?;
        let items = encrypted
            .iter()
            .map(|item| self.envelope.decrypt_item_content(share_id, item, keys))
            .collect::<Result<Vec<_>>>()?;
        debug!(count = items.len(), "Loaded items");
        Ok(items)
    }
}
