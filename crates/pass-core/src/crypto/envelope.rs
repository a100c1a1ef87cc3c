//! Share-aware encryption on top of a [`CryptoProvider`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};
use zeroize::Zeroizing;

use super::keys::{SecretKey, ShareKey, ShareKeyRing};
use super::{CryptoProvider, DecryptMessageParams, EncryptMessageParams, SigningContext};
use crate::error::{Error, Result};
use crate::models::{
    EncryptedItem, EncryptedShare, EncryptedShareEvent, EncryptedShareKey, EventId, ItemContent,
    ItemRevision, Share, ShareContent, ShareEvent, ShareId, TargetType, VaultContent,
};

/// Ciphertext ready to send, tagged with the key rotation that sealed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    #[serde(rename = "KeyRotation")]
    pub key_rotation: u32,
    /// Base64 ciphertext
    #[serde(rename = "Content")]
    pub content: String,
}

/// Encrypts and decrypts shares, items and share keys.
#[derive(Debug, Clone, Default)]
pub struct Envelope<C> {
    provider: C,
}

impl<C: CryptoProvider> Envelope<C> {
    pub const fn new(provider: C) -> Self {
        Self { provider }
    }

    /// Open every sealed rotation of a share key with the user's key.
    pub fn open_share_keys(
        &self,
        share_id: &ShareId,
        encrypted: &[EncryptedShareKey],
        user_key: &SecretKey,
    ) -> Result<ShareKeyRing> {
        let mut ring = ShareKeyRing::new(share_id.clone());
        for sealed in encrypted {
            let bytes = self.open(&sealed.key, user_key, SigningContext::ShareKey)?;
            ring.insert(ShareKey::new(
                sealed.key_rotation,
                SecretKey::from_slice(&bytes)?,
            ));
        }
        trace!(share_id = %share_id, rotations = ring.len(), "Opened share keys");
        Ok(ring)
    }

    /// Seal a share key rotation for the user.
    pub fn seal_share_key(&self, key: &ShareKey, user_key: &SecretKey) -> Result<EncryptedShareKey> {
        Ok(EncryptedShareKey {
            key_rotation: key.rotation,
            key: self.seal(key.secret.as_bytes(), user_key, SigningContext::ShareKey)?,
            create_time: crate::util::unix_timestamp_now(),
        })
    }

    /// Decrypt share metadata into a [`Share`] positioned at `event_id`.
    #[instrument(level = "debug", skip(self, share, keys), fields(share_id = %share.share_id))]
    pub fn decrypt_share_content(
        &self,
        share: &EncryptedShare,
        keys: &ShareKeyRing,
        event_id: EventId,
    ) -> Result<Share> {
        let content = match TargetType::try_from(share.target_type)? {
            TargetType::Vault => ShareContent::Vault(self.decrypt_vault_content(share, keys)?),
            TargetType::Item => ShareContent::Item,
        };

        Ok(Share {
            share_id: share.share_id.clone(),
            vault_id: share.vault_id.clone(),
            target_id: share.target_id.clone(),
            content,
            primary: share.primary,
            event_id,
            create_time: share.create_time,
        })
    }

    /// Decrypt the vault name/description carried by a vault share.
    pub fn decrypt_vault_content(
        &self,
        share: &EncryptedShare,
        keys: &ShareKeyRing,
    ) -> Result<VaultContent> {
        Self::check_ring(&share.share_id, keys)?;
        let (Some(content), Some(rotation)) = (&share.content, share.content_key_rotation) else {
            return Err(Error::Decryption(format!(
                "vault share {} has no content",
                share.share_id
            )));
        };
        let bytes = self.open(content, keys.get(rotation)?, SigningContext::VaultContent)?;
        VaultContent::decode(&bytes)
    }

    /// Decrypt one item of a share.
    pub fn decrypt_item_content(
        &self,
        share_id: &ShareId,
        item: &EncryptedItem,
        keys: &ShareKeyRing,
    ) -> Result<ItemRevision> {
        Self::check_ring(share_id, keys)?;
        let bytes = self.open(
            &item.content,
            keys.get(item.key_rotation)?,
            SigningContext::ItemContent,
        )?;

        Ok(ItemRevision {
            share_id: share_id.clone(),
            item_id: item.item_id.clone(),
            revision: item.revision,
            revision_time: item.revision_time,
            last_use_time: item.last_use_time,
            state: item.state,
            content: ItemContent::decode(&bytes)?,
        })
    }

    /// Decrypt one entry of a share's event stream.
    pub fn decrypt_event(
        &self,
        share_id: &ShareId,
        event: &EncryptedShareEvent,
        keys: &ShareKeyRing,
    ) -> Result<ShareEvent> {
        Ok(match event {
            EncryptedShareEvent::ItemUpdated { item } => {
                ShareEvent::ItemUpserted(self.decrypt_item_content(share_id, item, keys)?)
            }
            EncryptedShareEvent::ItemDeleted { item_id } => ShareEvent::ItemDeleted(item_id.clone()),
            EncryptedShareEvent::ItemLastUsed {
                item_id,
                last_use_time,
            } => ShareEvent::ItemLastUsed {
                item_id: item_id.clone(),
                last_use_time: *last_use_time,
            },
            EncryptedShareEvent::ShareUpdated { share } => {
                let content = match TargetType::try_from(share.target_type)? {
                    TargetType::Vault => Some(self.decrypt_vault_content(share, keys)?),
                    TargetType::Item => None,
                };
                ShareEvent::ShareUpdated(content)
            }
        })
    }

    /// Encrypt arbitrary plaintext with the share's newest key rotation.
    pub fn encrypt_for_share(
        &self,
        data: &[u8],
        keys: &ShareKeyRing,
        context: SigningContext,
    ) -> Result<EncryptedBlob> {
        let (key_rotation, key) = keys.latest()?;
        Ok(EncryptedBlob {
            key_rotation,
            content: self.seal(data, key, context)?,
        })
    }

    pub fn encrypt_item_content(
        &self,
        content: &ItemContent,
        keys: &ShareKeyRing,
    ) -> Result<EncryptedBlob> {
        let plaintext = Zeroizing::new(content.encode()?);
        self.encrypt_for_share(&plaintext, keys, SigningContext::ItemContent)
    }

    pub fn encrypt_vault_content(
        &self,
        content: &VaultContent,
        keys: &ShareKeyRing,
    ) -> Result<EncryptedBlob> {
        self.encrypt_for_share(&content.encode()?, keys, SigningContext::VaultContent)
    }

    /// Seal a local blob (not bound to any share) with a standalone key.
    pub fn seal_local(&self, data: &[u8], key: &SecretKey) -> Result<String> {
        self.seal(data, key, SigningContext::Cache)
    }

    pub fn open_local(&self, encoded: &str, key: &SecretKey) -> Result<Zeroizing<Vec<u8>>> {
        self.open(encoded, key, SigningContext::Cache)
    }

    fn check_ring(share_id: &ShareId, keys: &ShareKeyRing) -> Result<()> {
        if keys.share_id() == share_id {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "key ring for {} used on share {share_id}",
                keys.share_id()
            )))
        }
    }

    fn seal(&self, data: &[u8], key: &SecretKey, context: SigningContext) -> Result<String> {
        let encrypted = self.provider.encrypt_message(EncryptMessageParams {
            data,
            key,
            context,
        })?;
        Ok(STANDARD.encode(encrypted.message))
    }

    fn open(
        &self,
        encoded: &str,
        key: &SecretKey,
        context: SigningContext,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let message = STANDARD
            .decode(encoded)
            .map_err(|error| Error::Decryption(format!("invalid base64 ciphertext: {error}")))?;
        let decrypted = self.provider.decrypt_message(DecryptMessageParams {
            message: &message,
            key,
            context,
        })?;
        if decrypted.verified {
            Ok(decrypted.data)
        } else {
            Err(Error::Decryption(format!(
                "{context:?} failed signature verification"
            )))
        }
    }
}
