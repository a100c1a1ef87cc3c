//! Key material handed to the envelope by its caller.
//!
//! Nothing in this module persists keys. Bytes live in [`Zeroizing`] buffers
//! and are wiped when the last clone is dropped.

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::models::ShareId;

/// Length of every symmetric key in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// A 256-bit symmetric key
#[derive(Clone)]
pub struct SecretKey(Zeroizing<[u8; KEY_LEN]>);

/// Key that seals share keys for the current user
pub type UserKey = SecretKey;

/// Key that seals the local state cache
pub type CacheKey = SecretKey;

impl SecretKey {
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Generate a fresh random key
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        rand::rng().fill_bytes(&mut bytes[..]);
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            Error::InvalidInput(format!(
                "key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|error| Error::InvalidInput(format!("invalid base64 key: {error}")))?,
        );
        Self::from_slice(&bytes)
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0[..])
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("SecretKey([REDACTED])")
    }
}

/// One rotation of a share key
#[derive(Debug, Clone)]
pub struct ShareKey {
    pub rotation: u32,
    pub secret: SecretKey,
}

impl ShareKey {
    #[must_use]
    pub const fn new(rotation: u32, secret: SecretKey) -> Self {
        Self { rotation, secret }
    }
}

/// Every known rotation of one share's key
#[derive(Debug, Clone)]
pub struct ShareKeyRing {
    share_id: ShareId,
    keys: BTreeMap<u32, SecretKey>,
}

impl ShareKeyRing {
    #[must_use]
    pub const fn new(share_id: ShareId) -> Self {
        Self {
            share_id,
            keys: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_keys(share_id: ShareId, keys: impl IntoIterator<Item = ShareKey>) -> Self {
        let mut ring = Self::new(share_id);
        for key in keys {
            ring.insert(key);
        }
        ring
    }

    pub fn insert(&mut self, key: ShareKey) {
        self.keys.insert(key.rotation, key.secret);
    }

    #[must_use]
    pub const fn share_id(&self) -> &ShareId {
        &self.share_id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key for an exact rotation
    pub fn get(&self, rotation: u32) -> Result<&SecretKey> {
        self.keys.get(&rotation).ok_or_else(|| Error::KeyNotFound {
            share_id: self.share_id.to_string(),
            rotation,
        })
    }

    /// Newest rotation, used for every new encryption
    pub fn latest(&self) -> Result<(u32, &SecretKey)> {
        self.keys
            .iter()
            .next_back()
            .map(|(rotation, key)| (*rotation, key))
            .ok_or_else(|| Error::NotFound(format!("no share keys loaded for {}", self.share_id)))
    }
}
