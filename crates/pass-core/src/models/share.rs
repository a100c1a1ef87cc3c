//! Share model

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

string_id!(
    /// Identifier of a share (an encryption/access boundary)
    ShareId
);

string_id!(
    /// Identifier of the vault a share belongs to
    VaultId
);

string_id!(
    /// Position in a share's server event stream
    EventId
);

/// What a share grants access to.
///
/// The API sends this as an integer; unknown values are rejected when the
/// share is loaded rather than at deserialization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TargetType {
    /// A whole vault and its items
    Vault,
    /// A single item
    Item,
}

impl TryFrom<u8> for TargetType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Vault),
            2 => Ok(Self::Item),
            other => Err(Error::UnsupportedShareType(other)),
        }
    }
}

impl From<TargetType> for u8 {
    fn from(value: TargetType) -> Self {
        match value {
            TargetType::Vault => 1,
            TargetType::Item => 2,
        }
    }
}

/// Decrypted vault metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultContent {
    pub name: String,
    pub description: String,
}

impl VaultContent {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// Encode into the plaintext bytes that get encrypted for the share
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode plaintext bytes produced by [`VaultContent::encode`]
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Decrypted payload of a share, by target type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShareContent {
    Vault(VaultContent),
    /// Item shares carry no content of their own
    Item,
}

/// A fully loaded share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub share_id: ShareId,
    pub vault_id: VaultId,
    pub target_id: String,
    pub content: ShareContent,
    pub primary: bool,
    /// Last applied event cursor. Only the event synchronizer moves it.
    pub event_id: EventId,
    pub create_time: i64,
}

impl Share {
    #[must_use]
    pub const fn target_type(&self) -> TargetType {
        match self.content {
            ShareContent::Vault(_) => TargetType::Vault,
            ShareContent::Item => TargetType::Item,
        }
    }

    #[must_use]
    pub const fn vault_content(&self) -> Option<&VaultContent> {
        match &self.content {
            ShareContent::Vault(content) => Some(content),
            ShareContent::Item => None,
        }
    }

    pub(crate) fn advance_cursor(&mut self, event_id: EventId) {
        self.event_id = event_id;
    }
}

/// Share metadata as returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedShare {
    #[serde(rename = "ShareID")]
    pub share_id: ShareId,
    #[serde(rename = "VaultID")]
    pub vault_id: VaultId,
    #[serde(rename = "TargetID")]
    pub target_id: String,
    #[serde(rename = "TargetType")]
    pub target_type: u8,
    #[serde(rename = "Primary", default)]
    pub primary: bool,
    /// Base64 ciphertext of the vault content, absent for item shares
    #[serde(rename = "Content", default)]
    pub content: Option<String>,
    #[serde(rename = "ContentKeyRotation", default)]
    pub content_key_rotation: Option<u32>,
    #[serde(rename = "CreateTime", default)]
    pub create_time: i64,
}

/// One rotation of a share key, sealed with the user's key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedShareKey {
    #[serde(rename = "KeyRotation")]
    pub key_rotation: u32,
    /// Base64 ciphertext of the 32-byte share key
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "CreateTime", default)]
    pub create_time: i64,
}
