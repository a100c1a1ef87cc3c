//! Item model

use std::fmt;

use serde::{Deserialize, Serialize};

use super::share::ShareId;
use crate::error::{Error, Result};

string_id!(
    /// Identifier of an item inside its share
    ItemId
);

/// Server revision of an item, bumped on every confirmed mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub u64);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Address of an item: the share that owns it plus its id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub share_id: ShareId,
    pub item_id: ItemId,
}

impl ItemKey {
    #[must_use]
    pub fn new(share_id: impl Into<ShareId>, item_id: impl Into<ItemId>) -> Self {
        Self {
            share_id: share_id.into(),
            item_id: item_id.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.share_id, self.item_id)
    }
}

/// Trash state of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ItemState {
    #[default]
    Active,
    Trashed,
}

impl TryFrom<u8> for ItemState {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Active),
            2 => Ok(Self::Trashed),
            other => Err(Error::InvalidInput(format!("unknown item state {other}"))),
        }
    }
}

impl From<ItemState> for u8 {
    fn from(value: ItemState) -> Self {
        match value {
            ItemState::Active => 1,
            ItemState::Trashed => 2,
        }
    }
}

/// Fields common to every item type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub name: String,
    #[serde(default)]
    pub note: String,
}

/// Decrypted item payload, keyed by item type
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ItemContent {
    Login {
        metadata: ItemMetadata,
        username: String,
        password: String,
        #[serde(default)]
        urls: Vec<String>,
        #[serde(default)]
        totp_uri: Option<String>,
    },
    Note {
        metadata: ItemMetadata,
    },
    Alias {
        metadata: ItemMetadata,
        alias_email: String,
    },
    CreditCard {
        metadata: ItemMetadata,
        cardholder_name: String,
        number: String,
        expiration_date: String,
        verification_number: String,
    },
}

impl ItemContent {
    #[must_use]
    pub fn note(name: impl Into<String>, note: impl Into<String>) -> Self {
        Self::Note {
            metadata: ItemMetadata {
                name: name.into(),
                note: note.into(),
            },
        }
    }

    #[must_use]
    pub const fn metadata(&self) -> &ItemMetadata {
        match self {
            Self::Login { metadata, .. }
            | Self::Note { metadata }
            | Self::Alias { metadata, .. }
            | Self::CreditCard { metadata, .. } => metadata,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Note { .. } => "note",
            Self::Alias { .. } => "alias",
            Self::CreditCard { .. } => "creditCard",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl fmt::Debug for ItemContent {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ItemContent")
            .field("type", &self.kind())
            .field("name", &self.metadata().name)
            .field("secrets", &"[REDACTED]")
            .finish()
    }
}

/// A decrypted, versioned item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRevision {
    pub share_id: ShareId,
    pub item_id: ItemId,
    pub revision: Revision,
    /// Unix seconds of the last confirmed mutation
    pub revision_time: i64,
    pub last_use_time: Option<i64>,
    pub state: ItemState,
    pub content: ItemContent,
}

impl ItemRevision {
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey {
            share_id: self.share_id.clone(),
            item_id: self.item_id.clone(),
        }
    }
}

/// Item as returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedItem {
    #[serde(rename = "ItemID")]
    pub item_id: ItemId,
    #[serde(rename = "Revision")]
    pub revision: Revision,
    #[serde(rename = "KeyRotation")]
    pub key_rotation: u32,
    /// Base64 ciphertext of the encoded [`ItemContent`]
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(rename = "State")]
    pub state: ItemState,
    #[serde(rename = "RevisionTime", default)]
    pub revision_time: i64,
    #[serde(rename = "LastUseTime", default)]
    pub last_use_time: Option<i64>,
}

/// Revision bump returned by trash/restore endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionUpdate {
    #[serde(rename = "ItemID")]
    pub item_id: ItemId,
    #[serde(rename = "Revision")]
    pub revision: Revision,
    #[serde(rename = "State")]
    pub state: ItemState,
    #[serde(rename = "RevisionTime", default)]
    pub revision_time: i64,
}
