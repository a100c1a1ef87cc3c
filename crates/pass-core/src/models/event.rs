//! Share event stream model

use serde::{Deserialize, Serialize};

use super::item::{EncryptedItem, ItemId, ItemRevision};
use super::share::{EncryptedShare, EventId, VaultContent};

/// One change in a share's event stream, as delivered by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum EncryptedShareEvent {
    /// Item created or updated
    ItemUpdated {
        #[serde(rename = "Item")]
        item: EncryptedItem,
    },
    ItemDeleted {
        #[serde(rename = "ItemID")]
        item_id: ItemId,
    },
    ItemLastUsed {
        #[serde(rename = "ItemID")]
        item_id: ItemId,
        #[serde(rename = "LastUseTime")]
        last_use_time: i64,
    },
    ShareUpdated {
        #[serde(rename = "Share")]
        share: EncryptedShare,
    },
}

/// Ordered batch of events since a cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEventBatch {
    /// Cursor to store once the whole batch is applied
    #[serde(rename = "LatestEventID")]
    pub latest_event_id: EventId,
    /// More events are waiting past `latest_event_id`
    #[serde(rename = "EventsPending", default)]
    pub events_pending: bool,
    /// The server lost track of this cursor; local state must be rebuilt
    #[serde(rename = "FullRefresh", default)]
    pub full_refresh: bool,
    #[serde(rename = "Changes", default)]
    pub changes: Vec<EncryptedShareEvent>,
}

/// A decrypted event, ready to apply to the item table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareEvent {
    ItemUpserted(ItemRevision),
    ItemDeleted(ItemId),
    ItemLastUsed { item_id: ItemId, last_use_time: i64 },
    ShareUpdated(Option<VaultContent>),
}
