//! UI intents.
//!
//! The closed set of requests a UI may send to a [`crate::PassClient`].

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{BulkSelection, ItemKey, ShareId};
use crate::optimistic::{OptimisticEntry, OptimisticId};
use crate::services::MutationReceipt;
use crate::sync::SyncOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Intent {
    MoveItem {
        item: ItemKey,
        destination: ShareId,
    },
    MoveItems {
        selection: BulkSelection,
        destination: ShareId,
    },
    TrashItem {
        item: ItemKey,
    },
    TrashItems {
        selection: BulkSelection,
    },
    RestoreItem {
        item: ItemKey,
    },
    RestoreItems {
        selection: BulkSelection,
    },
    DeleteItem {
        item: ItemKey,
    },
    DeleteItems {
        selection: BulkSelection,
    },
    /// Drop a failed (or any) optimistic entry
    Dismiss {
        id: OptimisticId,
    },
    SyncShare {
        share_id: ShareId,
    },
    SyncAll,
}

#[derive(Debug)]
pub enum IntentOutcome {
    Mutation(MutationReceipt),
    Dismissed(Option<OptimisticEntry>),
    Synced(SyncOutcome),
    Polled(Vec<(ShareId, Result<SyncOutcome>)>),
}
