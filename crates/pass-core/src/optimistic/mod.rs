//! Optimistic mutation log
//!
//! Every user mutation is recorded here before its request leaves the client.
//! The log stays separate from the server-confirmed [`ItemTable`]; readers see
//! the two merged through [`OptimisticLog::project`].
//!
//! Entries are keyed by the item they touch (single-item operations) or by
//! their own id (bulk operations). Recording a new mutation for a key already
//! in the log supersedes the older entry, so a late response for the old
//! entry finds nothing to resolve and is discarded.

mod view;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::models::{BulkSelection, ItemKey, Revision, ShareId};
use crate::sync::ItemTable;
use crate::util::unix_timestamp_now;

pub use view::{DerivedView, ViewItem};

/// Client-generated id of one optimistic mutation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OptimisticId(Uuid);

impl OptimisticId {
    /// Create a new id using UUID v7, so ids sort by creation time
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for OptimisticId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OptimisticId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OptimisticId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A user mutation awaiting, or past, server confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Mutation {
    Move {
        item: ItemKey,
        destination: ShareId,
    },
    MoveMany {
        selection: BulkSelection,
        destination: ShareId,
    },
    Trash {
        item: ItemKey,
    },
    TrashMany {
        selection: BulkSelection,
    },
    Restore {
        item: ItemKey,
    },
    RestoreMany {
        selection: BulkSelection,
    },
    Delete {
        item: ItemKey,
    },
    DeleteMany {
        selection: BulkSelection,
    },
}

impl Mutation {
    #[must_use]
    pub const fn is_bulk(&self) -> bool {
        matches!(
            self,
            Self::MoveMany { .. }
                | Self::TrashMany { .. }
                | Self::RestoreMany { .. }
                | Self::DeleteMany { .. }
        )
    }

    /// Short label used in logs
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Move { .. } => "move",
            Self::MoveMany { .. } => "move-many",
            Self::Trash { .. } => "trash",
            Self::TrashMany { .. } => "trash-many",
            Self::Restore { .. } => "restore",
            Self::RestoreMany { .. } => "restore-many",
            Self::Delete { .. } => "delete",
            Self::DeleteMany { .. } => "delete-many",
        }
    }

    /// Items this mutation acts on, at their current location.
    #[must_use]
    pub fn targets(&self) -> Vec<ItemKey> {
        match self {
            Self::Move { item, .. }
            | Self::Trash { item }
            | Self::Restore { item }
            | Self::Delete { item } => vec![item.clone()],
            Self::MoveMany { selection, .. }
            | Self::TrashMany { selection }
            | Self::RestoreMany { selection }
            | Self::DeleteMany { selection } => selection.keys().collect(),
        }
    }

    /// Whether the mutation reads or writes items of `share_id`.
    #[must_use]
    pub fn touches_share(&self, share_id: &ShareId) -> bool {
        let destination = match self {
            Self::Move { destination, .. } | Self::MoveMany { destination, .. } => {
                Some(destination)
            }
            _ => None,
        };
        destination == Some(share_id) || self.targets().iter().any(|key| &key.share_id == share_id)
    }

    fn key(&self, id: &OptimisticId) -> OptimisticKey {
        match self {
            Self::Move { item, .. }
            | Self::Trash { item }
            | Self::Restore { item }
            | Self::Delete { item } => OptimisticKey::Item(item.clone()),
            _ => OptimisticKey::Batch(id.clone()),
        }
    }
}

/// Slot an entry occupies in the log
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OptimisticKey {
    Item(ItemKey),
    Batch(OptimisticId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "camelCase")]
pub enum MutationState {
    Pending,
    /// Server accepted the mutation. The entry keeps its overlay until the
    /// next sync of the share it touched.
    Confirmed(Option<Revision>),
    /// Server rejected the mutation. Kept until dismissed.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimisticEntry {
    pub id: OptimisticId,
    pub mutation: Mutation,
    pub state: MutationState,
    /// Unix seconds
    pub created_at: i64,
}

impl OptimisticEntry {
    #[must_use]
    pub fn key(&self) -> OptimisticKey {
        self.mutation.key(&self.id)
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.state, MutationState::Pending)
    }

    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        match &self.state {
            MutationState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Ordered log of optimistic entries, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimisticLog {
    entries: Vec<OptimisticEntry>,
}

impl OptimisticLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mutation, superseding any entry that holds the same key.
    pub fn record(&mut self, mutation: Mutation) -> OptimisticId {
        let id = OptimisticId::new();
        let key = mutation.key(&id);
        if let Some(position) = self.entries.iter().position(|entry| entry.key() == key) {
            let superseded = self.entries.remove(position);
            debug!(
                "Optimistic {} {} superseded by {id}",
                superseded.mutation.label(),
                superseded.id
            );
        }

        self.entries.push(OptimisticEntry {
            id: id.clone(),
            mutation,
            state: MutationState::Pending,
            created_at: unix_timestamp_now(),
        });
        id
    }

    pub fn get(&self, id: &OptimisticId) -> Option<&OptimisticEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    pub fn entries(&self) -> &[OptimisticEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failed(&self) -> impl Iterator<Item = &OptimisticEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.failure().is_some())
    }

    /// True while `id` is in the log and still waiting for its response.
    pub fn is_pending(&self, id: &OptimisticId) -> bool {
        self.get(id).is_some_and(OptimisticEntry::is_pending)
    }

    /// Mark a pending entry as confirmed. `None` if the entry is gone or
    /// already resolved.
    pub fn confirm(
        &mut self,
        id: &OptimisticId,
        revision: Option<Revision>,
    ) -> Option<&OptimisticEntry> {
        self.transition(id, MutationState::Confirmed(revision))
    }

    /// Mark a pending entry as failed. `None` if the entry is gone or
    /// already resolved.
    pub fn fail(&mut self, id: &OptimisticId, reason: impl Into<String>) -> Option<&OptimisticEntry> {
        self.transition(id, MutationState::Failed(reason.into()))
    }

    /// Remove an entry whatever its state.
    pub fn dismiss(&mut self, id: &OptimisticId) -> Option<OptimisticEntry> {
        let position = self.entries.iter().position(|entry| &entry.id == id)?;
        Some(self.entries.remove(position))
    }

    /// Drop confirmed entries touching a share once its events are applied.
    pub fn settle(&mut self, share_id: &ShareId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            !(matches!(entry.state, MutationState::Confirmed(_))
                && entry.mutation.touches_share(share_id))
        });
        before - self.entries.len()
    }

    /// Drop every entry that targets a share which no longer exists.
    pub fn forget_share(&mut self, share_id: &ShareId) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|entry| !entry.mutation.touches_share(share_id));
        before - self.entries.len()
    }

    /// Merge the log over the confirmed table.
    #[must_use]
    pub fn project(&self, table: &ItemTable) -> DerivedView {
        view::project(&self.entries, table)
    }

    fn transition(&mut self, id: &OptimisticId, state: MutationState) -> Option<&OptimisticEntry> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| &entry.id == id && entry.is_pending())?;
        entry.state = state;
        Some(entry)
    }
}
