//! Shared vault state.
//!
//! [`VaultState`] owns the confirmed item table, the loaded shares with their
//! key rings, the optimistic log and each share's sync phase. Clients keep it
//! behind a single async mutex; every method here is synchronous.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::crypto::ShareKeyRing;
use crate::error::{Error, Result};
use crate::loader::LoadedShare;
use crate::models::{ItemKey, ItemRevision, Revision, RevisionUpdate, Share, ShareId};
use crate::optimistic::{DerivedView, Mutation, OptimisticEntry, OptimisticId, OptimisticLog};
use crate::sync::{ItemTable, Upsert};

/// Per-share synchronization phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Idle,
    Fetching,
    Applying,
}

/// A server-confirmed change carried by a successful mutation response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmedChange {
    /// A full new revision, e.g. the moved copy of an item
    Upsert(ItemRevision),
    /// A trash/restore revision bump
    Revised {
        share_id: ShareId,
        update: RevisionUpdate,
    },
    Removed(ItemKey),
}

/// What the server said about an optimistic mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Succeeded(Vec<ConfirmedChange>),
    Failed(String),
}

/// Effect of resolving an optimistic entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Confirmed(Option<Revision>),
    Failed(OptimisticEntry),
    /// The entry was superseded, dismissed or already resolved
    Stale,
}

/// Serializable part of the state, written to the local cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub shares: Vec<Share>,
    pub items: ItemTable,
}

#[derive(Debug, Default)]
pub struct VaultState {
    pub(crate) shares: BTreeMap<ShareId, Share>,
    pub(crate) keyrings: HashMap<ShareId, ShareKeyRing>,
    pub(crate) items: ItemTable,
    pub(crate) log: OptimisticLog,
    phases: HashMap<ShareId, SyncPhase>,
}

impl VaultState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly loaded share and its item listing.
    ///
    /// Loading a share that is already known replaces its items with the
    /// listing: the new cursor is the server's latest, so deletions before it
    /// will never arrive as events. The optimistic log is kept.
    pub fn insert_share(&mut self, loaded: LoadedShare, items: Vec<ItemRevision>) {
        let share_id = loaded.share.share_id.clone();
        if self.shares.contains_key(&share_id) {
            let dropped = self.items.drop_share(&share_id);
            debug!("Reload of {share_id} dropped {dropped} items");
        }

        let count = items.len();
        self.shares.insert(share_id.clone(), loaded.share);
        self.keyrings.insert(share_id.clone(), loaded.keys);
        for item in items {
            self.items.upsert(item);
        }
        debug!("Share {share_id} registered with {count} items");
    }

    /// Replace everything known about a share after a full refresh.
    pub fn reset_share(&mut self, loaded: LoadedShare, items: Vec<ItemRevision>) {
        info!("Full refresh of share {}", loaded.share.share_id);
        self.insert_share(loaded, items);
    }

    /// Replace the key ring of a known share, e.g. after a key rotation.
    pub fn replace_keys(&mut self, keys: ShareKeyRing) -> Result<()> {
        let share_id = keys.share_id().clone();
        if !self.shares.contains_key(&share_id) {
            return Err(Error::NotFound(format!("share {share_id}")));
        }
        self.keyrings.insert(share_id, keys);
        Ok(())
    }

    /// Forget a share together with its items, keys and log entries.
    pub fn remove_share(&mut self, share_id: &ShareId) -> Option<Share> {
        let share = self.shares.remove(share_id)?;
        self.keyrings.remove(share_id);
        self.phases.remove(share_id);
        let items = self.items.drop_share(share_id);
        let entries = self.log.forget_share(share_id);
        info!("Share {share_id} removed ({items} items, {entries} optimistic entries)");
        Some(share)
    }

    pub fn share(&self, share_id: &ShareId) -> Option<&Share> {
        self.shares.get(share_id)
    }

    pub fn shares(&self) -> impl Iterator<Item = &Share> {
        self.shares.values()
    }

    pub fn keys(&self, share_id: &ShareId) -> Option<&ShareKeyRing> {
        self.keyrings.get(share_id)
    }

    pub const fn items(&self) -> &ItemTable {
        &self.items
    }

    pub const fn log(&self) -> &OptimisticLog {
        &self.log
    }

    pub fn phase(&self, share_id: &ShareId) -> SyncPhase {
        self.phases.get(share_id).copied().unwrap_or_default()
    }

    pub(crate) fn set_phase(&mut self, share_id: &ShareId, phase: SyncPhase) {
        if phase == SyncPhase::Idle {
            self.phases.remove(share_id);
        } else if self.shares.contains_key(share_id) {
            self.phases.insert(share_id.clone(), phase);
        }
    }

    #[must_use]
    pub fn derived_view(&self) -> DerivedView {
        self.log.project(&self.items)
    }

    /// Validate a mutation against confirmed state and record it.
    pub fn enqueue(&mut self, mutation: Mutation) -> Result<OptimisticId> {
        let targets = mutation.targets();
        if targets.is_empty() {
            return Err(Error::InvalidInput(format!(
                "{} needs at least one item",
                mutation.label()
            )));
        }
        for key in &targets {
            if self.items.get(key).is_none() {
                return Err(Error::NotFound(format!("item {key}")));
            }
        }
        if let Mutation::Move { destination, .. } | Mutation::MoveMany { destination, .. } =
            &mutation
        {
            if !self.shares.contains_key(destination) {
                return Err(Error::NotFound(format!("share {destination}")));
            }
            if targets.iter().any(|key| &key.share_id == destination) {
                return Err(Error::InvalidInput(format!(
                    "items already live in share {destination}"
                )));
            }
        }

        let label = mutation.label();
        let id = self.log.record(mutation);
        debug!("Optimistic {label} {id} recorded for {} items", targets.len());
        Ok(id)
    }

    /// Resolve an optimistic entry with the server's answer.
    ///
    /// Only pending entries resolve; anything else is a stale response and
    /// leaves both the log and the table untouched.
    pub fn resolve(&mut self, id: &OptimisticId, outcome: MutationOutcome) -> ResolveOutcome {
        if !self.log.is_pending(id) {
            debug!("Discarding stale response for {id}");
            return ResolveOutcome::Stale;
        }

        match outcome {
            MutationOutcome::Succeeded(changes) => {
                let mut newest = None;
                for change in changes {
                    if let Some(revision) = self.apply_confirmed(change) {
                        newest = newest.max(Some(revision));
                    }
                }
                self.log.confirm(id, newest);
                ResolveOutcome::Confirmed(newest)
            }
            MutationOutcome::Failed(reason) => {
                warn!("Optimistic mutation {id} failed: {reason}");
                self.log
                    .fail(id, reason)
                    .cloned()
                    .map_or(ResolveOutcome::Stale, ResolveOutcome::Failed)
            }
        }
    }

    pub fn dismiss(&mut self, id: &OptimisticId) -> Option<OptimisticEntry> {
        self.log.dismiss(id)
    }

    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            shares: self.shares.values().cloned().collect(),
            items: self.items.clone(),
        }
    }

    /// Seed shares and items from a cached snapshot.
    ///
    /// Shares already loaded are newer than the cache and are left alone,
    /// items included. Key rings are never cached, so restored shares cannot
    /// sync until they are loaded again.
    pub fn restore(&mut self, snapshot: StateSnapshot) {
        let mut restored = HashSet::new();
        for share in snapshot.shares {
            if let Entry::Vacant(slot) = self.shares.entry(share.share_id.clone()) {
                restored.insert(share.share_id.clone());
                slot.insert(share);
            } else {
                debug!("Keeping live share {} over its cached copy", share.share_id);
            }
        }
        for item in Vec::<ItemRevision>::from(snapshot.items) {
            if restored.contains(&item.share_id) {
                self.items.upsert(item);
            }
        }
    }

    fn apply_confirmed(&mut self, change: ConfirmedChange) -> Option<Revision> {
        match change {
            ConfirmedChange::Upsert(item) => {
                let revision = item.revision;
                self.items.upsert(item).changed().then_some(revision)
            }
            ConfirmedChange::Revised { share_id, update } => {
                let revision = update.revision;
                match self.items.apply_revision_update(&share_id, &update) {
                    Upsert::Missing => {
                        debug!("Revision {revision} for unknown item {share_id}/{}", update.item_id);
                        None
                    }
                    outcome => outcome.changed().then_some(revision),
                }
            }
            ConfirmedChange::Removed(key) => {
                self.items.remove(&key);
                None
            }
        }
    }
}
