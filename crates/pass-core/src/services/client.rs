//! Vault client service shared across UIs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::api::requests::{self, ItemRevisionRef, MoveItemPayload};
use crate::api::ApiClient;
use crate::config::PassConfig;
use crate::crypto::{CryptoProvider, Envelope, ShareKeyRing, UserKey};
use crate::error::{Error, Result};
use crate::loader::ShareLoader;
use crate::message::{Intent, IntentOutcome};
use crate::models::{
    BulkSelection, ItemKey, ItemRevision, RequestId, Share, ShareId, TargetType,
};
use crate::optimistic::{DerivedView, Mutation, OptimisticEntry, OptimisticId};
use crate::state::{ConfirmedChange, MutationOutcome, ResolveOutcome, StateSnapshot, VaultState};
use crate::storage::{KeyValueStore, StateCache};
use crate::sync::{EventSync, SyncOutcome};
use crate::tracker::{RequestRecord, RequestTracker};

/// Callbacks into the UI layer. Every method defaults to doing nothing.
pub trait UiObserver: Send + Sync {
    /// The derived view changed.
    fn on_state_change(&self, _view: &DerivedView) {}

    /// The server rejected an optimistic mutation.
    fn on_mutation_failed(&self, _entry: &OptimisticEntry) {}

    /// Focus moved to another item, e.g. the destination copy of a moved item.
    fn navigate_to_item(&self, _key: &ItemKey) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl UiObserver for NoopObserver {}

/// What happened to a mutation issued through [`PassClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReceipt {
    pub id: OptimisticId,
    pub outcome: ResolveOutcome,
}

impl MutationReceipt {
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.outcome, ResolveOutcome::Failed(_))
    }
}

/// Server call a mutation turns into, prepared under the state lock.
enum Operation {
    Move {
        destination: ShareId,
        keys: ShareKeyRing,
    },
    Trash,
    Restore,
    Delete,
}

/// Thread-safe handle over the vault state, the API and the request tracker.
pub struct PassClient<A, C, U = NoopObserver> {
    api: Arc<A>,
    envelope: Arc<Envelope<C>>,
    user_key: Arc<UserKey>,
    state: Arc<Mutex<VaultState>>,
    tracker: RequestTracker,
    acks: Arc<Mutex<mpsc::UnboundedReceiver<RequestRecord>>>,
    observer: Arc<U>,
    poll_interval: Duration,
}

impl<A, C, U> Clone for PassClient<A, C, U> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            envelope: Arc::clone(&self.envelope),
            user_key: Arc::clone(&self.user_key),
            state: Arc::clone(&self.state),
            tracker: self.tracker.clone(),
            acks: Arc::clone(&self.acks),
            observer: Arc::clone(&self.observer),
            poll_interval: self.poll_interval,
        }
    }
}

impl<A: ApiClient, C: CryptoProvider, U: UiObserver> PassClient<A, C, U> {
    pub fn new(
        api: A,
        envelope: Envelope<C>,
        user_key: UserKey,
        config: &PassConfig,
        observer: U,
    ) -> Self {
        let (tracker, acks) = RequestTracker::from_config(config);
        Self {
            api: Arc::new(api),
            envelope: Arc::new(envelope),
            user_key: Arc::new(user_key),
            state: Arc::new(Mutex::new(VaultState::new())),
            tracker,
            acks: Arc::new(Mutex::new(acks)),
            observer: Arc::new(observer),
            poll_interval: config.event_poll_interval,
        }
    }

    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub const fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    /// Wait for the next request acknowledgment.
    pub async fn next_acknowledgment(&self) -> Option<RequestRecord> {
        self.acks.lock().await.recv().await
    }

    /// Run a read-only closure against the current state.
    pub async fn with_state<R>(&self, read: impl FnOnce(&VaultState) -> R) -> R {
        read(&*self.state.lock().await)
    }

    pub async fn derived_view(&self) -> DerivedView {
        self.state.lock().await.derived_view()
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Load a share with all of its items and start tracking it.
    pub async fn add_share(&self, share_id: &ShareId, target_type: TargetType) -> Result<Share> {
        let loader = self.loader();
        let loaded = loader.load_share(share_id, target_type).await?;
        let items = loader.load_items(&loaded.keys).await?;
        let share = loaded.share.clone();
        self.state.lock().await.insert_share(loaded, items);
        info!("Added share {share_id}");
        self.publish().await;
        Ok(share)
    }

    /// Run one sync pass, reloading the share when the server asks for it.
    pub async fn sync_share(&self, share_id: &ShareId) -> Result<SyncOutcome> {
        let outcome = EventSync::new(
            self.api.as_ref(),
            self.envelope.as_ref(),
            self.user_key.as_ref(),
        )
        .sync_share(&self.state, share_id)
        .await?;

        match outcome {
            SyncOutcome::AlreadyRunning => return Ok(outcome),
            SyncOutcome::FullRefresh => self.refresh_share(share_id).await?,
            SyncOutcome::Applied(_) | SyncOutcome::ShareRemoved => {}
        }
        self.publish().await;
        Ok(outcome)
    }

    /// Sync every known share once. Callers run this on [`Self::poll_interval`].
    pub async fn poll(&self) -> Vec<(ShareId, Result<SyncOutcome>)> {
        let share_ids: Vec<ShareId> = self
            .with_state(|state| state.shares().map(|share| share.share_id.clone()).collect())
            .await;

        let mut results = Vec::with_capacity(share_ids.len());
        for share_id in share_ids {
            let outcome = self.sync_share(&share_id).await;
            results.push((share_id, outcome));
        }
        results
    }

    pub async fn move_item(&self, item: ItemKey, destination: ShareId) -> Result<MutationReceipt> {
        self.mutate(Mutation::Move { item, destination }).await
    }

    pub async fn move_items(
        &self,
        selection: BulkSelection,
        destination: ShareId,
    ) -> Result<MutationReceipt> {
        self.mutate(Mutation::MoveMany {
            selection,
            destination,
        })
        .await
    }

    pub async fn trash_item(&self, item: ItemKey) -> Result<MutationReceipt> {
        self.mutate(Mutation::Trash { item }).await
    }

    pub async fn trash_items(&self, selection: BulkSelection) -> Result<MutationReceipt> {
        self.mutate(Mutation::TrashMany { selection }).await
    }

    pub async fn restore_item(&self, item: ItemKey) -> Result<MutationReceipt> {
        self.mutate(Mutation::Restore { item }).await
    }

    pub async fn restore_items(&self, selection: BulkSelection) -> Result<MutationReceipt> {
        self.mutate(Mutation::RestoreMany { selection }).await
    }

    pub async fn delete_item(&self, item: ItemKey) -> Result<MutationReceipt> {
        self.mutate(Mutation::Delete { item }).await
    }

    pub async fn delete_items(&self, selection: BulkSelection) -> Result<MutationReceipt> {
        self.mutate(Mutation::DeleteMany { selection }).await
    }

    /// Drop an optimistic entry, typically a failed one the user has seen.
    pub async fn dismiss(&self, id: &OptimisticId) -> Option<OptimisticEntry> {
        let dismissed = self.state.lock().await.dismiss(id);
        if dismissed.is_some() {
            self.publish().await;
        }
        dismissed
    }

    pub async fn dispatch(&self, intent: Intent) -> Result<IntentOutcome> {
        let receipt = match intent {
            Intent::MoveItem { item, destination } => self.move_item(item, destination).await?,
            Intent::MoveItems {
                selection,
                destination,
            } => self.move_items(selection, destination).await?,
            Intent::TrashItem { item } => self.trash_item(item).await?,
            Intent::TrashItems { selection } => self.trash_items(selection).await?,
            Intent::RestoreItem { item } => self.restore_item(item).await?,
            Intent::RestoreItems { selection } => self.restore_items(selection).await?,
            Intent::DeleteItem { item } => self.delete_item(item).await?,
            Intent::DeleteItems { selection } => self.delete_items(selection).await?,
            Intent::Dismiss { id } => return Ok(IntentOutcome::Dismissed(self.dismiss(&id).await)),
            Intent::SyncShare { share_id } => {
                return Ok(IntentOutcome::Synced(self.sync_share(&share_id).await?));
            }
            Intent::SyncAll => return Ok(IntentOutcome::Polled(self.poll().await)),
        };
        Ok(IntentOutcome::Mutation(receipt))
    }

    pub async fn persist<S: KeyValueStore>(&self, cache: &StateCache<S>) -> Result<()> {
        let snapshot = self.snapshot().await;
        cache.save(self.envelope.as_ref(), &snapshot).await
    }

    /// Seed the state from the cache. Returns whether a snapshot was found.
    pub async fn restore<S: KeyValueStore>(&self, cache: &StateCache<S>) -> Result<bool> {
        let Some(snapshot) = cache.load(self.envelope.as_ref()).await? else {
            return Ok(false);
        };
        self.state.lock().await.restore(snapshot);
        self.publish().await;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Private
    // -----------------------------------------------------------------------

    fn loader(&self) -> ShareLoader<'_, A, C> {
        ShareLoader::new(
            self.api.as_ref(),
            self.envelope.as_ref(),
            self.user_key.as_ref(),
        )
    }

    async fn publish(&self) {
        let view = self.derived_view().await;
        self.observer.on_state_change(&view);
    }

    async fn refresh_share(&self, share_id: &ShareId) -> Result<()> {
        let target_type = self
            .with_state(|state| state.share(share_id).map(Share::target_type))
            .await
            .ok_or_else(|| Error::NotFound(format!("share {share_id}")))?;
        let loader = self.loader();
        let loaded = loader.load_share(share_id, target_type).await?;
        let items = loader.load_items(&loaded.keys).await?;
        self.state.lock().await.reset_share(loaded, items);
        Ok(())
    }

    /// Record, send and resolve one mutation.
    ///
    /// Only validation errors are returned as `Err`; a rejected request ends
    /// up as a failed entry in the log.
    async fn mutate(&self, mutation: Mutation) -> Result<MutationReceipt> {
        let id = self.state.lock().await.enqueue(mutation.clone())?;
        self.publish().await;
        if let Mutation::Move { destination, .. } = &mutation {
            self.observer
                .navigate_to_item(&ItemKey::new(destination.clone(), id.to_string()));
        }

        let request_id = RequestId::new(id.to_string());
        self.tracker.start(request_id.clone()).await;
        let response = self.perform(&mutation).await;
        let outcome = match response {
            Ok(changes) => {
                self.tracker.succeed(&request_id, None).await;
                MutationOutcome::Succeeded(changes)
            }
            Err(error) => {
                self.tracker
                    .fail(&request_id, Some(json!(error.to_string())))
                    .await;
                MutationOutcome::Failed(error.to_string())
            }
        };
        let moved_to = match (&mutation, &outcome) {
            (Mutation::Move { .. }, MutationOutcome::Succeeded(changes)) => {
                changes.iter().find_map(|change| match change {
                    ConfirmedChange::Upsert(item) => Some(item.key()),
                    _ => None,
                })
            }
            _ => None,
        };

        let resolved = self.state.lock().await.resolve(&id, outcome);
        match &resolved {
            ResolveOutcome::Stale => {
                debug!("Response for {id} arrived after it was superseded");
            }
            ResolveOutcome::Failed(entry) => {
                self.observer.on_mutation_failed(entry);
                self.publish().await;
            }
            ResolveOutcome::Confirmed(_) => {
                if let Some(key) = &moved_to {
                    self.observer.navigate_to_item(key);
                }
                self.publish().await;
            }
        }

        Ok(MutationReceipt {
            id,
            outcome: resolved,
        })
    }

    async fn perform(&self, mutation: &Mutation) -> Result<Vec<ConfirmedChange>> {
        let (items, operation) = {
            let state = self.state.lock().await;
            let items = mutation
                .targets()
                .iter()
                .map(|key| {
                    state
                        .items()
                        .get(key)
                        .cloned()
                        .ok_or_else(|| Error::NotFound(format!("item {key}")))
                })
                .collect::<Result<Vec<_>>>()?;
            let operation = match mutation {
                Mutation::Move { destination, .. } | Mutation::MoveMany { destination, .. } => {
                    let keys = state.keys(destination).cloned().ok_or_else(|| {
                        Error::NotFound(format!("share keys for {destination}"))
                    })?;
                    Operation::Move {
                        destination: destination.clone(),
                        keys,
                    }
                }
                Mutation::Trash { .. } | Mutation::TrashMany { .. } => Operation::Trash,
                Mutation::Restore { .. } | Mutation::RestoreMany { .. } => Operation::Restore,
                Mutation::Delete { .. } | Mutation::DeleteMany { .. } => Operation::Delete,
            };
            (items, operation)
        };

        let mut changes = Vec::new();
        for (share_id, items) in group_by_share(items) {
            match &operation {
                Operation::Move { destination, keys } => {
                    changes.extend(self.move_group(&share_id, destination, keys, &items).await?);
                }
                Operation::Trash => {
                    let updates =
                        requests::trash_items(self.api.as_ref(), &share_id, revision_refs(&items))
                            .await?;
                    changes.extend(updates.into_iter().map(|update| ConfirmedChange::Revised {
                        share_id: share_id.clone(),
                        update,
                    }));
                }
                Operation::Restore => {
                    let updates =
                        requests::restore_items(self.api.as_ref(), &share_id, revision_refs(&items))
                            .await?;
                    changes.extend(updates.into_iter().map(|update| ConfirmedChange::Revised {
                        share_id: share_id.clone(),
                        update,
                    }));
                }
                Operation::Delete => {
                    requests::delete_items(self.api.as_ref(), &share_id, revision_refs(&items))
                        .await?;
                    changes.extend(items.iter().map(|item| ConfirmedChange::Removed(item.key())));
                }
            }
        }
        Ok(changes)
    }

    async fn move_group(
        &self,
        source: &ShareId,
        destination: &ShareId,
        keys: &ShareKeyRing,
        items: &[ItemRevision],
    ) -> Result<Vec<ConfirmedChange>> {
        let payloads = items
            .iter()
            .map(|item| {
                Ok(MoveItemPayload {
                    item_id: item.item_id.clone(),
                    item: self.envelope.encrypt_item_content(&item.content, keys)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let moved = requests::move_items(self.api.as_ref(), source, destination, payloads).await?;
        let mut changes: Vec<ConfirmedChange> = items
            .iter()
            .map(|item| ConfirmedChange::Removed(item.key()))
            .collect();
        for encrypted in &moved {
            let item = self
                .envelope
                .decrypt_item_content(destination, encrypted, keys)?;
            changes.push(ConfirmedChange::Upsert(item));
        }
        Ok(changes)
    }
}

fn group_by_share(items: Vec<ItemRevision>) -> BTreeMap<ShareId, Vec<ItemRevision>> {
    let mut groups: BTreeMap<ShareId, Vec<ItemRevision>> = BTreeMap::new();
    for item in items {
        groups.entry(item.share_id.clone()).or_default().push(item);
    }
    groups
}

fn revision_refs(items: &[ItemRevision]) -> Vec<ItemRevisionRef> {
    items
        .iter()
        .map(|item| ItemRevisionRef {
            item_id: item.item_id.clone(),
            revision: item.revision,
        })
        .collect()
}
