//! Event synchronization
//!
//! Each share carries a cursor (`Share::event_id`). A sync pass fetches the
//! events past that cursor, applies them in order to the [`ItemTable`] and
//! only then advances the cursor to the batch's `LatestEventID`. A failure
//! part-way leaves the cursor where it was, so the next pass replays the
//! batch; the revision rule in [`ItemTable::upsert`] makes that replay
//! harmless.

mod table;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::api::{requests, ApiClient};
use crate::crypto::{CryptoProvider, Envelope, UserKey};
use crate::error::{Error, Result};
use crate::models::{EncryptedEventBatch, EventId, ItemKey, ShareContent, ShareEvent, ShareId};
use crate::state::{SyncPhase, VaultState};

pub use table::{ItemTable, Upsert};

/// Counts of what one or more applied batches changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub batches: usize,
    pub upserted: usize,
    /// Events carrying a revision the table already had
    pub ignored: usize,
    pub deleted: usize,
    pub touched: usize,
    pub share_updated: bool,
}

impl ApplySummary {
    fn merge(&mut self, other: Self) {
        self.batches += other.batches;
        self.upserted += other.upserted;
        self.ignored += other.ignored;
        self.deleted += other.deleted;
        self.touched += other.touched;
        self.share_updated |= other.share_updated;
    }

    #[must_use]
    pub const fn changed(&self) -> bool {
        self.upserted + self.deleted + self.touched > 0 || self.share_updated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied(ApplySummary),
    /// Another pass for this share is still running
    AlreadyRunning,
    /// The server dropped the cursor; the share must be reloaded
    FullRefresh,
    /// The share is gone server-side and was dropped locally
    ShareRemoved,
}

/// Apply one event batch to a share and advance its cursor.
///
/// Events are decrypted as they are applied. On error the cursor is left
/// untouched, though events before the failing one stay applied.
pub fn apply_batch<C: CryptoProvider>(
    state: &mut VaultState,
    envelope: &Envelope<C>,
    share_id: &ShareId,
    batch: &EncryptedEventBatch,
) -> Result<ApplySummary> {
    let keys = state
        .keyrings
        .get(share_id)
        .ok_or_else(|| Error::NotFound(format!("share keys for {share_id}")))?;
    if !state.shares.contains_key(share_id) {
        return Err(Error::NotFound(format!("share {share_id}")));
    }

    let mut summary = ApplySummary {
        batches: 1,
        ..ApplySummary::default()
    };
    for change in &batch.changes {
        match envelope.decrypt_event(share_id, change, keys)? {
            ShareEvent::ItemUpserted(item) => {
                if state.items.upsert(item).changed() {
                    summary.upserted += 1;
                } else {
                    summary.ignored += 1;
                }
            }
            ShareEvent::ItemDeleted(item_id) => {
                if state
                    .items
                    .remove(&ItemKey::new(share_id.clone(), item_id))
                    .is_some()
                {
                    summary.deleted += 1;
                }
            }
            ShareEvent::ItemLastUsed {
                item_id,
                last_use_time,
            } => {
                let key = ItemKey::new(share_id.clone(), item_id);
                if state.items.touch_last_use(&key, last_use_time) {
                    summary.touched += 1;
                }
            }
            ShareEvent::ShareUpdated(content) => {
                if let (Some(content), Some(share)) = (content, state.shares.get_mut(share_id)) {
                    share.content = ShareContent::Vault(content);
                    summary.share_updated = true;
                }
            }
        }
    }

    if let Some(share) = state.shares.get_mut(share_id) {
        share.advance_cursor(batch.latest_event_id.clone());
    }
    let settled = state.log.settle(share_id);
    if settled > 0 {
        debug!("Settled {settled} confirmed entries for {share_id}");
    }
    Ok(summary)
}

/// Drives sync passes for shares held in a [`VaultState`].
pub struct EventSync<'a, A, C> {
    api: &'a A,
    envelope: &'a Envelope<C>,
    user_key: &'a UserKey,
}

impl<'a, A: ApiClient, C: CryptoProvider> EventSync<'a, A, C> {
    pub const fn new(api: &'a A, envelope: &'a Envelope<C>, user_key: &'a UserKey) -> Self {
        Self {
            api,
            envelope,
            user_key,
        }
    }

    /// Run one sync pass for a share.
    ///
    /// The state lock is released while requests are in flight. A second pass
    /// for the same share started meanwhile returns
    /// [`SyncOutcome::AlreadyRunning`].
    #[instrument(level = "debug", skip(self, state), fields(share_id = %share_id))]
    pub async fn sync_share(
        &self,
        state: &Arc<Mutex<VaultState>>,
        share_id: &ShareId,
    ) -> Result<SyncOutcome> {
        let (cursor, needs_keys) = {
            let mut guard = state.lock().await;
            let Some(share) = guard.share(share_id) else {
                return Err(Error::NotFound(format!("share {share_id}")));
            };
            let cursor = share.event_id.clone();
            if guard.phase(share_id) != SyncPhase::Idle {
                return Ok(SyncOutcome::AlreadyRunning);
            }
            let needs_keys = guard.keys(share_id).is_none();
            guard.set_phase(share_id, SyncPhase::Fetching);
            (cursor, needs_keys)
        };

        let mut phase = PhaseGuard {
            state,
            share_id,
            armed: true,
        };
        let result = self.run(state, share_id, cursor, needs_keys).await;
        state.lock().await.set_phase(share_id, SyncPhase::Idle);
        phase.armed = false;

        match &result {
            Ok(SyncOutcome::Applied(summary)) if summary.changed() => info!(
                "Synced share {share_id}: {} upserted, {} deleted, {} ignored",
                summary.upserted, summary.deleted, summary.ignored
            ),
            Ok(_) => {}
            Err(error) => warn!("Sync of share {share_id} failed: {error}"),
        }
        result
    }

    async fn run(
        &self,
        state: &Mutex<VaultState>,
        share_id: &ShareId,
        mut cursor: EventId,
        needs_keys: bool,
    ) -> Result<SyncOutcome> {
        if needs_keys {
            self.refresh_keys(state, share_id).await?;
        }

        let mut summary = ApplySummary::default();
        loop {
            let batch = match requests::get_events(self.api, share_id, &cursor).await {
                Ok(batch) => batch,
                Err(error) if error.is_share_gone() => {
                    info!("Share {share_id} is no longer available: {error}");
                    state.lock().await.remove_share(share_id);
                    return Ok(SyncOutcome::ShareRemoved);
                }
                Err(error) => return Err(error),
            };

            if batch.full_refresh {
                info!("Server requested a full refresh of share {share_id}");
                return Ok(SyncOutcome::FullRefresh);
            }

            let applied = self.apply(state, share_id, &batch).await;
            let applied = match applied {
                Err(Error::KeyNotFound { rotation, .. }) => {
                    debug!("Rotation {rotation} missing, reloading share keys");
                    self.refresh_keys(state, share_id).await?;
                    self.apply(state, share_id, &batch).await?
                }
                other => other?,
            };
            summary.merge(applied);
            cursor = batch.latest_event_id;

            if !batch.events_pending {
                return Ok(SyncOutcome::Applied(summary));
            }
            state.lock().await.set_phase(share_id, SyncPhase::Fetching);
        }
    }

    async fn apply(
        &self,
        state: &Mutex<VaultState>,
        share_id: &ShareId,
        batch: &EncryptedEventBatch,
    ) -> Result<ApplySummary> {
        let mut guard = state.lock().await;
        guard.set_phase(share_id, SyncPhase::Applying);
        apply_batch(&mut guard, self.envelope, share_id, batch)
    }

    async fn refresh_keys(&self, state: &Mutex<VaultState>, share_id: &ShareId) -> Result<()> {
        let sealed = requests::get_share_keys(self.api, share_id).await?;
        let keys = self
            .envelope
            .open_share_keys(share_id, &sealed, self.user_key)?;
        state.lock().await.replace_keys(keys)
    }
}

/// Resets a share to [`SyncPhase::Idle`] when a pass future is dropped
/// before it finishes.
struct PhaseGuard<'a> {
    state: &'a Arc<Mutex<VaultState>>,
    share_id: &'a ShareId,
    armed: bool,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut state) = self.state.try_lock() {
            state.set_phase(self.share_id, SyncPhase::Idle);
            return;
        }

        let state = Arc::clone(self.state);
        let share_id = self.share_id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    state.lock().await.set_phase(&share_id, SyncPhase::Idle);
                });
            }
            Err(_) => warn!("Sync of {share_id} cancelled outside a runtime; phase left set"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AesGcmProvider, SecretKey, ShareKey, ShareKeyRing};
    use crate::loader::LoadedShare;
    use crate::models::{
        EncryptedItem, EncryptedShareEvent, ItemContent, ItemState, Revision, Share,
        VaultContent,
    };
    use pretty_assertions::assert_eq;

    struct Fixture {
        envelope: Envelope<AesGcmProvider>,
        keys: ShareKeyRing,
        state: VaultState,
    }

    impl Fixture {
        fn new() -> Self {
            let keys = ShareKeyRing::with_keys("s".into(), [ShareKey::new(1, SecretKey::generate())]);
            let mut state = VaultState::new();
            state.insert_share(
                LoadedShare {
                    share: Share {
                        share_id: "s".into(),
                        vault_id: "v".into(),
                        target_id: "v".to_string(),
                        content: ShareContent::Vault(VaultContent::new("Personal", "")),
                        primary: true,
                        event_id: "e0".into(),
                        create_time: 0,
                    },
                    keys: keys.clone(),
                },
                vec![],
            );
            Self {
                envelope: Envelope::new(AesGcmProvider),
                keys,
                state,
            }
        }

        fn updated(&self, item_id: &str, revision: u64, note: &str) -> EncryptedShareEvent {
            let blob = self
                .envelope
                .encrypt_item_content(&ItemContent::note(item_id, note), &self.keys)
                .unwrap();
            EncryptedShareEvent::ItemUpdated {
                item: EncryptedItem {
                    item_id: item_id.into(),
                    revision: Revision(revision),
                    key_rotation: blob.key_rotation,
                    content: blob.content,
                    state: ItemState::Active,
                    revision_time: 0,
                    last_use_time: None,
                },
            }
        }

        fn apply(&mut self, batch: &EncryptedEventBatch) -> Result<ApplySummary> {
            apply_batch(&mut self.state, &self.envelope, &ShareId::new("s"), batch)
        }

        fn cursor(&self) -> &str {
            self.state.share(&ShareId::new("s")).unwrap().event_id.as_str()
        }

        fn note(&self, item_id: &str) -> Option<ItemContent> {
            self.state
                .items()
                .get(&ItemKey::new("s", item_id))
                .map(|item| item.content.clone())
        }
    }

    fn batch(latest: &str, changes: Vec<EncryptedShareEvent>) -> EncryptedEventBatch {
        EncryptedEventBatch {
            latest_event_id: latest.into(),
            events_pending: false,
            full_refresh: false,
            changes,
        }
    }

    #[test]
    fn applies_events_in_order_then_moves_cursor() {
        let mut fixture = Fixture::new();
        let events = batch(
            "e1",
            vec![
                fixture.updated("x", 1, "first"),
                fixture.updated("x", 2, "second"),
                fixture.updated("y", 1, "other"),
                EncryptedShareEvent::ItemDeleted { item_id: "y".into() },
            ],
        );

        let summary = fixture.apply(&events).unwrap();
        assert_eq!(summary.upserted, 3);
        assert_eq!(summary.deleted, 1);
        assert_eq!(fixture.cursor(), "e1");
        assert_eq!(fixture.note("x"), Some(ItemContent::note("x", "second")));
        assert_eq!(fixture.note("y"), None);
    }

    #[test]
    fn replaying_a_batch_changes_nothing() {
        let mut fixture = Fixture::new();
        let events = batch(
            "e1",
            vec![fixture.updated("x", 3, "v3"), fixture.updated("z", 1, "z")],
        );
        fixture.apply(&events).unwrap();
        let before = fixture.state.snapshot();

        let replay = fixture.apply(&events).unwrap();
        assert_eq!(replay.upserted, 0);
        assert_eq!(replay.ignored, 2);
        assert_eq!(fixture.state.snapshot(), before);
    }

    #[test]
    fn older_revision_never_overwrites() {
        let mut fixture = Fixture::new();
        fixture
            .apply(&batch("e1", vec![fixture.updated("x", 5, "new")]))
            .unwrap();
        fixture
            .apply(&batch("e2", vec![fixture.updated("x", 4, "old")]))
            .unwrap();
        assert_eq!(fixture.note("x"), Some(ItemContent::note("x", "new")));
        assert_eq!(fixture.cursor(), "e2");
    }

    #[test]
    fn decrypt_failure_keeps_cursor() {
        let mut fixture = Fixture::new();
        let mut broken = fixture.updated("y", 1, "broken");
        if let EncryptedShareEvent::ItemUpdated { item } = &mut broken {
            item.key_rotation = 9;
        }
        let events = batch("e1", vec![fixture.updated("x", 1, "ok"), broken]);

        let error = fixture.apply(&events).unwrap_err();
        assert!(matches!(error, Error::KeyNotFound { rotation: 9, .. }));
        assert_eq!(fixture.cursor(), "e0");
        assert!(fixture.note("x").is_some());
    }

    #[test]
    fn share_update_replaces_vault_content() {
        let mut fixture = Fixture::new();
        let mut encrypted = crate::models::EncryptedShare {
            share_id: "s".into(),
            vault_id: "v".into(),
            target_id: "v".to_string(),
            target_type: 1,
            primary: true,
            content: None,
            content_key_rotation: None,
            create_time: 0,
        };
        let blob = fixture
            .envelope
            .encrypt_vault_content(&VaultContent::new("Work", "shared"), &fixture.keys)
            .unwrap();
        encrypted.content = Some(blob.content);
        encrypted.content_key_rotation = Some(blob.key_rotation);

        let summary = fixture
            .apply(&batch(
                "e1",
                vec![EncryptedShareEvent::ShareUpdated { share: encrypted }],
            ))
            .unwrap();
        assert!(summary.share_updated);
        let share = fixture.state.share(&ShareId::new("s")).unwrap();
        assert_eq!(share.vault_content().map(|c| c.name.as_str()), Some("Work"));
    }

    #[tokio::test]
    async fn dropped_pass_returns_share_to_idle() {
        let share_id = ShareId::new("s");
        let state = Arc::new(Mutex::new(Fixture::new().state));
        state.lock().await.set_phase(&share_id, SyncPhase::Fetching);

        drop(PhaseGuard {
            state: &state,
            share_id: &share_id,
            armed: true,
        });
        assert_eq!(state.lock().await.phase(&share_id), SyncPhase::Idle);
    }

    #[tokio::test]
    async fn dropped_pass_waits_for_a_busy_lock() {
        let share_id = ShareId::new("s");
        let state = Arc::new(Mutex::new(Fixture::new().state));
        let mut held = state.lock().await;
        held.set_phase(&share_id, SyncPhase::Applying);

        drop(PhaseGuard {
            state: &state,
            share_id: &share_id,
            armed: true,
        });
        assert_eq!(held.phase(&share_id), SyncPhase::Applying);
        drop(held);

        tokio::task::yield_now().await;
        assert_eq!(state.lock().await.phase(&share_id), SyncPhase::Idle);
    }
}
