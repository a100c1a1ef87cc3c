//! In-process fake of the Pass API plus a recording UI observer.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pass_core::api::requests::{ItemRevisionRef, MoveItemPayload};
use pass_core::api::{ApiClient, ApiRequest, Method};
use pass_core::crypto::{AesGcmProvider, Envelope, SecretKey, ShareKey, ShareKeyRing};
use pass_core::models::{
    EncryptedItem, EncryptedShare, EncryptedShareEvent, EncryptedShareKey, ItemContent, ItemId,
    ItemKey, ItemState, Revision, RevisionUpdate, ShareId, VaultContent,
};
use pass_core::optimistic::{DerivedView, OptimisticEntry};
use pass_core::{Error, PassConfig, PassClient, Result, UiObserver};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

pub type TestClient = PassClient<FakeApi, AesGcmProvider, RecordingObserver>;

/// Which requests a gate holds back
enum Gate {
    Url(String),
    MoveTo(ShareId),
}

impl Gate {
    fn matches(&self, request: &ApiRequest) -> bool {
        match self {
            Self::Url(fragment) => request.url.contains(fragment.as_str()),
            Self::MoveTo(destination) => {
                request.method == Method::Put
                    && request
                        .data
                        .as_ref()
                        .and_then(|data| data["DestinationShareID"].as_str())
                        == Some(destination.as_str())
            }
        }
    }
}

struct FakeShare {
    encrypted: EncryptedShare,
    ring: ShareKeyRing,
    sealed_keys: Vec<EncryptedShareKey>,
    items: BTreeMap<ItemId, EncryptedItem>,
    events: Vec<(String, EncryptedShareEvent)>,
    next_event: u64,
    full_refresh: bool,
}

impl FakeShare {
    fn push_event(&mut self, event: EncryptedShareEvent) {
        self.next_event += 1;
        self.events.push((format!("e{}", self.next_event), event));
    }

    fn latest_event(&self) -> String {
        self.events
            .last()
            .map_or_else(|| "e0".to_string(), |(id, _)| id.clone())
    }
}

#[derive(Default)]
struct Server {
    shares: HashMap<ShareId, FakeShare>,
    failures: Vec<(String, u16, String)>,
    log: Vec<String>,
    next_item: u64,
    event_page: Option<usize>,
}

/// Cheap clonable handle over the fake server.
#[derive(Clone)]
pub struct FakeApi {
    server: Arc<Mutex<Server>>,
    envelope: Arc<Envelope<AesGcmProvider>>,
    user_key: Arc<SecretKey>,
    gates: Arc<Mutex<Vec<(Gate, Arc<Semaphore>)>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            server: Arc::new(Mutex::new(Server::default())),
            envelope: Arc::new(Envelope::new(AesGcmProvider)),
            user_key: Arc::new(SecretKey::generate()),
            gates: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A copy of the user key, for building a client.
    pub fn user_key_copy(&self) -> SecretKey {
        SecretKey::from_base64(&self.user_key.to_base64()).unwrap()
    }

    pub fn client(&self, observer: RecordingObserver) -> TestClient {
        let config = PassConfig::new("https://pass.test/api").unwrap();
        PassClient::new(
            self.clone(),
            Envelope::new(AesGcmProvider),
            self.user_key_copy(),
            &config,
            observer,
        )
    }

    /// Create a vault share with a single key rotation.
    pub fn add_vault(&self, share_id: &str, name: &str) {
        let share_id = ShareId::new(share_id);
        let key = ShareKey::new(1, SecretKey::generate());
        let sealed = self.envelope.seal_share_key(&key, &self.user_key).unwrap();
        let ring = ShareKeyRing::with_keys(share_id.clone(), [key]);
        let content = self
            .envelope
            .encrypt_vault_content(&VaultContent::new(name, ""), &ring)
            .unwrap();

        let encrypted = EncryptedShare {
            share_id: share_id.clone(),
            vault_id: format!("vault-{share_id}").into(),
            target_id: format!("vault-{share_id}"),
            target_type: 1,
            primary: false,
            content: Some(content.content),
            content_key_rotation: Some(content.key_rotation),
            create_time: 1_700_000_000,
        };
        self.server().shares.insert(
            share_id,
            FakeShare {
                encrypted,
                ring,
                sealed_keys: vec![sealed],
                items: BTreeMap::new(),
                events: Vec::new(),
                next_event: 0,
                full_refresh: false,
            },
        );
    }

    /// Create an item without emitting an event (part of the initial listing).
    pub fn seed_item(&self, share_id: &str, item_id: &str, name: &str) {
        let mut server = self.server();
        let share = server.shares.get_mut(&ShareId::new(share_id)).unwrap();
        let item = self.encrypt(&share.ring, item_id, 1, &ItemContent::note(name, ""));
        share.items.insert(item.item_id.clone(), item);
    }

    /// Change an item server-side and emit `ItemUpdated`.
    pub fn update_item(&self, share_id: &str, item_id: &str, name: &str) {
        let mut server = self.server();
        let share = server.shares.get_mut(&ShareId::new(share_id)).unwrap();
        let revision = share
            .items
            .get(&ItemId::new(item_id))
            .map_or(1, |item| item.revision.0 + 1);
        let item = self.encrypt(&share.ring, item_id, revision, &ItemContent::note(name, ""));
        share.items.insert(item.item_id.clone(), item.clone());
        share.push_event(EncryptedShareEvent::ItemUpdated { item });
    }

    /// Emit an arbitrary event without touching the item listing.
    pub fn push_raw_event(&self, share_id: &str, event: EncryptedShareEvent) {
        self.server()
            .shares
            .get_mut(&ShareId::new(share_id))
            .unwrap()
            .push_event(event);
    }

    pub fn encrypted_item(&self, share_id: &str, item_id: &str) -> Option<EncryptedItem> {
        self.server()
            .shares
            .get(&ShareId::new(share_id))?
            .items
            .get(&ItemId::new(item_id))
            .cloned()
    }

    /// Encrypt an item revision with a share's key.
    pub fn encrypt_for(&self, share_id: &str, item_id: &str, revision: u64, name: &str) -> EncryptedItem {
        let server = self.server();
        let share = server.shares.get(&ShareId::new(share_id)).unwrap();
        self.encrypt(&share.ring, item_id, revision, &ItemContent::note(name, ""))
    }

    pub fn item_ids(&self, share_id: &str) -> Vec<String> {
        self.server()
            .shares
            .get(&ShareId::new(share_id))
            .map(|share| share.items.keys().map(ToString::to_string).collect())
            .unwrap_or_default()
    }

    /// Make the share disappear: every later request for it answers 404.
    pub fn drop_share(&self, share_id: &str) {
        self.server().shares.remove(&ShareId::new(share_id));
    }

    pub fn require_full_refresh(&self, share_id: &str) {
        self.server()
            .shares
            .get_mut(&ShareId::new(share_id))
            .unwrap()
            .full_refresh = true;
    }

    /// Serve at most `size` events per page.
    pub fn page_events(&self, size: usize) {
        self.server().event_page = Some(size);
    }

    /// Fail the next request whose URL contains `fragment`.
    pub fn fail_next(&self, fragment: &str, code: u16, message: &str) {
        self.server()
            .failures
            .push((fragment.to_string(), code, message.to_string()));
    }

    /// Hold requests whose URL contains `fragment` until a permit is added.
    pub fn gate(&self, fragment: &str) -> Arc<Semaphore> {
        self.add_gate(Gate::Url(fragment.to_string()))
    }

    /// Hold moves into `destination` until a permit is added.
    pub fn gate_move_to(&self, destination: &str) -> Arc<Semaphore> {
        self.add_gate(Gate::MoveTo(ShareId::new(destination)))
    }

    pub fn requests(&self) -> Vec<String> {
        self.server().log.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn add_gate(&self, gate: Gate) -> Arc<Semaphore> {
        let semaphore = Arc::new(Semaphore::new(0));
        self.gates
            .lock()
            .unwrap()
            .push((gate, Arc::clone(&semaphore)));
        semaphore
    }

    fn server(&self) -> std::sync::MutexGuard<'_, Server> {
        self.server.lock().unwrap()
    }

    fn encrypt(
        &self,
        ring: &ShareKeyRing,
        item_id: &str,
        revision: u64,
        content: &ItemContent,
    ) -> EncryptedItem {
        let blob = self.envelope.encrypt_item_content(content, ring).unwrap();
        EncryptedItem {
            item_id: item_id.into(),
            revision: Revision(revision),
            key_rotation: blob.key_rotation,
            content: blob.content,
            state: ItemState::Active,
            revision_time: 1_700_000_000,
            last_use_time: None,
        }
    }

    fn handle(&self, request: &ApiRequest) -> Result<Value> {
        let mut server = self.server();
        server
            .log
            .push(format!("{:?} {}", request.method, request.url));

        if let Some(position) = server
            .failures
            .iter()
            .position(|(fragment, _, _)| request.url.contains(fragment.as_str()))
        {
            let (_, code, message) = server.failures.remove(position);
            return Err(Error::Api { code, message });
        }

        let (path, query) = request
            .url
            .split_once('?')
            .unwrap_or((request.url.as_str(), ""));
        let segments: Vec<&str> = path
            .trim_start_matches("pass/v1/share/")
            .split('/')
            .collect();
        let share_id = ShareId::new(segments[0]);
        let event_page = server.event_page;
        let next_item = server.next_item;
        let Some(share) = server.shares.get_mut(&share_id) else {
            return Err(Error::Api {
                code: 404,
                message: format!("Share {share_id} not found [2501]"),
            });
        };

        let response = match (request.method, &segments[1..]) {
            (Method::Get, []) => json!({ "Share": share.encrypted }),
            (Method::Get, ["key"]) => {
                let keys = if query == "Page=0" {
                    share.sealed_keys.clone()
                } else {
                    Vec::new()
                };
                json!({ "ShareKeys": { "Keys": keys, "Total": share.sealed_keys.len() } })
            }
            (Method::Get, ["event"]) => json!({ "EventID": share.latest_event() }),
            (Method::Get, ["event", since]) => {
                if share.full_refresh {
                    share.full_refresh = false;
                    json!({ "Events": {
                        "LatestEventID": since, "EventsPending": false,
                        "FullRefresh": true, "Changes": []
                    }})
                } else {
                    let start = share
                        .events
                        .iter()
                        .position(|(id, _)| id.as_str() == *since)
                        .map_or(0, |index| index + 1);
                    let remaining = &share.events[start..];
                    let take = event_page.unwrap_or(remaining.len()).min(remaining.len());
                    let page = &remaining[..take];
                    let latest = page
                        .last()
                        .map_or_else(|| (*since).to_string(), |(id, _)| id.clone());
                    let changes: Vec<&EncryptedShareEvent> =
                        page.iter().map(|(_, event)| event).collect();
                    json!({ "Events": {
                        "LatestEventID": latest,
                        "EventsPending": take < remaining.len(),
                        "FullRefresh": false,
                        "Changes": changes
                    }})
                }
            }
            (Method::Get, ["item"]) => {
                let items: Vec<&EncryptedItem> = share.items.values().collect();
                json!({ "Items": { "RevisionsData": items, "LastToken": null } })
            }
            (Method::Post, ["item", action @ ("trash" | "untrash")]) => {
                let state = if *action == "trash" {
                    ItemState::Trashed
                } else {
                    ItemState::Active
                };
                let refs: Vec<ItemRevisionRef> = items_field(request)?;
                let mut updates = Vec::new();
                for reference in refs {
                    let item = share.items.get_mut(&reference.item_id).ok_or_else(|| {
                        Error::Api {
                            code: 422,
                            message: format!("Item {} does not exist", reference.item_id),
                        }
                    })?;
                    item.revision = Revision(item.revision.0 + 1);
                    item.state = state;
                    let updated = item.clone();
                    updates.push(RevisionUpdate {
                        item_id: updated.item_id.clone(),
                        revision: updated.revision,
                        state,
                        revision_time: updated.revision_time,
                    });
                    share.push_event(EncryptedShareEvent::ItemUpdated { item: updated });
                }
                json!({ "Items": updates })
            }
            (Method::Delete, ["item"]) => {
                let refs: Vec<ItemRevisionRef> = items_field(request)?;
                for reference in refs {
                    share.items.remove(&reference.item_id);
                    share.push_event(EncryptedShareEvent::ItemDeleted {
                        item_id: reference.item_id,
                    });
                }
                json!({ "Code": 1000 })
            }
            (Method::Put, ["item", "share"]) => {
                let data = request.data.clone().unwrap_or(Value::Null);
                let destination = ShareId::new(
                    data["DestinationShareID"].as_str().unwrap_or_default(),
                );
                let payloads: Vec<MoveItemPayload> = items_field(request)?;
                let mut moved_ids = Vec::new();
                for payload in &payloads {
                    if share.items.remove(&payload.item_id).is_none() {
                        return Err(Error::Api {
                            code: 422,
                            message: format!("Item {} does not exist", payload.item_id),
                        });
                    }
                    share.push_event(EncryptedShareEvent::ItemDeleted {
                        item_id: payload.item_id.clone(),
                    });
                    moved_ids.push(payload.item_id.clone());
                }

                let Some(target) = server.shares.get_mut(&destination) else {
                    return Err(Error::Api {
                        code: 404,
                        message: "Destination not found".to_string(),
                    });
                };
                let mut moved = Vec::new();
                for (offset, payload) in payloads.into_iter().enumerate() {
                    let item = EncryptedItem {
                        item_id: format!("moved-{}", next_item + offset as u64).into(),
                        revision: Revision(1),
                        key_rotation: payload.item.key_rotation,
                        content: payload.item.content,
                        state: ItemState::Active,
                        revision_time: 1_700_000_100,
                        last_use_time: None,
                    };
                    target.items.insert(item.item_id.clone(), item.clone());
                    target.push_event(EncryptedShareEvent::ItemUpdated { item: item.clone() });
                    moved.push(item);
                }
                server.next_item += moved.len() as u64;
                json!({ "Items": moved })
            }
            (method, rest) => {
                return Err(Error::Api {
                    code: 400,
                    message: format!("unexpected {method:?} {rest:?}"),
                })
            }
        };
        Ok(response)
    }
}

impl ApiClient for FakeApi {
    async fn send(&self, request: ApiRequest) -> Result<Value> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let gate = self
            .gates
            .lock()
            .unwrap()
            .iter()
            .find(|(gate, _)| gate.matches(&request))
            .map(|(_, gate)| Arc::clone(gate));
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let result = self.handle(&request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn items_field<T: serde::de::DeserializeOwned>(request: &ApiRequest) -> Result<Vec<T>> {
    let items = request
        .data
        .as_ref()
        .and_then(|data| data.get("Items"))
        .cloned()
        .unwrap_or(Value::Null);
    Ok(serde_json::from_value(items)?)
}

/// What the client told the UI, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    StateChanged { items: usize },
    MutationFailed(String),
    Navigated(ItemKey),
}

#[derive(Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<UiEvent>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn navigations(&self) -> Vec<ItemKey> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                UiEvent::Navigated(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                UiEvent::MutationFailed(reason) => Some(reason),
                _ => None,
            })
            .collect()
    }
}

impl UiObserver for RecordingObserver {
    fn on_state_change(&self, view: &DerivedView) {
        self.events
            .lock()
            .unwrap()
            .push(UiEvent::StateChanged { items: view.len() });
    }

    fn on_mutation_failed(&self, entry: &OptimisticEntry) {
        self.events.lock().unwrap().push(UiEvent::MutationFailed(
            entry.failure().unwrap_or_default().to_string(),
        ));
    }

    fn navigate_to_item(&self, key: &ItemKey) {
        self.events
            .lock()
            .unwrap()
            .push(UiEvent::Navigated(key.clone()));
    }
}
