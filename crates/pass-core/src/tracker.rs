//! Request/acknowledgment tracker.
//!
//! Requests are tracked by id from start to a terminal status. Once terminal,
//! the record is acknowledged on the channel returned by
//! [`RequestTracker::new`] after the debounce window. Status changes inside
//! the window are folded into the one acknowledgment. An id is acknowledged
//! at most once while it is in the acknowledged history; the history keeps
//! the most recent [`DEFAULT_ACK_HISTORY`] ids and forgets the oldest first.
//! An id evicted from it and then reused would be acknowledged again, so
//! callers should use fresh ids per request.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::config::PassConfig;
use crate::models::RequestId;

/// Acknowledged ids remembered for at-most-once delivery
pub const DEFAULT_ACK_HISTORY: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Success,
    Failure,
}

impl RequestStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: RequestId,
    pub status: RequestStatus,
    pub data: Option<Value>,
}

#[derive(Debug)]
struct TrackerInner {
    records: HashMap<RequestId, RequestRecord>,
    scheduled: HashSet<RequestId>,
    acknowledged: HashSet<RequestId>,
    /// Acknowledged ids, oldest first
    history: VecDeque<RequestId>,
    history_limit: usize,
}

impl TrackerInner {
    fn new(history_limit: usize) -> Self {
        Self {
            records: HashMap::new(),
            scheduled: HashSet::new(),
            acknowledged: HashSet::new(),
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
        }
    }

    /// Emit the acknowledgment for `id` if it is still owed.
    fn take_acknowledgment(&mut self, id: &RequestId) -> Option<RequestRecord> {
        self.scheduled.remove(id);
        let record = self.records.get(id)?;
        if !record.status.is_terminal() || self.acknowledged.contains(id) {
            return None;
        }
        self.remember(id.clone());
        self.records.remove(id)
    }

    fn remember(&mut self, id: RequestId) {
        while self.history.len() >= self.history_limit {
            if let Some(oldest) = self.history.pop_front() {
                self.acknowledged.remove(&oldest);
            }
        }
        self.acknowledged.insert(id.clone());
        self.history.push_back(id);
    }
}

#[derive(Clone, Debug)]
pub struct RequestTracker {
    inner: Arc<Mutex<TrackerInner>>,
    debounce: Duration,
    acks: mpsc::UnboundedSender<RequestRecord>,
}

impl RequestTracker {
    #[must_use]
    pub fn new(debounce: Duration) -> (Self, mpsc::UnboundedReceiver<RequestRecord>) {
        Self::with_history(debounce, DEFAULT_ACK_HISTORY)
    }

    /// Tracker remembering at most `history` acknowledged ids.
    #[must_use]
    pub fn with_history(
        debounce: Duration,
        history: usize,
    ) -> (Self, mpsc::UnboundedReceiver<RequestRecord>) {
        let (acks, receiver) = mpsc::unbounded_channel();
        let tracker = Self {
            inner: Arc::new(Mutex::new(TrackerInner::new(history))),
            debounce,
            acks,
        };
        (tracker, receiver)
    }

    #[must_use]
    pub fn from_config(config: &PassConfig) -> (Self, mpsc::UnboundedReceiver<RequestRecord>) {
        Self::new(config.ack_debounce)
    }

    #[must_use]
    pub const fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Begin tracking a request. Returns `false` for ids already tracked or
    /// already acknowledged.
    pub async fn start(&self, id: RequestId) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.acknowledged.contains(&id) {
            warn!("Request {id} was already acknowledged; ignoring restart");
            return false;
        }
        if inner.records.contains_key(&id) {
            return false;
        }
        inner.records.insert(
            id.clone(),
            RequestRecord {
                id,
                status: RequestStatus::Pending,
                data: None,
            },
        );
        true
    }

    pub async fn succeed(&self, id: &RequestId, data: Option<Value>) -> bool {
        self.finish(id, RequestStatus::Success, data).await
    }

    pub async fn fail(&self, id: &RequestId, data: Option<Value>) -> bool {
        self.finish(id, RequestStatus::Failure, data).await
    }

    /// Record a status for `id`, scheduling its acknowledgment when terminal.
    ///
    /// Untracked ids are tracked on the fly. Returns `false` when `id` was
    /// already acknowledged, in which case nothing changes.
    pub async fn finish(&self, id: &RequestId, status: RequestStatus, data: Option<Value>) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.acknowledged.contains(id) {
            debug!("Request {id} already acknowledged");
            return false;
        }

        inner.records.insert(
            id.clone(),
            RequestRecord {
                id: id.clone(),
                status,
                data,
            },
        );
        if status.is_terminal() && inner.scheduled.insert(id.clone()) {
            self.schedule(id.clone());
        }
        true
    }

    /// Acknowledge a terminal request right away instead of waiting for the
    /// debounce window.
    pub async fn acknowledge(&self, id: &RequestId) -> Option<RequestRecord> {
        let record = self.inner.lock().await.take_acknowledgment(id)?;
        let _ = self.acks.send(record.clone());
        Some(record)
    }

    pub async fn get(&self, id: &RequestId) -> Option<RequestRecord> {
        self.inner.lock().await.records.get(id).cloned()
    }

    pub async fn is_acknowledged(&self, id: &RequestId) -> bool {
        self.inner.lock().await.acknowledged.contains(id)
    }

    /// Requests that have not reached a terminal status yet
    pub async fn pending(&self) -> Vec<RequestId> {
        let inner = self.inner.lock().await;
        let mut pending: Vec<_> = inner
            .records
            .values()
            .filter(|record| !record.status.is_terminal())
            .map(|record| record.id.clone())
            .collect();
        pending.sort();
        pending
    }

    fn schedule(&self, id: RequestId) {
        let inner = Arc::clone(&self.inner);
        let acks = self.acks.clone();
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let record = inner.lock().await.take_acknowledgment(&id);
            if let Some(record) = record {
                debug!("Acknowledging request {id} ({:?})", record.status);
                // Receiver gone means nobody listens for acknowledgments.
                let _ = acks.send(record);
            }
        });
    }
}
