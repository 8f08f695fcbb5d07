//! Subscriber hub - registry of live WebSocket subscribers and fan-out
//!
//! Each subscriber owns a bounded queue. Publishing never blocks. A subscriber
//! whose queue is full is disconnected instead of silently missing a reading;
//! its session ends and the client reconnects to a fresh initial snapshot. A
//! closed queue removes the subscriber.

use crate::domain::types::ScoredSnapshot;
use crate::infra::metrics::Metrics;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Transient identity of one connected subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot as served to consumers, annotated when it is a substituted default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotResponse {
    #[serde(flatten)]
    pub snapshot: ScoredSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SnapshotResponse {
    pub fn ok(snapshot: ScoredSnapshot) -> Self {
        Self { snapshot, error: None }
    }

    pub fn degraded(snapshot: ScoredSnapshot, error: String) -> Self {
        Self { snapshot, error: Some(error) }
    }
}

/// Outbound message envelope: `{"type": "snapshot"|"update", "data": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    /// Full current state, sent on connect and on request
    Snapshot(SnapshotResponse),
    /// A changed reading pushed by the broadcaster
    Update(SnapshotResponse),
}

impl HubMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct SubscriberHub {
    subscribers: Arc<RwLock<FxHashMap<SubscriberId, mpsc::Sender<HubMessage>>>>,
    queue_capacity: usize,
    drops: Arc<AtomicU64>,
    metrics: Arc<Metrics>,
}

impl SubscriberHub {
    pub fn new(queue_capacity: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(FxHashMap::default())),
            queue_capacity: queue_capacity.max(1),
            drops: Arc::new(AtomicU64::new(0)),
            metrics,
        }
    }

    /// Register a subscriber whose first queued message is the snapshot from `current`
    ///
    /// `current` runs while the registry is write-locked, so no publish can be
    /// queued ahead of the initial snapshot.
    pub fn register<F>(&self, current: F) -> (SubscriberId, mpsc::Receiver<HubMessage>)
    where
        F: FnOnce() -> SnapshotResponse,
    {
        let id = SubscriberId::generate();
        let (tx, rx) = mpsc::channel(self.queue_capacity);

        let count = {
            let mut subscribers = self.subscribers.write();
            // capacity >= 1 and the receiver is alive, so this cannot fail
            let _ = tx.try_send(HubMessage::Snapshot(current()));
            subscribers.insert(id, tx);
            subscribers.len()
        };

        self.metrics.set_subscribers(count as u64);
        info!(subscriber = %id, subscribers = %count, "subscriber_registered");
        (id, rx)
    }

    /// Remove a subscriber; unknown ids are ignored
    pub fn deregister(&self, id: SubscriberId) -> bool {
        let (removed, count) = {
            let mut subscribers = self.subscribers.write();
            (subscribers.remove(&id).is_some(), subscribers.len())
        };

        if removed {
            self.metrics.set_subscribers(count as u64);
            info!(subscriber = %id, subscribers = %count, "subscriber_deregistered");
        }
        removed
    }

    /// Offer a message to every subscriber; returns how many accepted it
    pub fn publish(&self, message: &HubMessage) -> usize {
        let mut delivered = 0;
        let mut lagging = Vec::new();
        let mut closed = Vec::new();

        {
            let subscribers = self.subscribers.read();
            for (id, tx) in subscribers.iter() {
                match tx.try_send(message.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => lagging.push(*id),
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        // dropping the sender ends the session once its queue drains
        for id in lagging {
            self.metrics.record_subscriber_drop();
            let drops = self.drops.fetch_add(1, Ordering::Relaxed) + 1;
            if drops.is_power_of_two() {
                warn!(subscriber = %id, drops_total = %drops, "subscriber_lagging_disconnected");
            } else {
                debug!(subscriber = %id, "subscriber_lagging_disconnected");
            }
            self.deregister(id);
        }

        for id in closed {
            debug!(subscriber = %id, "subscriber_gone");
            self.deregister(id);
        }

        delivered
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }
}
