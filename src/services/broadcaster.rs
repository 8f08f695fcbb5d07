//! Change-detection broadcaster
//!
//! Polls the store on a fixed interval and publishes an `update` to the hub only
//! when the reading differs from the last one this instance published. The
//! timestamp alone is not a change.

use crate::domain::types::{ParkingRecord, ScoredSnapshot};
use crate::infra::error::StoreError;
use crate::infra::metrics::Metrics;
use crate::io::store::JsonStore;
use crate::services::hub::{HubMessage, SnapshotResponse, SubscriberHub};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, trace, warn};

pub struct Broadcaster {
    store: Arc<JsonStore>,
    hub: SubscriberHub,
    metrics: Arc<Metrics>,
    interval: Duration,
    /// Last reading this instance published
    last: Option<ScoredSnapshot>,
}

impl Broadcaster {
    pub fn new(
        store: Arc<JsonStore>,
        hub: SubscriberHub,
        metrics: Arc<Metrics>,
        interval: Duration,
    ) -> Self {
        // a zero tokio interval period panics
        let interval = interval.max(Duration::from_millis(1));
        Self { store, hub, metrics, interval, last: None }
    }

    pub fn last_published(&self) -> Option<&ScoredSnapshot> {
        self.last.as_ref()
    }

    /// One evaluation: load, compare, maybe publish. Returns true if published.
    pub fn tick(&mut self) -> bool {
        let loaded = self.store.load();
        self.evaluate(loaded)
    }

    fn evaluate(&mut self, loaded: Result<ParkingRecord, StoreError>) -> bool {
        let record = match loaded {
            Ok(record) => record,
            Err(e) => {
                self.metrics.record_store_read_failure();
                warn!(error = %e, kind = e.kind(), "broadcast_read_failed");
                return false;
            }
        };

        let current = record.parking_lot;
        if self.last.as_ref().is_some_and(|last| last.same_reading(&current)) {
            trace!("broadcast_unchanged");
            return false;
        }

        let delivered = self.hub.publish(&HubMessage::Update(SnapshotResponse::ok(current.clone())));
        self.metrics.record_broadcast();
        info!(
            free = %current.free_spaces,
            occupied = %current.occupied_spaces,
            total = %current.total_spaces,
            probability = format!("{:.2}", current.probability),
            subscribers = %delivered,
            "broadcast_published"
        );

        self.last = Some(current);
        true
    }

    /// Run until shutdown
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = %self.interval.as_millis(), "broadcaster_started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let store = self.store.clone();
                    match tokio::task::spawn_blocking(move || store.load()).await {
                        Ok(loaded) => {
                            self.evaluate(loaded);
                        }
                        Err(e) => warn!(error = %e, "broadcast_read_task_failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("broadcaster_shutdown");
                        break;
                    }
                }
            }
        }
    }
}
