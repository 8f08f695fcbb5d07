//! Monitor cycle: capture → preprocess → classify → aggregate → score → save
//!
//! The cycle is the only writer of the store. Runtime conditions (a dead
//! camera, a corrupt or unwritable store) are logged and counted; none of them
//! stops the loop.

use crate::domain::catalog::RegionCatalog;
use crate::domain::types::{CameraId, ParkingRecord, ScoredSnapshot};
use crate::infra::error::StoreError;
use crate::infra::metrics::Metrics;
use crate::io::capture::{capture_with_timeout, FrameSource};
use crate::io::store::JsonStore;
use crate::services::aggregator::{aggregate, Aggregate, CameraOutcome};
use crate::services::classifier::OccupancyClassifier;
use crate::services::evidence::preprocess;
use crate::services::scoring::probability;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Outcome of one iteration
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub aggregate: Aggregate,
    pub scored: ScoredSnapshot,
    pub saved: bool,
}

pub struct MonitorCycle<S: FrameSource> {
    catalog: Arc<RegionCatalog>,
    source: Arc<S>,
    store: Arc<JsonStore>,
    metrics: Arc<Metrics>,
    classifier: OccupancyClassifier,
    capture_timeout: Duration,
    interval: Duration,
    /// Last record successfully written
    last_record: Option<ParkingRecord>,
}

impl<S: FrameSource> MonitorCycle<S> {
    pub fn new(
        catalog: Arc<RegionCatalog>,
        source: Arc<S>,
        store: Arc<JsonStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            catalog,
            source,
            store,
            metrics,
            classifier: OccupancyClassifier::default(),
            capture_timeout: Duration::from_millis(2000),
            interval: Duration::ZERO,
            last_record: None,
        }
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.classifier = OccupancyClassifier::new(threshold);
        self
    }

    pub fn with_capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn last_record(&self) -> Option<&ParkingRecord> {
        self.last_record.as_ref()
    }

    async fn observe_camera(&self, camera: CameraId) -> CameraOutcome {
        let frame = match capture_with_timeout(self.source.as_ref(), camera, self.capture_timeout)
            .await
        {
            Ok(frame) => frame,
            Err(e) => {
                self.metrics.record_camera_unavailable();
                warn!(camera = %e.camera(), error = %e, "camera_unavailable");
                return CameraOutcome::Unavailable;
            }
        };

        let regions = self.catalog.regions_for(camera).to_vec();
        let classifier = self.classifier.clone();
        let classified = tokio::task::spawn_blocking(move || {
            let evidence = preprocess(&frame);
            classifier.classify(camera, &evidence, &regions)
        })
        .await;

        match classified {
            Ok(result) => {
                let counts = result.counts();
                debug!(
                    camera = %camera,
                    free = %counts.free,
                    occupied = %counts.occupied,
                    discarded = %result.discarded.len(),
                    "camera_classified"
                );
                CameraOutcome::Classified { counts, discarded: result.discarded.len() as u32 }
            }
            Err(e) => {
                self.metrics.record_camera_unavailable();
                error!(camera = %camera, error = %e, "classification_task_failed");
                CameraOutcome::Unavailable
            }
        }
    }

    /// Ledgers to carry into the next record
    fn current_ledgers(&self) -> (Vec<serde_json::Value>, Vec<serde_json::Value>) {
        let loaded = self.store.load_or_default();
        match loaded.condition {
            None => (loaded.record.bookings, loaded.record.website_visits),
            Some(StoreError::Missing { .. }) => (Vec::new(), Vec::new()),
            Some(e @ StoreError::Corrupt { .. }) => {
                self.metrics.record_store_read_failure();
                warn!(error = %e, "store_corrupt_ledgers_reset");
                (Vec::new(), Vec::new())
            }
            Some(e @ StoreError::Unavailable { .. }) => {
                self.metrics.record_store_read_failure();
                error!(error = %e, "store_read_failed");
                // keep what we last wrote rather than wiping the ledgers
                self.last_record
                    .as_ref()
                    .map(|r| (r.bookings.clone(), r.website_visits.clone()))
                    .unwrap_or_default()
            }
        }
    }

    /// Run one full iteration
    pub async fn run_once(&mut self) -> CycleReport {
        let started = Instant::now();

        let mut outcomes = Vec::new();
        for camera in self.catalog.cameras() {
            outcomes.push(self.observe_camera(camera).await);
        }

        let agg = aggregate(self.catalog.len() as u32, outcomes);
        if agg.anomaly {
            self.metrics.record_anomaly();
        }
        if agg.regions_discarded > 0 {
            self.metrics.record_regions_discarded(agg.regions_discarded as u64);
        }

        let (bookings, website_visits) = self.current_ledgers();
        let score = probability(&agg.snapshot, bookings.len(), website_visits.len());
        let scored = ScoredSnapshot::new(agg.snapshot.clone(), score);
        let record = ParkingRecord { parking_lot: scored.clone(), bookings, website_visits };

        let saved = match self.store.save(&record) {
            Ok(()) => true,
            Err(e) => {
                self.metrics.record_store_write_failure();
                error!(error = %e, "store_write_failed");
                false
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_cycle(elapsed_ms);

        if saved {
            let changed = self
                .last_record
                .as_ref()
                .map_or(true, |last| !last.parking_lot.same_reading(&scored));
            self.metrics.set_reading(
                scored.total_spaces,
                scored.free_spaces,
                scored.occupied_spaces,
                scored.probability,
            );

            if changed {
                info!(
                    total = %scored.total_spaces,
                    free = %scored.free_spaces,
                    occupied = %scored.occupied_spaces,
                    probability = format!("{:.2}", scored.probability),
                    bookings = %record.booking_count(),
                    visits = %record.visit_count(),
                    cameras_unavailable = %agg.cameras_unavailable,
                    elapsed_ms = %elapsed_ms,
                    "cycle_complete"
                );
            } else {
                debug!(
                    total = %scored.total_spaces,
                    free = %scored.free_spaces,
                    occupied = %scored.occupied_spaces,
                    elapsed_ms = %elapsed_ms,
                    "cycle_complete"
                );
            }
            self.last_record = Some(record);
        }

        CycleReport { aggregate: agg, scored, saved }
    }

    /// Loop until shutdown
    ///
    /// Shutdown is observed while capturing or waiting between iterations.
    /// Everything after the last capture runs without yielding, so a save that
    /// has started always finishes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            regions = %self.catalog.len(),
            cameras = %self.catalog.cameras().count(),
            threshold = %self.classifier.threshold(),
            interval_ms = %self.interval.as_millis(),
            "monitor_cycle_started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = self.run_once() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }

            if self.interval.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("monitor_cycle_shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Rect, Region, RegionId};
    use crate::infra::error::CaptureError;
    use image::{DynamicImage, GrayImage, Luma};
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::tempdir;

    /// Serves fixed frames; cameras without a frame are unavailable
    struct FixedFrames(HashMap<CameraId, DynamicImage>);

    impl FrameSource for FixedFrames {
        async fn capture(&self, camera: CameraId) -> Result<DynamicImage, CaptureError> {
            self.0.get(&camera).cloned().ok_or(CaptureError::Unavailable {
                camera,
                reason: "no frame".to_string(),
            })
        }
    }

    /// Light background with a dark block covering `x_from..x_to`
    fn frame_with_car(x_from: u32, x_to: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(200, 100, |x, y| {
            if (x_from..x_to).contains(&x) && (20..80).contains(&y) {
                Luma([10])
            } else {
                Luma([230])
            }
        }))
    }

    fn region(id: u32, camera: u32, x1: u32, x2: u32) -> Region {
        Region {
            id: RegionId(id),
            camera: CameraId(camera),
            bounds: Rect { x1, y1: 10, x2, y2: 90 },
            color: [255, 0, 255],
        }
    }

    fn catalog() -> Arc<RegionCatalog> {
        Arc::new(
            RegionCatalog::new(vec![
                region(1, 0, 0, 100),
                region(2, 0, 100, 200),
                region(3, 1, 0, 100),
                region(4, 1, 100, 200),
            ])
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_cycle_writes_record() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonStore::new(dir.path().join("database.json")));
        let frames = HashMap::from([
            (CameraId(0), frame_with_car(20, 80)),
            (CameraId(1), frame_with_car(20, 80)),
        ]);
        let mut cycle =
            MonitorCycle::new(catalog(), Arc::new(FixedFrames(frames)), store.clone(), Arc::new(Metrics::new()));

        let report = cycle.run_once().await;
        assert!(report.saved);
        assert_eq!(report.scored.total_spaces, 4);
        assert_eq!(report.scored.occupied_spaces, 2);
        assert_eq!(report.scored.free_spaces, 2);
        assert_eq!(report.scored.probability, 50.0);

        let persisted = store.load().unwrap();
        assert_eq!(persisted.parking_lot, report.scored);
        assert!(!persisted.parking_lot.timestamp.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_camera_excluded_but_counted_in_total() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonStore::new(dir.path().join("database.json")));
        let metrics = Arc::new(Metrics::new());
        let frames = HashMap::from([(CameraId(0), frame_with_car(20, 80))]);
        let mut cycle =
            MonitorCycle::new(catalog(), Arc::new(FixedFrames(frames)), store, metrics.clone());

        let report = cycle.run_once().await;
        assert_eq!(report.scored.total_spaces, 4);
        assert_eq!(report.scored.free_spaces + report.scored.occupied_spaces, 2);
        assert_eq!(report.aggregate.cameras_unavailable, 1);
        assert_eq!(metrics.report().cameras_unavailable_total, 1);
    }

    #[tokio::test]
    async fn test_ledgers_preserved_and_scored() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonStore::new(dir.path().join("database.json")));
        store
            .save(&ParkingRecord {
                parking_lot: ScoredSnapshot::zero(),
                bookings: vec![json!({"plate": "AB-123"})],
                website_visits: vec![json!("v1"), json!("v2")],
            })
            .unwrap();

        let frames = HashMap::from([
            (CameraId(0), frame_with_car(20, 80)),
            (CameraId(1), frame_with_car(20, 80)),
        ]);
        let mut cycle =
            MonitorCycle::new(catalog(), Arc::new(FixedFrames(frames)), store.clone(), Arc::new(Metrics::new()));
        let report = cycle.run_once().await;

        // 100 - 50 - 25 - 0.2
        assert_eq!(report.scored.probability, 24.8);
        let persisted = store.load().unwrap();
        assert_eq!(persisted.booking_count(), 1);
        assert_eq!(persisted.website_visits, vec![json!("v1"), json!("v2")]);
    }

    #[tokio::test]
    async fn test_corrupt_store_is_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("database.json");
        std::fs::write(&path, "{broken").unwrap();
        let store = Arc::new(JsonStore::new(&path));
        let metrics = Arc::new(Metrics::new());

        let mut cycle = MonitorCycle::new(
            catalog(),
            Arc::new(FixedFrames(HashMap::new())),
            store.clone(),
            metrics.clone(),
        );
        let report = cycle.run_once().await;
        assert!(report.saved);
        assert_eq!(metrics.report().store_read_failures_total, 1);
        assert_eq!(store.load().unwrap().parking_lot.total_spaces, 4);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonStore::new(dir.path().join("database.json")));
        let metrics = Arc::new(Metrics::new());
        let cycle = MonitorCycle::new(
            catalog(),
            Arc::new(FixedFrames(HashMap::new())),
            store,
            metrics.clone(),
        )
        .with_interval(Duration::from_millis(10));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(cycle.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(metrics.cycles_total() >= 1);
    }
}
