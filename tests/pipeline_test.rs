//! End-to-end pipeline: frame files → monitor cycle → store → broadcaster → subscriber

use image::{GrayImage, Luma};
use lotwatch::domain::{CameraId, RegionCatalog, ScoredSnapshot};
use lotwatch::infra::Metrics;
use lotwatch::io::{DirectoryFrameSource, JsonStore};
use lotwatch::services::{Broadcaster, HubMessage, MonitorCycle, SnapshotResponse, SubscriberHub};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const CATALOG: &str = r#"[
    {"camera": 0, "x1": 0, "y1": 10, "x2": 100, "y2": 90},
    {"camera": 0, "x1": 100, "y1": 10, "x2": 200, "y2": 90},
    {"camera": 1, "x1": 0, "y1": 10, "x2": 100, "y2": 90},
    [1, 100, 10, 200, 90, [0, 0, 255]]
]"#;

/// Write a 200x100 frame for `camera` with dark blocks over the given column ranges
fn write_frame(dir: &Path, camera: CameraId, cars: &[(u32, u32)]) {
    let frame = GrayImage::from_fn(200, 100, |x, y| {
        let in_car = cars.iter().any(|&(from, to)| (from..to).contains(&x)) && (20..80).contains(&y);
        if in_car {
            Luma([10])
        } else {
            Luma([230])
        }
    });
    frame.save(dir.join(format!("cam_{}.png", camera.0))).unwrap();
}

struct Pipeline {
    cycle: MonitorCycle<DirectoryFrameSource>,
    broadcaster: Broadcaster,
    hub: SubscriberHub,
    store: Arc<JsonStore>,
}

fn pipeline(frames: &Path, store_path: &Path) -> Pipeline {
    let catalog = Arc::new(RegionCatalog::from_json("inline", CATALOG).unwrap());
    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(JsonStore::new(store_path));
    let hub = SubscriberHub::new(16, metrics.clone());
    let cycle = MonitorCycle::new(
        catalog,
        Arc::new(DirectoryFrameSource::new(frames)),
        store.clone(),
        metrics.clone(),
    )
    .with_capture_timeout(Duration::from_secs(5));
    let broadcaster =
        Broadcaster::new(store.clone(), hub.clone(), metrics, Duration::from_millis(500));
    Pipeline { cycle, broadcaster, hub, store }
}

#[tokio::test]
async fn test_change_reaches_subscriber_once() {
    let dir = tempdir().unwrap();
    let frames = dir.path().join("frames");
    std::fs::create_dir_all(&frames).unwrap();
    let mut p = pipeline(&frames, &dir.path().join("database.json"));

    let (_id, mut rx) = p.hub.register(|| SnapshotResponse::ok(ScoredSnapshot::zero()));
    assert!(matches!(rx.try_recv().unwrap(), HubMessage::Snapshot(_)));

    // one car on each camera
    write_frame(&frames, CameraId(0), &[(20, 80)]);
    write_frame(&frames, CameraId(1), &[(120, 180)]);

    let report = p.cycle.run_once().await;
    assert_eq!(report.scored.total_spaces, 4);
    assert_eq!(report.scored.occupied_spaces, 2);
    assert_eq!(report.scored.free_spaces, 2);
    assert_eq!(report.scored.probability, 50.0);

    assert!(p.broadcaster.tick());
    match rx.try_recv().unwrap() {
        HubMessage::Update(s) => {
            assert_eq!(s.snapshot.occupied_spaces, 2);
            assert_eq!(s.error, None);
        }
        other => panic!("expected update, got {other:?}"),
    }

    // same scene again: new timestamp, same reading, nothing pushed
    p.cycle.run_once().await;
    assert!(!p.broadcaster.tick());
    assert!(rx.try_recv().is_err());

    // a car leaves camera 1
    write_frame(&frames, CameraId(1), &[]);
    let report = p.cycle.run_once().await;
    assert_eq!(report.scored.occupied_spaces, 1);
    assert_eq!(report.scored.probability, 75.0);

    assert!(p.broadcaster.tick());
    match rx.try_recv().unwrap() {
        HubMessage::Update(s) => assert_eq!(s.snapshot.free_spaces, 3),
        other => panic!("expected update, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_camera_frame_excluded_from_counts() {
    let dir = tempdir().unwrap();
    let frames = dir.path().join("frames");
    std::fs::create_dir_all(&frames).unwrap();
    let mut p = pipeline(&frames, &dir.path().join("database.json"));

    write_frame(&frames, CameraId(0), &[(20, 80), (120, 180)]);

    let report = p.cycle.run_once().await;
    assert_eq!(report.aggregate.cameras_unavailable, 1);
    assert_eq!(report.scored.total_spaces, 4);
    assert_eq!(report.scored.occupied_spaces, 2);
    assert_eq!(report.scored.free_spaces, 0);

    let stored = p.store.load().unwrap();
    assert_eq!(stored.parking_lot, report.scored);
}
