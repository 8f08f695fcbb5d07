//! Gateway integration tests against a server on an ephemeral port

use futures::{SinkExt, StreamExt};
use lotwatch::domain::{ParkingRecord, ScoredSnapshot};
use lotwatch::infra::Metrics;
use lotwatch::io::gateway::serve;
use lotwatch::io::{GatewayState, JsonStore};
use lotwatch::services::{HubMessage, SnapshotResponse, SubscriberHub};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

struct TestGateway {
    addr: SocketAddr,
    store: Arc<JsonStore>,
    hub: SubscriberHub,
    shutdown: watch::Sender<bool>,
    _dir: TempDir,
}

impl TestGateway {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStore::new(dir.path().join("database.json")));
        let metrics = Arc::new(Metrics::new());
        let hub = SubscriberHub::new(16, metrics.clone());
        let state = Arc::new(GatewayState {
            store: store.clone(),
            hub: hub.clone(),
            metrics,
            site_id: "test".to_string(),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(serve(listener, state, shutdown_rx));

        Self { addr, store, hub, shutdown, _dir: dir }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn get_json(&self, path: &str) -> (reqwest::StatusCode, serde_json::Value) {
        let resp = reqwest::get(self.url(path)).await.unwrap();
        let status = resp.status();
        let body = resp.text().await.unwrap();
        (status, serde_json::from_str(&body).unwrap())
    }
}

fn record(free: u32, occupied: u32, probability: f64) -> ParkingRecord {
    ParkingRecord {
        parking_lot: ScoredSnapshot {
            total_spaces: free + occupied,
            free_spaces: free,
            occupied_spaces: occupied,
            probability,
            timestamp: "2026-03-01T12:00:00Z".to_string(),
        },
        ..Default::default()
    }
}

async fn next_message<S>(stream: &mut S) -> HubMessage
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_pull_with_missing_store_returns_default_and_error() {
    let gw = TestGateway::start().await;

    let resp = reqwest::get(gw.url("/parking-data")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");

    let body: serde_json::Value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
    assert_eq!(body["total_spaces"], 0);
    assert_eq!(body["free_spaces"], 0);
    assert_eq!(body["occupied_spaces"], 0);
    assert_eq!(body["probability"], 0.0);
    assert!(body["error"].as_str().unwrap().contains("does not exist"));
}

#[tokio::test]
async fn test_pull_returns_persisted_snapshot() {
    let gw = TestGateway::start().await;
    gw.store.save(&record(7, 3, 50.0)).unwrap();

    for path in ["/parking-data", "/api/parking"] {
        let (status, body) = gw.get_json(path).await;
        assert_eq!(status, 200);
        assert_eq!(body["free_spaces"], 7);
        assert_eq!(body["occupied_spaces"], 3);
        assert_eq!(body["probability"], 50.0);
        assert!(body.get("error").is_none());
    }
}

#[tokio::test]
async fn test_health_reports_store_reachability() {
    let gw = TestGateway::start().await;

    let (_, body) = gw.get_json("/health").await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["store_reachable"], false);

    gw.store.save(&record(1, 1, 50.0)).unwrap();
    let (_, body) = gw.get_json("/health").await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store_reachable"], true);
}

#[tokio::test]
async fn test_metrics_and_unknown_routes() {
    let gw = TestGateway::start().await;

    let resp = reqwest::get(gw.url("/metrics")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let text = resp.text().await.unwrap();
    assert!(text.contains("lotwatch_cycles_total{site=\"test\"} 0"));

    let resp = reqwest::get(gw.url("/nope")).await.unwrap();
    assert_eq!(resp.status(), 404);

    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, gw.url("/parking-data"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn test_plain_get_on_ws_is_rejected() {
    let gw = TestGateway::start().await;
    let resp = reqwest::get(gw.url("/ws")).await.unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_websocket_snapshot_updates_and_requests() {
    let gw = TestGateway::start().await;
    gw.store.save(&record(7, 3, 50.0)).unwrap();

    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", gw.addr)).await.unwrap();
    let (mut sink, mut stream) = ws.split();

    // initial snapshot first
    match next_message(&mut stream).await {
        HubMessage::Snapshot(s) => assert_eq!(s.snapshot.free_spaces, 7),
        other => panic!("expected snapshot, got {other:?}"),
    }
    assert_eq!(gw.hub.len(), 1);

    // pushed update
    gw.hub.publish(&HubMessage::Update(SnapshotResponse::ok(record(6, 4, 40.0).parking_lot)));
    match next_message(&mut stream).await {
        HubMessage::Update(s) => assert_eq!(s.snapshot.free_spaces, 6),
        other => panic!("expected update, got {other:?}"),
    }

    // on-demand snapshot, both request forms
    gw.store.save(&record(5, 5, 30.0)).unwrap();
    for request in [r#"{"type":"request_data"}"#, "request_data"] {
        sink.send(Message::Text(request.to_string())).await.unwrap();
        match next_message(&mut stream).await {
            HubMessage::Snapshot(s) => assert_eq!(s.snapshot.probability, 30.0),
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    // disconnect deregisters
    sink.send(Message::Close(None)).await.unwrap();
    drop(sink);
    drop(stream);
    for _ in 0..50 {
        if gw.hub.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(gw.hub.is_empty());
}

#[tokio::test]
async fn test_shutdown_closes_subscribers() {
    let gw = TestGateway::start().await;
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", gw.addr)).await.unwrap();
    let (_sink, mut stream) = ws.split();
    assert!(matches!(next_message(&mut stream).await, HubMessage::Snapshot(_)));

    gw.shutdown.send(true).unwrap();

    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = stream.next().await {
            if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
    })
    .await;
    assert!(ended.is_ok());
}
