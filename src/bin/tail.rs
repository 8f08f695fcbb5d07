//! lotwatch-tail - follow a running lotwatch over its WebSocket feed
//!
//! Logs the initial snapshot and every update; optionally asks for a fresh
//! snapshot on an interval.
//!
//! Usage:
//!   cargo run --bin lotwatch-tail -- --url ws://127.0.0.1:8080/ws
//!   cargo run --bin lotwatch-tail -- --url ws://lot-a:8080/ws --request-interval-ms 5000

use clap::Parser;
use futures::{SinkExt, StreamExt};
use lotwatch::infra::{logging, LogFormat};
use lotwatch::services::{HubMessage, SnapshotResponse};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

const REQUEST_DATA: &str = r#"{"type":"request_data"}"#;

#[derive(Parser, Debug)]
#[command(name = "lotwatch-tail")]
#[command(about = "Follow lotwatch occupancy updates over WebSocket")]
struct Args {
    /// WebSocket endpoint of the gateway
    #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    /// Request a fresh snapshot every N ms (0 = never)
    #[arg(long, default_value_t = 0)]
    request_interval_ms: u64,

    /// Emit JSON log lines
    #[arg(long)]
    json: bool,
}

fn log_reading(kind: &str, reading: &SnapshotResponse) {
    let s = &reading.snapshot;
    match &reading.error {
        Some(err) => warn!(
            kind = kind,
            free = %s.free_spaces,
            occupied = %s.occupied_spaces,
            total = %s.total_spaces,
            error = %err,
            "reading_degraded"
        ),
        None => info!(
            kind = kind,
            free = %s.free_spaces,
            occupied = %s.occupied_spaces,
            total = %s.total_spaces,
            probability = format!("{:.2}", s.probability),
            timestamp = %s.timestamp,
            "reading"
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(if args.json { LogFormat::Json } else { LogFormat::Text });

    let (ws, _response) = connect_async(args.url.as_str()).await?;
    info!(url = %args.url, "connected");

    let (mut sink, mut stream) = ws.split();

    let request_period = (args.request_interval_ms > 0)
        .then(|| Duration::from_millis(args.request_interval_ms));
    let mut ticker = tokio::time::interval(request_period.unwrap_or(Duration::from_secs(3600)));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick(), if request_period.is_some() => {
                sink.send(Message::Text(REQUEST_DATA.to_string())).await?;
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<HubMessage>(&text) {
                        Ok(HubMessage::Snapshot(reading)) => log_reading("snapshot", &reading),
                        Ok(HubMessage::Update(reading)) => log_reading("update", &reading),
                        Err(e) => warn!(error = %e, "unrecognised_message"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("connection_closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "connection_error");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    Ok(())
}
