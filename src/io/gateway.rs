//! Subscription/query gateway
//!
//! HTTP/1.1 on hyper:
//! - GET /parking-data (alias /api/parking): current snapshot, always a
//!   well-formed body; store failures yield the zero default plus `error`
//! - GET /health: `{"status": "ok"|"degraded", "store_reachable": bool}`
//! - GET /metrics: Prometheus text
//! - GET /ws: WebSocket upgrade; pushes `snapshot` on connect, then hub
//!   `update`s; a `request_data` text frame gets an immediate `snapshot`

use crate::infra::metrics::Metrics;
use crate::io::prometheus::format_prometheus_metrics;
use crate::domain::types::ScoredSnapshot;
use crate::io::store::JsonStore;
use crate::services::hub::{HubMessage, SnapshotResponse, SubscriberHub};
use anyhow::Context;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{
    HeaderValue, CONNECTION, CONTENT_TYPE, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

/// Shared state handed to every connection
pub struct GatewayState {
    pub store: Arc<JsonStore>,
    pub hub: SubscriberHub,
    pub metrics: Arc<Metrics>,
    pub site_id: String,
}

impl GatewayState {
    /// Current snapshot as served to consumers
    pub fn current_snapshot(&self) -> SnapshotResponse {
        let loaded = self.store.load_or_default();
        match loaded.condition {
            None => SnapshotResponse::ok(loaded.record.parking_lot),
            Some(e) => {
                if !matches!(e, crate::infra::error::StoreError::Missing { .. }) {
                    self.metrics.record_store_read_failure();
                }
                debug!(error = %e, kind = e.kind(), "snapshot_default_served");
                SnapshotResponse::degraded(loaded.record.parking_lot, e.to_string())
            }
        }
    }
}

/// Read the current snapshot on the blocking pool
async fn read_snapshot(state: &Arc<GatewayState>) -> SnapshotResponse {
    let state = state.clone();
    tokio::task::spawn_blocking(move || state.current_snapshot())
        .await
        .unwrap_or_else(|e| SnapshotResponse::degraded(ScoredSnapshot::zero(), e.to_string()))
}

#[derive(Deserialize)]
struct ClientRequest {
    #[serde(rename = "type")]
    kind: String,
}

/// Whether an incoming text frame asks for a fresh snapshot
fn is_data_request(text: &str) -> bool {
    let text = text.trim();
    if text == "request_data" {
        return true;
    }
    serde_json::from_str::<ClientRequest>(text).is_ok_and(|req| req.kind == "request_data")
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type")
        .body(Full::new(Bytes::new()))
        .expect("static response should not fail")
}

fn header_contains(req: &Request<Incoming>, name: hyper::header::HeaderName, token: &str) -> bool {
    req.headers()
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

async fn handle_health(state: &GatewayState) -> Response<Full<Bytes>> {
    let store = state.store.clone();
    let reachable =
        tokio::task::spawn_blocking(move || store.load().is_ok()).await.unwrap_or(false);
    let body = serde_json::json!({
        "status": if reachable { "ok" } else { "degraded" },
        "store_reachable": reachable,
    });
    json_response(StatusCode::OK, body.to_string())
}

fn handle_upgrade(
    mut req: Request<Incoming>,
    state: Arc<GatewayState>,
    shutdown: watch::Receiver<bool>,
) -> Response<Full<Bytes>> {
    if !header_contains(&req, UPGRADE, "websocket") || !header_contains(&req, CONNECTION, "upgrade")
    {
        return text_response(StatusCode::BAD_REQUEST, "Expected WebSocket upgrade");
    }
    let accept = match req.headers().get(SEC_WEBSOCKET_KEY) {
        Some(key) => derive_accept_key(key.as_bytes()),
        None => return text_response(StatusCode::BAD_REQUEST, "Missing Sec-WebSocket-Key"),
    };

    tokio::spawn(async move {
        match hyper::upgrade::on(&mut req).await {
            Ok(upgraded) => {
                let ws =
                    WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None)
                        .await;
                run_session(ws, state, shutdown).await;
            }
            Err(e) => warn!(error = %e, "websocket_upgrade_failed"),
        }
    });

    let mut response = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(CONNECTION, "Upgrade")
        .header(UPGRADE, "websocket")
        .body(Full::new(Bytes::new()))
        .expect("static response should not fail");
    if let Ok(value) = HeaderValue::from_str(&accept) {
        response.headers_mut().insert(SEC_WEBSOCKET_ACCEPT, value);
    }
    response
}

/// Drive one WebSocket subscriber until it leaves or the gateway shuts down
async fn run_session<S>(
    ws: WebSocketStream<S>,
    state: Arc<GatewayState>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    // register reads the store while holding the hub lock
    let registering = state.clone();
    let registered = tokio::task::spawn_blocking(move || {
        registering.hub.register(|| registering.current_snapshot())
    })
    .await;
    let (id, mut rx) = match registered {
        Ok(registered) => registered,
        Err(e) => {
            warn!(error = %e, "websocket_register_failed");
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                // None: the hub dropped this subscriber for lagging
                let Some(message) = outbound else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                if sink.send(Message::Text(message.to_json())).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if is_data_request(&text) {
                            let reply = HubMessage::Snapshot(read_snapshot(&state).await);
                            if sink.send(Message::Text(reply.to_json())).await.is_err() {
                                break;
                            }
                        } else {
                            debug!(subscriber = %id, "websocket_message_ignored");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(subscriber = %id, error = %e, "websocket_error");
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    debug!(subscriber = %id, "websocket_disconnected");
    state.hub.deregister(id);
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<GatewayState>,
    shutdown: watch::Receiver<bool>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = match (&method, path.as_str()) {
        (&Method::GET, "/parking-data") | (&Method::GET, "/api/parking") => {
            let body = serde_json::to_string(&read_snapshot(&state).await).unwrap_or_default();
            json_response(StatusCode::OK, body)
        }
        (&Method::GET, "/health") => handle_health(&state).await,
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&state.metrics, &state.site_id);
            Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail")
        }
        (&Method::GET, "/ws") => handle_upgrade(req, state, shutdown),
        (&Method::OPTIONS, "/parking-data" | "/api/parking" | "/health") => preflight_response(),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };
    Ok(response)
}

/// Accept connections on `listener` until shutdown
pub async fn serve(
    listener: TcpListener,
    state: Arc<GatewayState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();
                        let conn_shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                handle_request(req, state.clone(), conn_shutdown.clone())
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .with_upgrades()
                                .await
                            {
                                debug!(error = %e, "gateway_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "gateway_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("gateway_shutdown");
                    return;
                }
            }
        }
    }
}

/// Bind the configured address and serve until shutdown
pub async fn start_gateway(
    bind_address: &str,
    port: u16,
    state: Arc<GatewayState>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{bind_address}:{port}")
        .parse()
        .with_context(|| format!("Invalid gateway address {bind_address}:{port}"))?;
    let listener =
        TcpListener::bind(addr).await.with_context(|| format!("Failed to bind gateway on {addr}"))?;

    info!(addr = %addr, site = %state.site_id, "gateway_started");
    serve(listener, state, shutdown).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_request_forms() {
        assert!(is_data_request("request_data"));
        assert!(is_data_request("  request_data\n"));
        assert!(is_data_request(r#"{"type":"request_data"}"#));
        assert!(is_data_request(r#"{"type": "request_data", "extra": 1}"#));
        assert!(!is_data_request(r#"{"type":"ping"}"#));
        assert!(!is_data_request("hello"));
    }
}
