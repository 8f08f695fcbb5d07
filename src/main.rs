//! lotwatch - parking lot occupancy monitor
//!
//! Classifies camera frames into free/occupied spaces, scores the chance of
//! finding a space, persists the latest reading and pushes changes to
//! WebSocket subscribers.
//!
//! Module structure:
//! - `domain/` - Regions, catalog, readings
//! - `io/` - Frame capture, store, HTTP/WebSocket gateway
//! - `services/` - Classifier, aggregator, scoring, monitor cycle, broadcaster
//! - `infra/` - Config, logging, metrics, errors

use anyhow::Context;
use clap::Parser;
use lotwatch::domain::RegionCatalog;
use lotwatch::infra::{logging, Config, LogFormat, Metrics};
use lotwatch::io::{start_gateway, DirectoryFrameSource, GatewayState, JsonStore};
use lotwatch::services::{Broadcaster, MonitorCycle, SubscriberHub};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Parking lot occupancy monitor
#[derive(Parser, Debug)]
#[command(name = "lotwatch", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config_path = Config::resolve_config_path(args.config.as_deref());

    // The log format lives in the config, so load first and report failures after
    let loaded = Config::from_file(&config_path);
    let format = loaded.as_ref().map(Config::log_format).unwrap_or(LogFormat::Text);
    logging::init(format);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %format!("{e:#}"), path = %config_path, "config_fallback_to_defaults");
            Config::default()
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), git_hash = env!("GIT_HASH"), "lotwatch starting");
    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        catalog = %config.catalog_path(),
        frames_dir = %config.frames_dir(),
        store = %config.store_path(),
        threshold = %config.occupancy_threshold(),
        capture_timeout_ms = %config.capture_timeout_ms(),
        cycle_interval_ms = %config.cycle_interval_ms(),
        broadcast_interval_ms = %config.broadcast_interval_ms(),
        gateway = %format!("{}:{}", config.gateway_bind_address(), config.gateway_port()),
        "config_loaded"
    );

    let catalog = RegionCatalog::from_file(config.catalog_path())
        .with_context(|| format!("Failed to load region catalog {}", config.catalog_path()))?;
    if catalog.is_empty() {
        warn!(path = %config.catalog_path(), "catalog_empty");
    }
    let catalog = Arc::new(catalog);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create shared components
    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(JsonStore::new(config.store_path()));
    let hub = SubscriberHub::new(config.subscriber_queue(), metrics.clone());
    let source = Arc::new(DirectoryFrameSource::new(config.frames_dir()));

    // Start monitor cycle (sole store writer)
    let cycle = MonitorCycle::new(catalog, source, store.clone(), metrics.clone())
        .with_threshold(config.occupancy_threshold())
        .with_capture_timeout(Duration::from_millis(config.capture_timeout_ms()))
        .with_interval(Duration::from_millis(config.cycle_interval_ms()));
    let cycle_handle = tokio::spawn(cycle.run(shutdown_rx.clone()));

    // Start change-detection broadcaster
    let broadcaster = Broadcaster::new(
        store.clone(),
        hub.clone(),
        metrics.clone(),
        Duration::from_millis(config.broadcast_interval_ms()),
    );
    tokio::spawn(broadcaster.run(shutdown_rx.clone()));

    // Start gateway
    let state = Arc::new(GatewayState {
        store,
        hub,
        metrics: metrics.clone(),
        site_id: config.site_id().to_string(),
    });
    let bind_address = config.gateway_bind_address().to_string();
    let port = config.gateway_port();
    let gateway_shutdown = shutdown_rx.clone();
    let gateway_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = start_gateway(&bind_address, port, state, gateway_shutdown).await {
            error!(error = %format!("{e:#}"), "gateway_error");
            let _ = gateway_tx.send(true);
        }
    });

    // Start metrics reporter
    if config.metrics_interval_secs() > 0 {
        let reporter_metrics = metrics.clone();
        let mut reporter_shutdown = shutdown_rx.clone();
        let period = Duration::from_secs(config.metrics_interval_secs());
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => reporter_metrics.report().log(),
                    _ = reporter_shutdown.changed() => {
                        if *reporter_shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    // Handle shutdown on Ctrl+C / SIGTERM
    let signal_tx = shutdown_tx;
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown_signal_received");
        let _ = signal_tx.send(true);
    });

    // Wait for the monitor cycle so an in-flight save completes
    if let Err(e) = cycle_handle.await {
        error!(error = %e, "monitor_cycle_task_failed");
    }

    info!("lotwatch shutdown complete");
    Ok(())
}
