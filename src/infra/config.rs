//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier used as the metrics label
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "lot".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Region catalog JSON produced by the authoring tool
    #[serde(default = "default_catalog_path")]
    pub path: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { path: default_catalog_path() }
    }
}

fn default_catalog_path() -> String {
    "regions.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Directory holding the latest frame per camera (cam_<id>.png|jpg|bmp)
    #[serde(default = "default_frames_dir")]
    pub frames_dir: String,
    /// Bounded wait per camera capture
    #[serde(default = "default_capture_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { frames_dir: default_frames_dir(), timeout_ms: default_capture_timeout_ms() }
    }
}

fn default_frames_dir() -> String {
    "frames".to_string()
}

fn default_capture_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Active-pixel count at or above which a region is occupied
    #[serde(default = "default_threshold")]
    pub threshold: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { threshold: default_threshold() }
    }
}

fn default_threshold() -> u32 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct CycleConfig {
    /// Pause between monitor cycles (0 = paced by capture only)
    #[serde(default = "default_cycle_interval_ms")]
    pub interval_ms: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self { interval_ms: default_cycle_interval_ms() }
    }
}

fn default_cycle_interval_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

fn default_store_path() -> String {
    "database.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Change-detection poll interval
    #[serde(default = "default_broadcast_interval_ms")]
    pub interval_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { interval_ms: default_broadcast_interval_ms() }
    }
}

fn default_broadcast_interval_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Outbound message queue per WebSocket subscriber
    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: default_gateway_bind_address(),
            port: default_gateway_port(),
            subscriber_queue: default_subscriber_queue(),
        }
    }
}

fn default_gateway_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_subscriber_queue() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { format: default_log_format() }
    }
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    catalog_path: String,
    frames_dir: String,
    capture_timeout_ms: u64,
    occupancy_threshold: u32,
    cycle_interval_ms: u64,
    store_path: String,
    broadcast_interval_ms: u64,
    gateway_bind_address: String,
    gateway_port: u16,
    subscriber_queue: usize,
    metrics_interval_secs: u64,
    log_format: LogFormat,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            site_id: toml_config.site.id,
            catalog_path: toml_config.catalog.path,
            frames_dir: toml_config.capture.frames_dir,
            capture_timeout_ms: toml_config.capture.timeout_ms,
            occupancy_threshold: toml_config.classifier.threshold,
            cycle_interval_ms: toml_config.cycle.interval_ms,
            store_path: toml_config.store.path,
            // a zero tokio interval period panics
            broadcast_interval_ms: toml_config.broadcast.interval_ms.max(1),
            gateway_bind_address: toml_config.gateway.bind_address,
            gateway_port: toml_config.gateway.port,
            // a zero-capacity mpsc channel panics
            subscriber_queue: toml_config.gateway.subscriber_queue.max(1),
            metrics_interval_secs: toml_config.metrics.interval_secs,
            log_format: toml_config.logging.format,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from a path, falling back to defaults on any error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_fallback_to_defaults");
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn catalog_path(&self) -> &str {
        &self.catalog_path
    }

    pub fn frames_dir(&self) -> &str {
        &self.frames_dir
    }

    pub fn capture_timeout_ms(&self) -> u64 {
        self.capture_timeout_ms
    }

    pub fn occupancy_threshold(&self) -> u32 {
        self.occupancy_threshold
    }

    pub fn cycle_interval_ms(&self) -> u64 {
        self.cycle_interval_ms
    }

    pub fn store_path(&self) -> &str {
        &self.store_path
    }

    pub fn broadcast_interval_ms(&self) -> u64 {
        self.broadcast_interval_ms
    }

    pub fn gateway_bind_address(&self) -> &str {
        &self.gateway_bind_address
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway_port
    }

    pub fn subscriber_queue(&self) -> usize {
        self.subscriber_queue
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point the store elsewhere
    pub fn with_store_path(mut self, path: &str) -> Self {
        self.store_path = path.to_string();
        self
    }

    /// Builder method for tests to bind the gateway to a specific port
    pub fn with_gateway_port(mut self, port: u16) -> Self {
        self.gateway_port = port;
        self
    }
}
