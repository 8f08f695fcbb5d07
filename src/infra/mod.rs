//! Infrastructure - configuration, metrics, and the error taxonomy
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `metrics` - Lock-free metrics collection
//! - `error` - Recoverable pipeline conditions
//! - `logging` - tracing-subscriber setup

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

// Re-export commonly used types
pub use config::{Config, LogFormat};
pub use error::{CaptureError, CatalogError, ClassificationBoundsError, StoreError};
pub use metrics::Metrics;
