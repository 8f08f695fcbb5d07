//! IO modules - external system interfaces
//!
//! - `capture` - per-camera frame sources
//! - `store` - the persisted record (atomic JSON file)
//! - `gateway` - HTTP pull, health, metrics and WebSocket push
//! - `prometheus` - Prometheus text exposition

pub mod capture;
pub mod gateway;
pub mod prometheus;
pub mod store;

// Re-export commonly used types
pub use capture::{DirectoryFrameSource, FrameSource};
pub use gateway::{start_gateway, GatewayState};
pub use store::{JsonStore, Loaded};
