//! Services - the occupancy pipeline
//!
//! - `evidence` - frame to binary evidence image
//! - `classifier` - per-region free/occupied verdicts
//! - `aggregator` - lot-wide snapshot from per-camera counts
//! - `scoring` - availability probability
//! - `cycle` - the monitor loop tying the above to the store
//! - `hub` - live subscriber registry
//! - `broadcaster` - change detection and fan-out

pub mod aggregator;
pub mod broadcaster;
pub mod classifier;
pub mod cycle;
pub mod evidence;
pub mod hub;
pub mod scoring;

// Re-export commonly used types
pub use broadcaster::Broadcaster;
pub use cycle::MonitorCycle;
pub use hub::{HubMessage, SnapshotResponse, SubscriberHub};
