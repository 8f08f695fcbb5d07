//! Domain models - region catalog and lot readings
//!
//! - `Region` - a camera-scoped parking slot rectangle
//! - `RegionCatalog` - the ordered, read-only set of regions
//! - `LotSnapshot` / `ScoredSnapshot` - per-cycle occupancy readings
//! - `ParkingRecord` - the persisted document

pub mod catalog;
pub mod types;

// Re-export commonly used types at module level
pub use catalog::RegionCatalog;
pub use types::{CameraId, LotSnapshot, ParkingRecord, Region, RegionId, ScoredSnapshot};
