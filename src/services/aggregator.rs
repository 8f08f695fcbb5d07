//! Lot-wide snapshot aggregation
//!
//! Sums per-camera counts into one `LotSnapshot`. The total is the configured
//! capacity; cameras that produced no frame keep their regions in the total but
//! contribute nothing to free/occupied.

use crate::domain::types::{now_rfc3339, LotSnapshot};
use crate::services::classifier::CameraCounts;
use tracing::warn;

/// What one camera contributed this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraOutcome {
    Classified { counts: CameraCounts, discarded: u32 },
    Unavailable,
}

/// Aggregated snapshot plus the conditions seen while building it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub snapshot: LotSnapshot,
    /// free + occupied exceeded capacity and was clamped
    pub anomaly: bool,
    pub cameras_unavailable: u32,
    pub regions_discarded: u32,
}

/// Combine camera outcomes with the catalog capacity, stamped with the current time
pub fn aggregate<I>(total_spaces: u32, outcomes: I) -> Aggregate
where
    I: IntoIterator<Item = CameraOutcome>,
{
    aggregate_at(total_spaces, outcomes, now_rfc3339())
}

/// Same as [`aggregate`] with an explicit timestamp
pub fn aggregate_at<I>(total_spaces: u32, outcomes: I, timestamp: String) -> Aggregate
where
    I: IntoIterator<Item = CameraOutcome>,
{
    let mut free: u32 = 0;
    let mut occupied: u32 = 0;
    let mut cameras_unavailable = 0;
    let mut regions_discarded = 0;

    for outcome in outcomes {
        match outcome {
            CameraOutcome::Classified { counts, discarded } => {
                free = free.saturating_add(counts.free);
                occupied = occupied.saturating_add(counts.occupied);
                regions_discarded += discarded;
            }
            CameraOutcome::Unavailable => cameras_unavailable += 1,
        }
    }

    let mut anomaly = false;
    if free.saturating_add(occupied) > total_spaces {
        anomaly = true;
        warn!(
            total = %total_spaces,
            free = %free,
            occupied = %occupied,
            "occupancy_over_capacity"
        );
        if free > total_spaces {
            free = total_spaces;
            occupied = 0;
        } else {
            occupied = total_spaces - free;
        }
    }

    Aggregate {
        snapshot: LotSnapshot {
            total_spaces,
            free_spaces: free,
            occupied_spaces: occupied,
            timestamp,
        },
        anomaly,
        cameras_unavailable,
        regions_discarded,
    }
}
