//! Shared types for the lot occupancy pipeline

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Newtype wrapper for camera IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct CameraId(pub u32);

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for region IDs; stable across catalog reloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct RegionId(pub u32);

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ID-{}", self.0)
    }
}

/// Axis-aligned rectangle in frame pixel coordinates.
///
/// Half-open: covers columns `x1..x2` and rows `y1..y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Rect {
    /// Build a rectangle from two arbitrary corners
    pub fn from_corners(xa: u32, ya: u32, xb: u32, yb: u32) -> Self {
        Self { x1: xa.min(xb), y1: ya.min(yb), x2: xa.max(xb), y2: ya.max(yb) }
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    /// True if the rectangle has area and lies entirely inside a `width x height` frame
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width() > 0 && self.height() > 0 && self.x2 <= width && self.y2 <= height
    }
}

/// A configured parking slot on one camera's frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub id: RegionId,
    pub camera: CameraId,
    pub bounds: Rect,
    /// Display color for overlays (RGB); carried through, never interpreted
    pub color: [u8; 3],
}

/// Classification of a single region for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceState {
    Free,
    Occupied,
}

impl SpaceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpaceState::Free => "free",
            SpaceState::Occupied => "occupied",
        }
    }
}

/// Aggregated occupancy counts for one monitoring cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotSnapshot {
    pub total_spaces: u32,
    pub free_spaces: u32,
    pub occupied_spaces: u32,
    pub timestamp: String,
}

/// The persisted `parking_lot` object: a snapshot plus its availability score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSnapshot {
    pub total_spaces: u32,
    pub free_spaces: u32,
    pub occupied_spaces: u32,
    pub probability: f64,
    #[serde(default)]
    pub timestamp: String,
}

impl ScoredSnapshot {
    pub fn new(snapshot: LotSnapshot, probability: f64) -> Self {
        Self {
            total_spaces: snapshot.total_spaces,
            free_spaces: snapshot.free_spaces,
            occupied_spaces: snapshot.occupied_spaces,
            probability,
            timestamp: snapshot.timestamp,
        }
    }

    /// Zero-valued default served when no usable record exists
    pub fn zero() -> Self {
        Self {
            total_spaces: 0,
            free_spaces: 0,
            occupied_spaces: 0,
            probability: 0.0,
            timestamp: String::new(),
        }
    }

    /// Compare the fields consumers care about, ignoring the timestamp
    pub fn same_reading(&self, other: &ScoredSnapshot) -> bool {
        self.free_spaces == other.free_spaces
            && self.occupied_spaces == other.occupied_spaces
            && self.probability == other.probability
            && self.total_spaces == other.total_spaces
    }
}

impl Default for ScoredSnapshot {
    fn default() -> Self {
        Self::zero()
    }
}

/// The whole persisted document.
///
/// Ledger entries are opaque: only their counts feed scoring, and they are
/// written back verbatim.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParkingRecord {
    pub parking_lot: ScoredSnapshot,
    #[serde(default)]
    pub bookings: Vec<serde_json::Value>,
    #[serde(default)]
    pub website_visits: Vec<serde_json::Value>,
}

impl ParkingRecord {
    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub fn visit_count(&self) -> usize {
        self.website_visits.len()
    }
}

/// Current UTC time as an RFC 3339 string
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_from_corners_normalises() {
        let r = Rect::from_corners(110, 70, 10, 20);
        assert_eq!(r, Rect { x1: 10, y1: 20, x2: 110, y2: 70 });
        assert_eq!(r.width(), 100);
        assert_eq!(r.height(), 50);
    }

    #[test]
    fn test_rect_fits_within() {
        let r = Rect { x1: 0, y1: 0, x2: 640, y2: 480 };
        assert!(r.fits_within(640, 480));
        assert!(!r.fits_within(639, 480));

        let empty = Rect { x1: 5, y1: 5, x2: 5, y2: 10 };
        assert!(!empty.fits_within(640, 480));
    }

    #[test]
    fn test_region_id_display() {
        assert_eq!(RegionId(3).to_string(), "ID-3");
    }

    #[test]
    fn test_same_reading_ignores_timestamp() {
        let a = ScoredSnapshot {
            total_spaces: 10,
            free_spaces: 4,
            occupied_spaces: 6,
            probability: 40.0,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        };
        let mut b = a.clone();
        b.timestamp = "2026-01-01T00:00:01Z".to_string();
        assert!(a.same_reading(&b));

        b.probability = 39.99;
        assert!(!a.same_reading(&b));
    }

    #[test]
    fn test_legacy_record_without_timestamp_or_ledgers() {
        let json = r#"{"parking_lot": {"total_spaces": 4, "free_spaces": 1, "occupied_spaces": 3, "probability": 25.0}}"#;
        let record: ParkingRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.parking_lot.total_spaces, 4);
        assert_eq!(record.parking_lot.timestamp, "");
        assert_eq!(record.booking_count(), 0);
        assert_eq!(record.visit_count(), 0);
    }
}
