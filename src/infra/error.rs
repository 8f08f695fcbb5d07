//! Condition taxonomy for the occupancy pipeline
//!
//! Every runtime condition here is recovered by the component that detects it;
//! none of them terminates the monitor cycle or the broadcaster. Only
//! `CatalogError` is fatal, and only at startup.

use crate::domain::types::{CameraId, RegionId};
use thiserror::Error;

/// A camera produced no frame this cycle
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera {camera} unavailable: {reason}")]
    Unavailable { camera: CameraId, reason: String },

    #[error("camera {camera} produced no frame within {after_ms} ms")]
    Timeout { camera: CameraId, after_ms: u64 },
}

impl CaptureError {
    pub fn camera(&self) -> CameraId {
        match self {
            CaptureError::Unavailable { camera, .. } | CaptureError::Timeout { camera, .. } => {
                *camera
            }
        }
    }
}

/// A region's rectangle does not fit inside the evidence frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("region {region} on camera {camera} does not fit the {width}x{height} frame")]
pub struct ClassificationBoundsError {
    pub region: RegionId,
    pub camera: CameraId,
    pub width: u32,
    pub height: u32,
}

/// Persistent store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store record {path} does not exist")]
    Missing { path: String },

    #[error("store record {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store I/O failure on {path}: {source}")]
    Unavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Short machine-readable label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Missing { .. } => "missing",
            StoreError::Corrupt { .. } => "corrupt",
            StoreError::Unavailable { .. } => "unavailable",
        }
    }
}

/// Region catalog could not be loaded
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read region catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse region catalog {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate region id {0} in catalog")]
    DuplicateId(RegionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_kind() {
        let missing = StoreError::Missing { path: "db.json".to_string() };
        assert_eq!(missing.kind(), "missing");

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let unavailable = StoreError::Unavailable { path: "db.json".to_string(), source: io };
        assert_eq!(unavailable.kind(), "unavailable");
        assert!(unavailable.to_string().contains("denied"));
    }

    #[test]
    fn test_capture_error_camera() {
        let err = CaptureError::Timeout { camera: CameraId(5), after_ms: 2000 };
        assert_eq!(err.camera(), CameraId(5));
        assert_eq!(err.to_string(), "camera 5 produced no frame within 2000 ms");
    }
}
