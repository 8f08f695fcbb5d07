//! Per-camera occupancy classification
//!
//! For each region the evidence magnitude is the number of active (non-zero)
//! pixels inside its rectangle in the evidence image. A region is free when the
//! magnitude is below the threshold, occupied otherwise.
//!
//! Regions that do not fit the frame are discarded for this cycle only; the
//! remaining regions are still classified.

use crate::domain::types::{CameraId, Rect, Region, RegionId, SpaceState};
use crate::infra::error::ClassificationBoundsError;
use image::GrayImage;
use tracing::{trace, warn};

/// Default active-pixel threshold separating free from occupied
pub const DEFAULT_THRESHOLD: u32 = 300;

/// Verdict for one region in one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionVerdict {
    pub region: RegionId,
    pub magnitude: u32,
    pub state: SpaceState,
}

/// Free/occupied counts contributed by one camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CameraCounts {
    pub free: u32,
    pub occupied: u32,
}

/// Classification result for one camera frame
#[derive(Debug, Clone, Default)]
pub struct CameraClassification {
    pub verdicts: Vec<RegionVerdict>,
    pub discarded: Vec<ClassificationBoundsError>,
}

impl CameraClassification {
    pub fn counts(&self) -> CameraCounts {
        self.verdicts.iter().fold(CameraCounts::default(), |mut acc, v| {
            match v.state {
                SpaceState::Free => acc.free += 1,
                SpaceState::Occupied => acc.occupied += 1,
            }
            acc
        })
    }
}

/// Count active pixels inside `rect`. Caller guarantees the rect fits.
fn evidence_magnitude(evidence: &GrayImage, rect: &Rect) -> u32 {
    let width = evidence.width() as usize;
    let raw = evidence.as_raw();
    (rect.y1..rect.y2)
        .map(|y| {
            let start = y as usize * width + rect.x1 as usize;
            let end = y as usize * width + rect.x2 as usize;
            raw[start..end].iter().filter(|&&px| px != 0).count() as u32
        })
        .sum()
}

/// Threshold classifier over evidence images
#[derive(Debug, Clone)]
pub struct OccupancyClassifier {
    threshold: u32,
}

impl OccupancyClassifier {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Classify `camera`'s regions against its evidence image
    ///
    /// Regions belonging to other cameras are ignored.
    pub fn classify(
        &self,
        camera: CameraId,
        evidence: &GrayImage,
        regions: &[Region],
    ) -> CameraClassification {
        let (width, height) = evidence.dimensions();
        let mut result = CameraClassification::default();

        for region in regions.iter().filter(|r| r.camera == camera) {
            if !region.bounds.fits_within(width, height) {
                let err = ClassificationBoundsError { region: region.id, camera, width, height };
                warn!(
                    region = %region.id,
                    camera = %camera,
                    x1 = region.bounds.x1,
                    y1 = region.bounds.y1,
                    x2 = region.bounds.x2,
                    y2 = region.bounds.y2,
                    frame_width = width,
                    frame_height = height,
                    "region_outside_frame"
                );
                result.discarded.push(err);
                continue;
            }

            let magnitude = evidence_magnitude(evidence, &region.bounds);
            let state =
                if magnitude < self.threshold { SpaceState::Free } else { SpaceState::Occupied };

            trace!(
                region = %region.id,
                camera = %camera,
                magnitude = magnitude,
                state = state.as_str(),
                "region_classified"
            );

            result.verdicts.push(RegionVerdict { region: region.id, magnitude, state });
        }

        result
    }
}

impl Default for OccupancyClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}
