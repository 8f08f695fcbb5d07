//! Region catalog loading
//!
//! The catalog is authored by an external tool and is read-only here. It is a
//! JSON array; each entry is either an object
//! `{"id": 7, "camera": 0, "x1": .., "y1": .., "x2": .., "y2": .., "color": [r, g, b]}`
//! (`id` and `color` optional) or the legacy positional form
//! `[camera, x1, y1, x2, y2, [r, g, b]]`. Entries without an explicit id get
//! their 1-based position.

use crate::domain::types::{CameraId, Rect, Region, RegionId};
use crate::infra::error::CatalogError;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::info;

const DEFAULT_COLOR: [u8; 3] = [255, 0, 255];

fn default_color() -> [u8; 3] {
    DEFAULT_COLOR
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogEntry {
    Positional((u32, u32, u32, u32, u32, [u8; 3])),
    Named {
        #[serde(default)]
        id: Option<u32>,
        camera: u32,
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        #[serde(default = "default_color")]
        color: [u8; 3],
    },
}

/// Ordered, immutable set of camera-scoped regions
#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    regions: Vec<Region>,
    by_camera: BTreeMap<CameraId, Vec<Region>>,
}

impl RegionCatalog {
    /// Build a catalog from already-constructed regions, preserving order
    pub fn new(regions: Vec<Region>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(regions.len());
        let mut by_camera: BTreeMap<CameraId, Vec<Region>> = BTreeMap::new();
        for region in &regions {
            if !seen.insert(region.id) {
                return Err(CatalogError::DuplicateId(region.id));
            }
            by_camera.entry(region.camera).or_default().push(region.clone());
        }
        Ok(Self { regions, by_camera })
    }

    /// Parse catalog JSON text
    pub fn from_json(path: &str, content: &str) -> Result<Self, CatalogError> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(content)
            .map_err(|source| CatalogError::Parse { path: path.to_string(), source })?;

        let regions = entries
            .into_iter()
            .enumerate()
            .map(|(idx, entry)| {
                let position = idx as u32 + 1;
                match entry {
                    CatalogEntry::Named { id, camera, x1, y1, x2, y2, color } => Region {
                        id: RegionId(id.unwrap_or(position)),
                        camera: CameraId(camera),
                        bounds: Rect::from_corners(x1, y1, x2, y2),
                        color,
                    },
                    CatalogEntry::Positional((camera, x1, y1, x2, y2, color)) => Region {
                        id: RegionId(position),
                        camera: CameraId(camera),
                        bounds: Rect::from_corners(x1, y1, x2, y2),
                        color,
                    },
                }
            })
            .collect();

        Self::new(regions)
    }

    /// Load the catalog from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let content = fs::read_to_string(path)
            .map_err(|source| CatalogError::Read { path: shown.clone(), source })?;
        let catalog = Self::from_json(&shown, &content)?;

        info!(
            path = %path.display(),
            regions = %catalog.len(),
            cameras = %catalog.cameras().count(),
            "catalog_loaded"
        );
        Ok(catalog)
    }

    /// Configured capacity of the lot
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Cameras referenced by the catalog, ascending
    pub fn cameras(&self) -> impl Iterator<Item = CameraId> + '_ {
        self.by_camera.keys().copied()
    }

    /// Regions belonging to one camera, in catalog order
    pub fn regions_for(&self, camera: CameraId) -> &[Region] {
        self.by_camera.get(&camera).map(Vec::as_slice).unwrap_or(&[])
    }
}
