//! Frame capture
//!
//! A `FrameSource` produces the latest frame for a camera. Every capture in the
//! monitor cycle goes through `capture_with_timeout` so a stalled camera cannot
//! hold up the other cameras.
//!
//! `DirectoryFrameSource` layout: `<dir>/cam_<id>.<png|jpg|jpeg|bmp>`, written by
//! whatever grabs frames from the cameras. The first existing extension wins.

use crate::domain::types::CameraId;
use crate::infra::error::CaptureError;
use image::DynamicImage;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::trace;

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Source of per-camera frames
pub trait FrameSource: Send + Sync + 'static {
    fn capture(
        &self,
        camera: CameraId,
    ) -> impl Future<Output = Result<DynamicImage, CaptureError>> + Send;
}

/// Capture with a bounded wait; exceeding it is a `CaptureError::Timeout`
pub async fn capture_with_timeout<S: FrameSource>(
    source: &S,
    camera: CameraId,
    timeout: Duration,
) -> Result<DynamicImage, CaptureError> {
    match tokio::time::timeout(timeout, source.capture(camera)).await {
        Ok(result) => result,
        Err(_) => Err(CaptureError::Timeout { camera, after_ms: timeout.as_millis() as u64 }),
    }
}

/// Reads the latest frame per camera from image files in a directory
#[derive(Debug, Clone)]
pub struct DirectoryFrameSource {
    dir: PathBuf,
}

impl DirectoryFrameSource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn frame_path(&self, camera: CameraId) -> Option<PathBuf> {
        FRAME_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("cam_{}.{ext}", camera.0)))
            .find(|path| path.is_file())
    }
}

impl FrameSource for DirectoryFrameSource {
    async fn capture(&self, camera: CameraId) -> Result<DynamicImage, CaptureError> {
        let path = self.frame_path(camera).ok_or_else(|| CaptureError::Unavailable {
            camera,
            reason: format!("no frame file in {}", self.dir.display()),
        })?;

        trace!(camera = %camera, path = %path.display(), "frame_read");

        let decoded = tokio::task::spawn_blocking(move || image::open(&path))
            .await
            .map_err(|e| CaptureError::Unavailable { camera, reason: e.to_string() })?;

        decoded.map_err(|e| CaptureError::Unavailable { camera, reason: e.to_string() })
    }
}
