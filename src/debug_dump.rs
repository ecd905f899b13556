use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{LandCoverError, Result};

/// Keeps a copy of each request's resized input and colored mask on disk.
///
/// Files go to `<dir>/<request id>_original.png` and `<dir>/<request id>_mask.png`,
/// so concurrent requests never overwrite each other.
#[derive(Debug, Clone)]
pub struct DebugDump {
    dir: PathBuf,
}

impl DebugDump {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| LandCoverError::FileSystem {
            path: dir.clone(),
            operation: "create debug directory".to_string(),
            source: e,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes both images. Failures are logged and never reach the caller.
    pub fn write(&self, request_id: Uuid, original: &RgbImage, mask: &RgbImage) {
        for (suffix, image) in [("original", original), ("mask", mask)] {
            let path = self.dir.join(format!("{request_id}_{suffix}.png"));
            match image.save(&path) {
                Ok(()) => debug!("Saved {} for verification", path.display()),
                Err(e) => warn!("Failed to save debug image {}: {}", path.display(), e),
            }
        }
    }
}
