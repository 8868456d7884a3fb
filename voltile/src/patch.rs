//! Versioned display image of a single tile.

use image::RgbaImage;
use std::sync::Arc;

/// A tile's published image together with its freshness counters.
///
/// `data_version` moves every time something feeding the tile changes (new
/// layer pixels, invalidation, layer visibility or opacity). `image_version`
/// records which data version the published image was built from, so the
/// patch is current exactly when both agree.
///
/// The image is swapped as a whole `Arc`; readers holding the previous one
/// keep a complete image.
#[derive(Debug, Clone, Default)]
pub struct TilePatch {
    image: Option<Arc<RgbaImage>>,
    data_version: u64,
    image_version: u64,
}

impl TilePatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the inputs of this tile changed. Returns the new version.
    pub fn bump_data(&mut self) -> u64 {
        self.data_version += 1;
        self.data_version
    }

    /// Publish an image built from `version`.
    ///
    /// Refused (returns `false`) when the data moved on while the image was
    /// being built; the caller's work is then stale.
    pub fn publish(&mut self, image: Arc<RgbaImage>, version: u64) -> bool {
        if version != self.data_version {
            return false;
        }
        self.image = Some(image);
        self.image_version = version;
        true
    }

    pub fn is_current(&self) -> bool {
        self.image.is_some() && self.image_version == self.data_version
    }

    /// Last published image, possibly older than the current data.
    pub fn image(&self) -> Option<&Arc<RgbaImage>> {
        self.image.as_ref()
    }

    pub fn data_version(&self) -> u64 {
        self.data_version
    }

    pub fn image_version(&self) -> u64 {
        self.image_version
    }
}
