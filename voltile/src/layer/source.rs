//! The pixel producer interface.

use crate::geometry::IntRect;
use crate::position::SlicePosition;
use image::RgbaImage;
use thiserror::Error;

/// Errors a pixel source may report for one fetch.
///
/// These never cross the worker boundary as panics or `Result`s; the tile
/// provider stores them on the layer slot and reports them per tile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The backing data could not be produced.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The source returned an image that does not match the requested region.
    #[error("source returned {actual:?} pixels for a {expected:?} region")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// The source panicked while producing pixels.
    #[error("source panicked: {0}")]
    Panicked(String),
}

/// One request for pixel data: a data-space region of a 2D slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    /// Region in data coordinates, already clipped to the data shape.
    pub region: IntRect,
    /// Position along the axes the slice does not display.
    pub through: SlicePosition,
}

impl FetchRequest {
    pub fn new(region: IntRect, through: SlicePosition) -> Self {
        Self { region, through }
    }

    /// Expected `(width, height)` of the returned image.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.region.width, self.region.height)
    }
}

/// Producer of pixels for one layer.
///
/// Implementations may block for as long as they need; they are only ever
/// called from worker threads. The returned image must be exactly
/// `request.region.width × request.region.height` pixels.
pub trait PixelSource: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> Result<RgbaImage, SourceError>;
}

/// Check a fetched image against the request it answers.
pub(crate) fn check_dimensions(
    request: &FetchRequest,
    image: &RgbaImage,
) -> Result<(), SourceError> {
    let expected = request.dimensions();
    let actual = image.dimensions();
    if expected != actual {
        return Err(SourceError::SizeMismatch { expected, actual });
    }
    Ok(())
}
