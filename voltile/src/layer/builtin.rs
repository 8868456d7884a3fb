//! Ready-made pixel sources.

use super::source::{FetchRequest, PixelSource, SourceError};
use image::{Rgba, RgbaImage};
use std::fmt;
use std::thread;
use std::time::Duration;

/// Uniform colour everywhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantSource {
    color: Rgba<u8>,
}

impl ConstantSource {
    pub fn new(color: Rgba<u8>) -> Self {
        Self { color }
    }

    /// Opaque gray of the given value.
    pub fn gray(value: u8) -> Self {
        Self::new(Rgba([value, value, value, 255]))
    }

    pub fn color(&self) -> Rgba<u8> {
        self.color
    }
}

impl PixelSource for ConstantSource {
    fn fetch(&self, request: &FetchRequest) -> Result<RgbaImage, SourceError> {
        let (w, h) = request.dimensions();
        Ok(RgbaImage::from_pixel(w, h, self.color))
    }
}

/// Deterministic diagonal ramp that shifts with the slice position.
///
/// Pixel `(x, y)` at position `(t, s, c)` has gray value
/// `(x + y + 8·s + 32·t) mod 256`; odd channels are inverted. An optional
/// latency simulates a slow backing store.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientSource {
    latency: Duration,
}

impl GradientSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn value_at(x: i64, y: i64, time: usize, slice: usize, channel: usize) -> u8 {
        let shift = 8 * slice as i64 + 32 * time as i64;
        let v = (x + y + shift).rem_euclid(256) as u8;
        if channel % 2 == 1 {
            255 - v
        } else {
            v
        }
    }
}

impl PixelSource for GradientSource {
    fn fetch(&self, request: &FetchRequest) -> Result<RgbaImage, SourceError> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        let (w, h) = request.dimensions();
        let region = request.region;
        let through = request.through;
        Ok(RgbaImage::from_fn(w, h, |x, y| {
            let v = Self::value_at(
                region.x + x as i64,
                region.y + y as i64,
                through[0],
                through[1],
                through[2],
            );
            Rgba([v, v, v, 255])
        }))
    }
}

type FetchFn = dyn Fn(&FetchRequest) -> Result<RgbaImage, SourceError> + Send + Sync;

/// Source backed by a closure.
pub struct FnSource {
    f: Box<FetchFn>,
}

impl FnSource {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&FetchRequest) -> Result<RgbaImage, SourceError> + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }
}

impl fmt::Debug for FnSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}

impl PixelSource for FnSource {
    fn fetch(&self, request: &FetchRequest) -> Result<RgbaImage, SourceError> {
        (self.f)(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::IntRect;
    use crate::position::SlicePosition;

    fn request(x: i64, y: i64, w: u32, h: u32) -> FetchRequest {
        FetchRequest::new(IntRect::new(x, y, w, h), SlicePosition::new(0, 1, 0))
    }

    #[test]
    fn test_constant_fills_region() {
        let img = ConstantSource::gray(201).fetch(&request(10, 10, 5, 3)).unwrap();
        assert_eq!(img.dimensions(), (5, 3));
        assert!(img.pixels().all(|p| *p == Rgba([201, 201, 201, 255])));
    }

    #[test]
    fn test_gradient_uses_absolute_coordinates() {
        let img = GradientSource::new().fetch(&request(10, 20, 2, 2)).unwrap();
        assert_eq!(img.get_pixel(0, 0)[0], GradientSource::value_at(10, 20, 0, 1, 0));
        assert_eq!(img.get_pixel(1, 1)[0], 10 + 20 + 2 + 8);
    }

    #[test]
    fn test_gradient_channel_inverts() {
        assert_eq!(GradientSource::value_at(0, 0, 0, 0, 1), 255);
        assert_eq!(GradientSource::value_at(0, 0, 0, 0, 2), 0);
    }

    #[test]
    fn test_fn_source_forwards_errors() {
        let source = FnSource::new(|_| Err(SourceError::Unavailable("offline".into())));
        assert_eq!(
            source.fetch(&request(0, 0, 1, 1)),
            Err(SourceError::Unavailable("offline".into()))
        );
    }
}
