//! Public value types of the tile provider.

use crate::geometry::IntRect;
use crate::layer::SourceError;
use crate::position::SlicePosition;
use crate::tiling::TileId;
use image::{Rgba, RgbaImage};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default maximum number of cache slots.
pub const DEFAULT_CACHE_SIZE: usize = 100;

/// Cache key: one tile of one slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub through: SlicePosition,
    pub tile: TileId,
}

impl TileKey {
    pub fn new(through: SlicePosition, tile: TileId) -> Self {
        Self { through, tile }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.through, self.tile)
    }
}

/// Freshness of one cached tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileState {
    /// No slot.
    Absent,
    /// Layer fetches or the composite are in flight.
    Requested,
    /// Every visible layer is in and the display image is current.
    Ready,
    /// Invalidated; nothing in flight until the tile is touched again.
    Stale,
    /// A layer source failed for the current generation and nothing else is
    /// pending.
    Failed,
}

impl fmt::Display for TileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TileState::Absent => "absent",
            TileState::Requested => "requested",
            TileState::Ready => "ready",
            TileState::Stale => "stale",
            TileState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What the render path gets for one tile.
#[derive(Debug, Clone)]
pub struct TileSnapshot {
    pub id: TileId,
    pub display_rect: IntRect,
    /// Last published image; may be older than the current data.
    pub image: Option<Arc<RgbaImage>>,
    /// Fraction of visible layers whose current pixels have arrived.
    pub progress: f32,
    pub state: TileState,
    /// First layer failure of the current generation, if any.
    pub error: Option<SourceError>,
    pub data_version: u64,
    pub image_version: u64,
}

impl TileSnapshot {
    pub fn is_complete(&self) -> bool {
        self.progress >= 1.0
    }
}

/// Construction parameters of a [`TileProvider`](super::TileProvider).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderConfig {
    pub cache_size: usize,
    pub worker_threads: usize,
    /// Opaque colour under the bottom layer of every tile.
    pub tile_background: Rgba<u8>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            tile_background: Rgba([255, 255, 255, 255]),
        }
    }
}

impl ProviderConfig {
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_tile_background(mut self, color: Rgba<u8>) -> Self {
        self.tile_background = color;
        self
    }
}

/// Counters describing provider activity since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderStats {
    pub fetches_issued: u64,
    pub fetches_completed: u64,
    pub fetches_failed: u64,
    /// Completions dropped because of a generation change, eviction or
    /// shutdown.
    pub stale_discarded: u64,
    pub composites: u64,
    pub evictions: u64,
    /// Insertions that had to exceed `cache_size` because every slot was on
    /// screen.
    pub soft_overflows: u64,
}

impl fmt::Display for ProviderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetches {} issued / {} done / {} failed, {} stale, {} composites, {} evicted, {} overflows",
            self.fetches_issued,
            self.fetches_completed,
            self.fetches_failed,
            self.stale_discarded,
            self.composites,
            self.evictions,
            self.soft_overflows
        )
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub fetches_issued: AtomicU64,
    pub fetches_completed: AtomicU64,
    pub fetches_failed: AtomicU64,
    pub stale_discarded: AtomicU64,
    pub composites: AtomicU64,
    pub evictions: AtomicU64,
    pub soft_overflows: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProviderStats {
        ProviderStats {
            fetches_issued: self.fetches_issued.load(Ordering::Relaxed),
            fetches_completed: self.fetches_completed.load(Ordering::Relaxed),
            fetches_failed: self.fetches_failed.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            composites: self.composites.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            soft_overflows: self.soft_overflows.load(Ordering::Relaxed),
        }
    }
}
