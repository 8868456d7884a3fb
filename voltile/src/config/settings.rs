//! The settings struct.

use super::defaults::*;
use crate::provider::ProviderConfig;
use image::Rgba;
use std::time::Duration;

/// Tunables of a slice view and its tile cache.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Tile edge length in display pixels.
    pub tile_size: u32,
    /// Maximum number of cached tiles (soft while every tile is on screen).
    pub cache_size: usize,
    /// Slices warmed ahead along the direction of travel; 0 disables.
    pub preemptive_fetch_number: usize,
    pub worker_threads: usize,
    /// How long a tile must stay incomplete before its progress pie shows.
    pub progress_debounce: Duration,
    pub show_tile_progress: bool,
    /// Dashed border around every tile.
    pub show_tile_outlines: bool,
    pub tile_background: Rgba<u8>,
    pub scene_background: Rgba<u8>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            cache_size: DEFAULT_CACHE_SIZE,
            preemptive_fetch_number: DEFAULT_PREEMPTIVE_FETCH_NUMBER,
            worker_threads: default_worker_threads(),
            progress_debounce: DEFAULT_PROGRESS_DEBOUNCE,
            show_tile_progress: true,
            show_tile_outlines: false,
            tile_background: Rgba(DEFAULT_TILE_BACKGROUND),
            scene_background: Rgba(DEFAULT_SCENE_BACKGROUND),
        }
    }
}

impl RenderConfig {
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_preemptive_fetch_number(mut self, slices: usize) -> Self {
        self.preemptive_fetch_number = slices;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_progress_debounce(mut self, debounce: Duration) -> Self {
        self.progress_debounce = debounce;
        self
    }

    pub fn with_show_tile_progress(mut self, show: bool) -> Self {
        self.show_tile_progress = show;
        self
    }

    pub fn with_show_tile_outlines(mut self, show: bool) -> Self {
        self.show_tile_outlines = show;
        self
    }

    pub fn with_tile_background(mut self, color: Rgba<u8>) -> Self {
        self.tile_background = color;
        self
    }

    pub fn with_scene_background(mut self, color: Rgba<u8>) -> Self {
        self.scene_background = color;
        self
    }

    /// The subset a [`TileProvider`](crate::provider::TileProvider) needs.
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig::default()
            .with_cache_size(self.cache_size)
            .with_worker_threads(self.worker_threads)
            .with_tile_background(self.tile_background)
    }
}
