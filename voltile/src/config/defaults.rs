//! Default values and limits of the render settings.

use std::time::Duration;

pub const DEFAULT_TILE_SIZE: u32 = crate::tiling::DEFAULT_TILE_SIZE;
pub const MIN_TILE_SIZE: u32 = 16;
pub const MAX_TILE_SIZE: u32 = 4096;

pub const DEFAULT_CACHE_SIZE: usize = 100;

/// Slices warmed ahead of the user.
pub const DEFAULT_PREEMPTIVE_FETCH_NUMBER: usize = 5;

pub const MAX_WORKER_THREADS: usize = 256;

pub const DEFAULT_PROGRESS_DEBOUNCE: Duration = crate::indicator::DEFAULT_DEBOUNCE;

pub const DEFAULT_TILE_BACKGROUND: [u8; 4] = [255, 255, 255, 255];
pub const DEFAULT_SCENE_BACKGROUND: [u8; 4] = [220, 220, 220, 255];

/// One worker per core.
pub fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

pub(super) fn clamp_tile_size(value: u32) -> u32 {
    if value < MIN_TILE_SIZE || value > MAX_TILE_SIZE {
        let clamped = value.clamp(MIN_TILE_SIZE, MAX_TILE_SIZE);
        tracing::warn!(
            requested = value,
            min = MIN_TILE_SIZE,
            max = MAX_TILE_SIZE,
            "tile_size out of range, clamping to {}",
            clamped
        );
        clamped
    } else {
        value
    }
}

pub(super) fn clamp_cache_size(value: usize) -> usize {
    if value == 0 {
        tracing::warn!(requested = value, "cache size must be at least 1, clamping to 1");
        1
    } else {
        value
    }
}

pub(super) fn clamp_worker_threads(value: usize) -> usize {
    if value == 0 || value > MAX_WORKER_THREADS {
        let clamped = value.clamp(1, MAX_WORKER_THREADS);
        tracing::warn!(
            requested = value,
            max = MAX_WORKER_THREADS,
            "worker thread count out of range, clamping to {}",
            clamped
        );
        clamped
    } else {
        value
    }
}
