//! Per-tile "work in progress" pies.
//!
//! A tile that completes quickly should never flash an indicator, so a pie
//! only appears once a tile has been incomplete for longer than the debounce
//! interval.
//!
//! ```text
//!  progress  1.0 ──┐            ┌── 1.0
//!                  └─ 0.3 ─ 0.7 ┘
//!  pie       ......|<debounce>|##|......
//! ```

use crate::geometry::Rect;
use crate::tiling::{TileId, Tiling};
use std::time::{Duration, Instant};

/// Default time a tile has to stay incomplete before its pie is shown.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// One indicator to paint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressPie {
    pub tile: TileId,
    /// Square centred on the tile, half its shorter side wide.
    pub rect: Rect,
    /// Angular size of the outstanding part, `(1 − progress) · 360`.
    pub span_degrees: f32,
}

#[derive(Debug, Clone, Copy)]
struct TileMark {
    progress: f32,
    /// When progress last dropped below 1.0; `None` while complete.
    dropped_at: Option<Instant>,
}

impl Default for TileMark {
    fn default() -> Self {
        Self {
            progress: 1.0,
            dropped_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirtyIndicator {
    marks: Vec<TileMark>,
    debounce: Duration,
    visible: bool,
}

impl DirtyIndicator {
    pub fn new(tile_count: usize, debounce: Duration) -> Self {
        Self {
            marks: vec![TileMark::default(); tile_count],
            debounce,
            visible: true,
        }
    }

    /// Record the latest progress of a tile. Unknown ids are ignored.
    pub fn set_tile_progress(&mut self, tile: TileId, progress: f32, now: Instant) {
        let Some(mark) = self.marks.get_mut(tile) else {
            return;
        };
        let progress = progress.clamp(0.0, 1.0);
        mark.progress = progress;
        if progress >= 1.0 {
            mark.dropped_at = None;
        } else if mark.dropped_at.is_none() {
            mark.dropped_at = Some(now);
        }
    }

    /// Pies for every tile that has been incomplete for at least the
    /// debounce interval at `now`. Empty while hidden.
    pub fn indicators(&self, tiling: &Tiling, now: Instant) -> Vec<ProgressPie> {
        if !self.visible {
            return Vec::new();
        }
        self.marks
            .iter()
            .enumerate()
            .filter_map(|(id, mark)| {
                let dropped_at = mark.dropped_at?;
                if now.saturating_duration_since(dropped_at) < self.debounce {
                    return None;
                }
                let tile = tiling.tile(id)?;
                let r = tile.display_rect;
                let side = r.width.min(r.height) as f64 / 2.0;
                let (cx, cy) = r.to_rect().center();
                Some(ProgressPie {
                    tile: id,
                    rect: Rect::new(cx - side / 2.0, cy - side / 2.0, side, side),
                    span_degrees: (1.0 - mark.progress) * 360.0,
                })
            })
            .collect()
    }

    pub fn progress(&self, tile: TileId) -> Option<f32> {
        self.marks.get(tile).map(|mark| mark.progress)
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Affine;

    fn setup() -> (Tiling, DirtyIndicator, Instant) {
        let tiling = Tiling::new((200, 100), Affine::identity(), 100).unwrap();
        let indicator = DirtyIndicator::new(tiling.len(), DEFAULT_DEBOUNCE);
        (tiling, indicator, Instant::now())
    }

    #[test]
    fn test_complete_tiles_show_nothing() {
        let (tiling, mut ind, t0) = setup();
        ind.set_tile_progress(0, 1.0, t0);
        assert!(ind.indicators(&tiling, t0 + Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_pie_waits_for_debounce() {
        let (tiling, mut ind, t0) = setup();
        ind.set_tile_progress(1, 0.25, t0);

        assert!(ind
            .indicators(&tiling, t0 + Duration::from_millis(299))
            .is_empty());

        let pies = ind.indicators(&tiling, t0 + Duration::from_millis(300));
        assert_eq!(pies.len(), 1);
        assert_eq!(pies[0].tile, 1);
        assert_eq!(pies[0].span_degrees, 270.0);
        assert_eq!(pies[0].rect, Rect::new(125.0, 25.0, 50.0, 50.0));
    }

    #[test]
    fn test_progress_updates_keep_original_drop_time() {
        let (tiling, mut ind, t0) = setup();
        ind.set_tile_progress(0, 0.0, t0);
        ind.set_tile_progress(0, 0.5, t0 + Duration::from_millis(250));
        let pies = ind.indicators(&tiling, t0 + Duration::from_millis(310));
        assert_eq!(pies.len(), 1);
        assert_eq!(pies[0].span_degrees, 180.0);
    }

    #[test]
    fn test_completion_resets_timer() {
        let (tiling, mut ind, t0) = setup();
        ind.set_tile_progress(0, 0.5, t0);
        ind.set_tile_progress(0, 1.0, t0 + Duration::from_millis(100));
        ind.set_tile_progress(0, 0.5, t0 + Duration::from_millis(200));
        assert!(ind
            .indicators(&tiling, t0 + Duration::from_millis(400))
            .is_empty());
        assert_eq!(ind.indicators(&tiling, t0 + Duration::from_millis(500)).len(), 1);
    }

    #[test]
    fn test_hidden_indicator_is_empty() {
        let (tiling, mut ind, t0) = setup();
        ind.set_tile_progress(0, 0.0, t0);
        ind.set_visible(false);
        assert!(ind.indicators(&tiling, t0 + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_unknown_tile_ignored() {
        let (_, mut ind, t0) = setup();
        ind.set_tile_progress(99, 0.0, t0);
        assert_eq!(ind.progress(99), None);
    }
}
