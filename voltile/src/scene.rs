//! A 2D slice view over a 5D volume.
//!
//! [`SliceScene`] owns its [`Tiling`] and [`TileProvider`] outright. Anything
//! that changes tile geometry (volume shape, rotation, axis swap) builds a
//! fresh pair and stops the old provider; nothing is permuted in place.
//!
//! ```text
//!  PositionModel ──events──┐
//!                          ├──► process_events() ──► TileProvider
//!  LayerStack ─────events──┘                           │
//!                                                      ▼
//!  render(view) ◄── get_tiles ◄──────────────── cache slots
//!       │
//!       ├──► DirtyIndicator (progress pies)
//!       └──► BowWave ──► prefetch(next slices)
//! ```
//!
//! Viewers subscribe with [`SliceScene::subscribe`] and repaint on
//! [`ViewEvent`]s: a tile publishing a new image, or the scene rectangle
//! changing after a rebuild.

use crate::bow_wave::{BowWave, Course};
use crate::config::RenderConfig;
use crate::events::{EventBus, SceneEvent, StackChange, ViewEvent};
use crate::executor::ExecutorError;
use crate::geometry::{Affine, IntRect, Rect};
use crate::indicator::{DirtyIndicator, ProgressPie};
use crate::layer::{LayerStack, StackedSources};
use crate::position::{PositionModel, SlicePosition};
use crate::provider::{TileProvider, TileSnapshot};
use crate::tiling::{Tiling, TilingError};
use image::{imageops, Rgba, RgbaImage};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SceneError {
    #[error(transparent)]
    Tiling(#[from] TilingError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("slicing axis must be 0 (x), 1 (y) or 2 (z), got {0}")]
    InvalidSlicingAxis(usize),
}

pub struct SliceScene {
    position: Arc<PositionModel>,
    layers: Arc<LayerStack>,
    events: Vec<Receiver<SceneEvent>>,
    /// Spatial axis this view slices through (0 = x, 1 = y, 2 = z).
    slicing_axis: usize,
    config: RenderConfig,
    transform: Affine,
    tiling: Arc<Tiling>,
    provider: TileProvider,
    indicator: DirtyIndicator,
    bow_wave: BowWave,
    settled: bool,
    /// Volume shape the current tiling was built for.
    built_shape: [usize; 5],
    view_events: Arc<EventBus<ViewEvent>>,
}

impl SliceScene {
    pub fn new(
        position: Arc<PositionModel>,
        layers: Arc<LayerStack>,
        slicing_axis: usize,
        config: RenderConfig,
    ) -> Result<Self, SceneError> {
        if slicing_axis > 2 {
            return Err(SceneError::InvalidSlicingAxis(slicing_axis));
        }
        if let Some(shape) = layers.shape() {
            position.set_shape(shape);
        }
        let events = vec![position.subscribe(), layers.subscribe()];

        let mut config = config;
        config.preemptive_fetch_number =
            clamp_preemptive(config.preemptive_fetch_number, config.cache_size);

        let transform = Affine::identity();
        let built_shape = position.shape5d();
        let data_shape = data_shape(&built_shape, slicing_axis);
        let tiling = Arc::new(Tiling::new(data_shape, transform, config.tile_size)?);
        let sources: Arc<dyn StackedSources> = layers.clone();
        let view_events = Arc::new(EventBus::new());
        let provider = TileProvider::with_events(
            Arc::clone(&tiling),
            sources,
            config.provider_config(),
            Arc::clone(&view_events),
        )?;
        let mut indicator = DirtyIndicator::new(tiling.len(), config.progress_debounce);
        indicator.set_visible(config.show_tile_progress);

        let scene = Self {
            position,
            layers,
            events,
            slicing_axis,
            config,
            transform,
            tiling,
            provider,
            indicator,
            bow_wave: BowWave::new(),
            settled: true,
            built_shape,
            view_events,
        };
        scene.provider.set_slice_position(scene.through());
        info!(
            slicing_axis,
            data_shape = ?data_shape,
            tiles = scene.tiling.len(),
            "slice scene created"
        );
        Ok(scene)
    }

    /// Apply every pending position and layer notification.
    pub fn process_events(&mut self) -> Result<(), SceneError> {
        let pending: Vec<SceneEvent> = self
            .events
            .iter()
            .flat_map(|rx| rx.try_iter().collect::<Vec<_>>())
            .collect();

        for event in pending {
            match event {
                SceneEvent::ShapeChanged(shape) => {
                    debug!(?shape, "volume shape changed");
                    self.rebuild_if_reshaped()?;
                }
                SceneEvent::LayerStackChanged(StackChange::ShapeChanged(shape)) => {
                    debug!(?shape, "layer sources changed shape");
                    self.position.set_shape(shape);
                    self.rebuild_if_reshaped()?;
                }
                SceneEvent::LayerStackChanged(change) => {
                    self.provider.handle_stack_change(&change);
                }
                SceneEvent::SlicingPositionChanged { new, old } => {
                    self.bow_wave
                        .on_slicing_position_changed(new, old, self.slicing_axis);
                    self.provider.set_slice_position(self.through());
                }
                SceneEvent::TimeChanged { new, old } => {
                    self.bow_wave.on_time_changed(new, old);
                    self.provider.set_slice_position(self.through());
                }
                SceneEvent::ChannelChanged { new, old } => {
                    self.bow_wave.on_channel_changed(new, old);
                    self.provider.set_slice_position(self.through());
                }
            }
        }
        Ok(())
    }

    /// Receive repaint notifications. The subscription survives rebuilds.
    pub fn subscribe(&self) -> Receiver<ViewEvent> {
        self.view_events.subscribe()
    }

    /// Paint `view` (display coordinates) and warm the cache ahead.
    ///
    /// Tiles are drawn from whatever image they last published; a tile
    /// without one leaves the scene background showing. Tile outlines are
    /// drawn on top when enabled. Never waits for pixel data.
    pub fn render(&mut self, view: &Rect) -> RgbaImage {
        let x0 = view.x.floor() as i64;
        let y0 = view.y.floor() as i64;
        let width = (view.right().ceil() as i64 - x0).max(0) as u32;
        let height = (view.bottom().ceil() as i64 - y0).max(0) as u32;
        let mut canvas = RgbaImage::from_pixel(width, height, self.config.scene_background);

        let now = Instant::now();
        let tiles = self.provider.get_tiles(view);
        for tile in &tiles {
            if let Some(image) = &tile.image {
                imageops::replace(
                    &mut canvas,
                    image.as_ref(),
                    tile.display_rect.x - x0,
                    tile.display_rect.y - y0,
                );
            }
            self.indicator.set_tile_progress(tile.id, tile.progress, now);
            if self.config.show_tile_outlines {
                draw_dashed_outline(&mut canvas, &tile.display_rect, x0, y0);
            }
        }

        self.prefetch_ahead(view, tiles.len());
        canvas
    }

    /// Tile snapshots for `view` without painting.
    pub fn tiles(&mut self, view: &Rect) -> Vec<TileSnapshot> {
        let now = Instant::now();
        let tiles = self.provider.get_tiles(view);
        for tile in &tiles {
            self.indicator.set_tile_progress(tile.id, tile.progress, now);
        }
        tiles
    }

    /// Warm up to `preemptive_fetch_number` slices ahead, as many as fit in
    /// the cache next to the `visible_tiles` on screen.
    fn prefetch_ahead(&self, view: &Rect, visible_tiles: usize) {
        let fitting = (self.provider.cache_size() / visible_tiles.max(1)).saturating_sub(1);
        let n = self.config.preemptive_fetch_number.min(fitting);
        if n == 0 {
            return;
        }
        let targets = self.bow_wave.targets(self.through(), self.through_bounds(), n);
        for target in targets {
            self.provider.prefetch(view, target);
        }
    }

    /// Block until every fetch issued so far has completed.
    pub fn join_rendering(&self) {
        self.provider.join();
    }

    pub fn join_rendering_timeout(&self, timeout: Duration) -> bool {
        self.provider.join_timeout(timeout)
    }

    /// Whole scene in display coordinates.
    pub fn scene_rect(&self) -> Rect {
        self.tiling.bounding_rect().to_rect()
    }

    pub fn set_cache_size(&mut self, cache_size: usize) {
        let cache_size = cache_size.max(1);
        self.config.cache_size = cache_size;
        self.provider.set_cache_size(cache_size);
        self.config.preemptive_fetch_number =
            clamp_preemptive(self.config.preemptive_fetch_number, cache_size);
    }

    pub fn cache_size(&self) -> usize {
        self.provider.cache_size()
    }

    /// Number of slices warmed ahead, clamped below the cache size so the
    /// current slice always fits.
    pub fn set_preemptive_fetch_number(&mut self, n: usize) {
        self.config.preemptive_fetch_number = clamp_preemptive(n, self.config.cache_size);
    }

    pub fn preemptive_fetch_number(&self) -> usize {
        self.config.preemptive_fetch_number
    }

    /// Rotate the view 90° counter-clockwise.
    pub fn rotate_left(&mut self) -> Result<(), SceneError> {
        self.rotate(-1)
    }

    /// Rotate the view 90° clockwise.
    pub fn rotate_right(&mut self) -> Result<(), SceneError> {
        self.rotate(1)
    }

    fn rotate(&mut self, direction: i8) -> Result<(), SceneError> {
        self.transform = self.transform.rotated_90(&self.scene_rect(), direction);
        self.rebuild()
    }

    /// Transpose the two displayed axes.
    pub fn swap_axes(&mut self) -> Result<(), SceneError> {
        self.transform = self.transform.swap_axes(self.data_shape());
        self.rebuild()
    }

    pub fn set_show_tile_progress(&mut self, show: bool) {
        self.config.show_tile_progress = show;
        self.indicator.set_visible(show && self.settled);
    }

    /// Hide progress pies while the user is still scrolling through slices.
    pub fn indicate_slicing_position_settled(&mut self, settled: bool) {
        self.settled = settled;
        self.indicator
            .set_visible(settled && self.config.show_tile_progress);
    }

    pub fn progress_indicators(&self) -> Vec<ProgressPie> {
        self.progress_indicators_at(Instant::now())
    }

    pub fn progress_indicators_at(&self, now: Instant) -> Vec<ProgressPie> {
        self.indicator.indicators(&self.tiling, now)
    }

    /// Draw a dashed border around every tile (a debugging aid).
    pub fn set_show_tile_outlines(&mut self, show: bool) {
        self.config.show_tile_outlines = show;
    }

    pub fn show_tile_outlines(&self) -> bool {
        self.config.show_tile_outlines
    }

    /// Display rectangles of the tile borders drawn over `view`; empty while
    /// outlines are off.
    pub fn tile_outlines(&self, view: &Rect) -> Vec<IntRect> {
        if !self.config.show_tile_outlines {
            return Vec::new();
        }
        self.tiling
            .tiles_intersecting(view)
            .into_iter()
            .filter_map(|id| self.tiling.tile(id).map(|tile| tile.display_rect))
            .collect()
    }

    /// Position along the non-displayed axes.
    pub fn through(&self) -> SlicePosition {
        let pos = self.position.slicing_pos5d();
        SlicePosition::new(pos[0], pos[self.slicing_axis + 1], pos[4])
    }

    fn through_bounds(&self) -> [usize; 3] {
        let shape = self.position.shape5d();
        [shape[0], shape[self.slicing_axis + 1], shape[4]]
    }

    /// `(width, height)` of the displayed data slice.
    pub fn data_shape(&self) -> (u32, u32) {
        data_shape(&self.position.shape5d(), self.slicing_axis)
    }

    pub fn tiling(&self) -> &Arc<Tiling> {
        &self.tiling
    }

    pub fn provider(&self) -> &TileProvider {
        &self.provider
    }

    pub fn transform(&self) -> &Affine {
        &self.transform
    }

    pub fn course(&self) -> Course {
        self.bow_wave.course()
    }

    pub fn layers(&self) -> &Arc<LayerStack> {
        &self.layers
    }

    pub fn position(&self) -> &Arc<PositionModel> {
        &self.position
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Stop the workers and wait for them to exit.
    pub fn shutdown(&self) {
        self.provider.join_threads();
    }

    fn rebuild_if_reshaped(&mut self) -> Result<(), SceneError> {
        if self.position.shape5d() == self.built_shape {
            return Ok(());
        }
        self.rebuild()
    }

    fn rebuild(&mut self) -> Result<(), SceneError> {
        let shape = self.position.shape5d();
        let data_shape = self.data_shape();
        let tiling = Arc::new(Tiling::new(data_shape, self.transform, self.config.tile_size)?);
        let sources: Arc<dyn StackedSources> = self.layers.clone();
        let provider = TileProvider::with_events(
            Arc::clone(&tiling),
            sources,
            self.config.provider_config(),
            Arc::clone(&self.view_events),
        )?;
        provider.set_slice_position(self.through());

        self.provider.notify_threads_to_stop();
        self.provider = provider;
        self.tiling = tiling;
        self.built_shape = shape;

        let visible = self.indicator.is_visible();
        self.indicator = DirtyIndicator::new(self.tiling.len(), self.config.progress_debounce);
        self.indicator.set_visible(visible);

        info!(
            data_shape = ?data_shape,
            tiles = self.tiling.len(),
            swapped = self.transform.is_axes_swapped(),
            "tiling rebuilt"
        );
        self.view_events
            .emit(ViewEvent::SceneRectChanged(self.scene_rect()));
        Ok(())
    }
}

/// Tile border dashed in 5 px runs of black and white, clipped to the
/// canvas whose top-left sits at `(x0, y0)`.
fn draw_dashed_outline(canvas: &mut RgbaImage, rect: &IntRect, x0: i64, y0: i64) {
    const DASH: i64 = 5;
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    if rect.is_empty() {
        return;
    }

    let (width, height) = (canvas.width() as i64, canvas.height() as i64);
    let mut put = |x: i64, y: i64, step: i64| {
        let (cx, cy) = (x - x0, y - y0);
        if (0..width).contains(&cx) && (0..height).contains(&cy) {
            let color = if (step / DASH) % 2 == 0 { BLACK } else { WHITE };
            canvas.put_pixel(cx as u32, cy as u32, color);
        }
    };

    for (step, x) in (rect.x..rect.right()).enumerate() {
        put(x, rect.y, step as i64);
        put(x, rect.bottom() - 1, step as i64);
    }
    for (step, y) in (rect.y..rect.bottom()).enumerate() {
        put(rect.x, y, step as i64);
        put(rect.right() - 1, y, step as i64);
    }
}

/// The two spatial axes not sliced through, as `(width, height)`.
fn data_shape(shape5d: &[usize; 5], slicing_axis: usize) -> (u32, u32) {
    let mut displayed = (0..3).filter(|&axis| axis != slicing_axis);
    let extent = |axis: Option<usize>| axis.map(|a| shape5d[a + 1] as u32).unwrap_or(0);
    let w = extent(displayed.next());
    let h = extent(displayed.next());
    (w, h)
}

fn clamp_preemptive(n: usize, cache_size: usize) -> usize {
    let max = cache_size.saturating_sub(1);
    if n > max {
        warn!(requested = n, max, "preemptive fetch number clamped to cache size - 1");
        max
    } else {
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::ConstantSource;

    fn scene(shape: [usize; 5]) -> SliceScene {
        let position = Arc::new(PositionModel::new(shape));
        let layers = Arc::new(LayerStack::new());
        layers.add(Arc::new(ConstantSource::gray(50)));
        let config = RenderConfig::default()
            .with_tile_size(64)
            .with_worker_threads(2);
        SliceScene::new(position, layers, 2, config).unwrap()
    }

    #[test]
    fn test_data_shape_skips_slicing_axis() {
        let shape = [1, 10, 20, 30, 1];
        assert_eq!(data_shape(&shape, 0), (20, 30));
        assert_eq!(data_shape(&shape, 1), (10, 30));
        assert_eq!(data_shape(&shape, 2), (10, 20));
    }

    #[test]
    fn test_invalid_slicing_axis() {
        let position = Arc::new(PositionModel::new([1, 1, 1, 1, 1]));
        let layers = Arc::new(LayerStack::new());
        let err = SliceScene::new(position, layers, 3, RenderConfig::default());
        assert!(matches!(err, Err(SceneError::InvalidSlicingAxis(3))));
    }

    #[test]
    fn test_preemptive_number_clamped_to_cache() {
        let mut s = scene([1, 100, 100, 10, 1]);
        s.set_cache_size(4);
        s.set_preemptive_fetch_number(10);
        assert_eq!(s.preemptive_fetch_number(), 3);
        s.set_cache_size(2);
        assert_eq!(s.preemptive_fetch_number(), 1);
        s.set_preemptive_fetch_number(0);
        assert_eq!(s.preemptive_fetch_number(), 0);
    }

    #[test]
    fn test_shape_change_rebuilds_tiling() {
        let mut s = scene([1, 100, 100, 10, 1]);
        assert_eq!(s.tiling().bounding_rect(), IntRect::new(0, 0, 100, 100));

        s.position().set_shape([1, 200, 50, 10, 1]);
        s.process_events().unwrap();

        assert_eq!(s.tiling().bounding_rect(), IntRect::new(0, 0, 200, 50));
        assert!(s.provider().is_empty());
    }

    #[test]
    fn test_source_shape_change_rebuilds_and_announces_scene_rect() {
        let mut s = scene([1, 100, 100, 10, 1]);
        let rx = s.subscribe();

        s.layers().set_shape([1, 200, 50, 10, 1]);
        s.process_events().unwrap();
        s.process_events().unwrap();

        assert_eq!(s.position().shape5d(), [1, 200, 50, 10, 1]);
        assert_eq!(s.tiling().bounding_rect(), IntRect::new(0, 0, 200, 50));
        let events: Vec<ViewEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![ViewEvent::SceneRectChanged(Rect::new(0.0, 0.0, 200.0, 50.0))]
        );
    }

    #[test]
    fn test_tile_updates_reach_subscribers_across_rebuilds() {
        let mut s = scene([1, 100, 100, 10, 1]);
        let rx = s.subscribe();
        s.swap_axes().unwrap();

        let view = Rect::new(0.0, 0.0, 100.0, 100.0);
        s.render(&view);
        s.join_rendering();

        let events: Vec<ViewEvent> = rx.try_iter().collect();
        assert_eq!(events[0], ViewEvent::SceneRectChanged(view));
        let updated = events
            .iter()
            .filter(|e| matches!(e, ViewEvent::TileUpdated(_)))
            .count();
        assert_eq!(updated, 4);
    }

    #[test]
    fn test_tile_outlines_follow_flag() {
        let mut s = scene([1, 100, 100, 10, 1]);
        let view = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert!(!s.show_tile_outlines());
        assert!(s.tile_outlines(&view).is_empty());

        s.set_show_tile_outlines(true);
        let outlines = s.tile_outlines(&view);
        assert_eq!(outlines.len(), 4);
        assert!(outlines.contains(&IntRect::new(64, 0, 36, 64)));

        s.render(&view);
        s.join_rendering();
        let canvas = s.render(&view);
        assert_eq!(*canvas.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(*canvas.get_pixel(7, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*canvas.get_pixel(64, 2), Rgba([0, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(30, 30)[0], 50);

        s.set_show_tile_outlines(false);
        let canvas = s.render(&view);
        assert_eq!(canvas.get_pixel(0, 0)[0], 50);
    }

    #[test]
    fn test_slice_change_moves_provider_and_course() {
        let mut s = scene([3, 100, 100, 10, 1]);
        s.position().set_slicing_position([0, 0, 4]);
        s.position().set_slicing_position([0, 0, 3]);
        s.process_events().unwrap();

        assert_eq!(s.provider().slice_position(), SlicePosition::new(0, 3, 0));
        assert_eq!(s.course(), Course::new(1, -1));

        s.position().set_time(2);
        s.process_events().unwrap();
        assert_eq!(s.through(), SlicePosition::new(2, 3, 0));
        assert_eq!(s.course(), Course::new(0, 1));
    }

    #[test]
    fn test_rotation_and_swap_rebuild() {
        let mut s = scene([1, 100, 40, 10, 1]);
        s.swap_axes().unwrap();
        assert_eq!(s.tiling().bounding_rect(), IntRect::new(0, 0, 40, 100));
        assert!(s.transform().is_axes_swapped());

        s.swap_axes().unwrap();
        assert_eq!(s.tiling().bounding_rect(), IntRect::new(0, 0, 100, 40));

        s.rotate_right().unwrap();
        let rect = s.tiling().bounding_rect();
        assert_eq!((rect.width, rect.height), (40, 100));
    }

    #[test]
    fn test_render_fills_scene_background_first() {
        let mut s = scene([1, 100, 100, 10, 1]);
        let canvas = s.render(&Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(canvas.dimensions(), (100, 100));
        s.join_rendering();
        let canvas = s.render(&Rect::new(0.0, 0.0, 100.0, 100.0));
        assert!(canvas.pixels().all(|p| p[0] == 50));
    }

    #[test]
    fn test_settled_flag_hides_indicators() {
        let mut s = scene([1, 100, 100, 10, 1]);
        s.indicate_slicing_position_settled(false);
        assert!(s
            .progress_indicators_at(Instant::now() + Duration::from_secs(10))
            .is_empty());
        s.indicate_slicing_position_settled(true);
        s.set_show_tile_progress(false);
        assert!(s
            .progress_indicators_at(Instant::now() + Duration::from_secs(10))
            .is_empty());
    }
}
