//! The cache engine.

use super::composite::composite_tile;
use super::slot::{LayerData, Slot};
use super::types::{Counters, ProviderConfig, ProviderStats, TileKey, TileSnapshot, TileState};
use crate::events::{EventBus, StackChange, ViewEvent};
use crate::executor::{ExecutorError, Job, Priority, WorkerPool};
use crate::geometry::{IntRect, Rect};
use crate::layer::{
    check_dimensions, FetchRequest, LayerId, LayerView, SourceError, StackSnapshot,
    StackedSources,
};
use crate::position::SlicePosition;
use crate::tiling::{Tile, Tiling};
use image::{Rgba, RgbaImage};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// How a new slot may be made room for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// On-screen request: grow past `cache_size` if nothing can be evicted.
    Grow,
    /// Cache warming: give up instead of growing.
    Skip,
}

struct CacheState {
    slots: HashMap<TileKey, Slot>,
    /// Keys returned by the last `get_tiles`. Never evicted.
    visible: HashSet<TileKey>,
    stack: StackSnapshot,
    through: SlicePosition,
    cache_size: usize,
    tick: u64,
    /// First tick of the current render pass (the latest `get_tiles`).
    /// Slots touched since then belong to this pass.
    pass_start: u64,
}

impl CacheState {
    fn priority_for(&self, key: &TileKey) -> Priority {
        if key.through == self.through {
            Priority::Interactive
        } else {
            Priority::Prefetch
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Least recently touched slot that is not on screen, optionally only
    /// among slots last touched before `older_than`.
    fn eviction_candidate(&self, older_than: Option<u64>) -> Option<TileKey> {
        self.slots
            .iter()
            .filter(|(key, _)| !self.visible.contains(key))
            .filter(|(_, slot)| older_than.map_or(true, |tick| slot.recency < tick))
            .min_by_key(|(_, slot)| slot.recency)
            .map(|(key, _)| *key)
    }

    /// Whether `key` was requested during the current render pass, on
    /// screen or ahead of it.
    fn in_current_pass(&self, key: &TileKey) -> bool {
        self.visible.contains(key)
            || self
                .slots
                .get(key)
                .is_some_and(|slot| slot.recency >= self.pass_start)
    }
}

struct Inner {
    tiling: Arc<Tiling>,
    sources: Arc<dyn StackedSources>,
    pool: WorkerPool,
    background: Rgba<u8>,
    cache: RwLock<CacheState>,
    counters: Counters,
    events: Arc<EventBus<ViewEvent>>,
}

/// Tile cache with asynchronous fetching, compositing and eviction.
///
/// Bound to one [`Tiling`]; a new tiling needs a new provider. Dropping the
/// provider stops its workers without waiting for them.
///
/// Every published tile image is announced as [`ViewEvent::TileUpdated`]
/// with the tile's display rectangle, so a viewer can repaint without
/// polling.
pub struct TileProvider {
    inner: Arc<Inner>,
}

impl TileProvider {
    /// Create a provider and start its worker pool.
    pub fn new(
        tiling: Arc<Tiling>,
        sources: Arc<dyn StackedSources>,
        config: ProviderConfig,
    ) -> Result<Self, ExecutorError> {
        Self::with_events(tiling, sources, config, Arc::new(EventBus::new()))
    }

    /// Like [`new`](Self::new), announcing tile updates on a bus that
    /// outlives this provider.
    pub fn with_events(
        tiling: Arc<Tiling>,
        sources: Arc<dyn StackedSources>,
        config: ProviderConfig,
        events: Arc<EventBus<ViewEvent>>,
    ) -> Result<Self, ExecutorError> {
        let pool = WorkerPool::new(config.worker_threads, "tile-worker")?;
        let stack = sources.snapshot();
        debug!(
            tiles = tiling.len(),
            layers = stack.layers.len(),
            cache_size = config.cache_size,
            "tile provider created"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                tiling,
                sources,
                pool,
                background: config.tile_background,
                cache: RwLock::new(CacheState {
                    slots: HashMap::new(),
                    visible: HashSet::new(),
                    stack,
                    through: SlicePosition::default(),
                    cache_size: config.cache_size.max(1),
                    tick: 0,
                    pass_start: 0,
                }),
                counters: Counters::default(),
                events,
            }),
        })
    }

    pub fn tiling(&self) -> &Arc<Tiling> {
        &self.inner.tiling
    }

    /// Receive a [`ViewEvent::TileUpdated`] for every published tile image.
    pub fn subscribe(&self) -> Receiver<ViewEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshots of every tile intersecting `view` at the current slice
    /// position, in tile id order.
    ///
    /// Missing or invalidated layers are requested on the way. Never blocks
    /// on a fetch: incomplete tiles come back with their last good image and
    /// a progress below 1.0.
    ///
    /// Each call starts a new render pass. Fetches that turn out stale are
    /// re-issued at once for tiles requested in the current pass; tiles
    /// last requested in an earlier pass wait until they are touched again.
    pub fn get_tiles(&self, view: &Rect) -> Vec<TileSnapshot> {
        let ids = self.inner.tiling.tiles_intersecting(view);
        let mut guard = self.inner.cache.write();
        let state = &mut *guard;
        let through = state.through;
        state.pass_start = state.tick + 1;

        state.visible = ids.iter().map(|&id| TileKey::new(through, id)).collect();

        let mut snapshots = Vec::with_capacity(ids.len());
        for id in ids {
            let key = TileKey::new(through, id);
            if !self.inner.admit(state, key, Admission::Grow) {
                continue;
            }
            let tick = state.next_tick();
            let Some(slot) = state.slots.get_mut(&key) else {
                continue;
            };
            slot.recency = tick;
            self.inner
                .refresh(slot, key, &state.stack, Priority::Interactive);
            if let Some(tile) = self.inner.tiling.tile(id) {
                snapshots.push(snapshot(tile, slot, &state.stack));
            }
        }

        self.inner.evict_excess(state);
        snapshots
    }

    /// Warm the cache for the tiles under `view` at another slice position.
    ///
    /// Nothing is returned; prefetch never pushes the cache past its size.
    /// It only evicts slots left over from earlier render passes, never one
    /// touched since the latest [`get_tiles`](Self::get_tiles), so calling it
    /// nearest slice first keeps the nearest slices when the cache is short.
    pub fn prefetch(&self, view: &Rect, through: SlicePosition) {
        let ids = self.inner.tiling.tiles_intersecting(view);
        let mut guard = self.inner.cache.write();
        let state = &mut *guard;
        let priority = state.priority_for(&TileKey::new(through, 0));

        for id in ids {
            let key = TileKey::new(through, id);
            if !self.inner.admit(state, key, Admission::Skip) {
                trace!(key = %key, "prefetch skipped, cache full");
                break;
            }
            let tick = state.next_tick();
            if let Some(slot) = state.slots.get_mut(&key) {
                slot.recency = tick;
                self.inner.refresh(slot, key, &state.stack, priority);
            }
        }
    }

    /// Move the provider to another slice. Cached slices are kept.
    pub fn set_slice_position(&self, through: SlicePosition) {
        self.inner.cache.write().through = through;
    }

    pub fn slice_position(&self) -> SlicePosition {
        self.inner.cache.read().through
    }

    /// Re-read the layer stack and invalidate whatever `change` affects.
    pub fn handle_stack_change(&self, change: &StackChange) {
        let stack = self.inner.sources.snapshot();
        let mut state = self.inner.cache.write();
        state.stack = stack;

        match change {
            StackChange::DataChanged { layer, region } => {
                self.inner.invalidate_layer_in(&mut state, *layer, region.as_ref());
            }
            StackChange::Removed(layer) => {
                for slot in state.slots.values_mut() {
                    slot.layers.remove(layer);
                    slot.patch.bump_data();
                }
            }
            // Geometry is the owner's business: a new shape means a new
            // tiling and a new provider.
            StackChange::ShapeChanged(_) => {}
            StackChange::Added(_)
            | StackChange::Moved(_)
            | StackChange::VisibilityChanged { .. }
            | StackChange::OpacityChanged { .. } => {
                for slot in state.slots.values_mut() {
                    slot.patch.bump_data();
                }
            }
        }
        debug!(?change, slots = state.slots.len(), "layer stack change applied");
    }

    /// Drop one layer's pixels in every cached tile whose data rectangle
    /// meets `region` (data coordinates; `None` = everywhere).
    pub fn invalidate_layer(&self, layer: LayerId, region: Option<IntRect>) {
        let mut state = self.inner.cache.write();
        self.inner.invalidate_layer_in(&mut state, layer, region.as_ref());
    }

    /// Drop every layer's pixels in cached tiles meeting `region` (display
    /// coordinates; `None` = everywhere).
    pub fn set_dirty(&self, region: Option<Rect>) {
        let mut state = self.inner.cache.write();
        let tiling = &self.inner.tiling;
        let mut touched = 0usize;
        for (key, slot) in state.slots.iter_mut() {
            let hit = match (&region, tiling.tile(key.tile)) {
                (None, _) => true,
                (Some(region), Some(tile)) => tile.display_rect.to_rect().intersects(region),
                (Some(_), None) => false,
            };
            if hit {
                slot.invalidate_all();
                touched += 1;
            }
        }
        debug!(touched, "tiles marked dirty");
    }

    /// Change the slot bound; evicts right away if the cache is over it.
    pub fn set_cache_size(&self, cache_size: usize) {
        let mut state = self.inner.cache.write();
        state.cache_size = cache_size.max(1);
        self.inner.evict_excess(&mut state);
    }

    pub fn cache_size(&self) -> usize {
        self.inner.cache.read().cache_size
    }

    /// Number of cache slots.
    pub fn len(&self) -> usize {
        self.inner.cache.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tile_state(&self, key: TileKey) -> TileState {
        let state = self.inner.cache.read();
        state
            .slots
            .get(&key)
            .map(|slot| slot.state(&state.stack))
            .unwrap_or(TileState::Absent)
    }

    /// Snapshot of one cached tile without touching it.
    pub fn peek(&self, key: TileKey) -> Option<TileSnapshot> {
        let state = self.inner.cache.read();
        let slot = state.slots.get(&key)?;
        let tile = self.inner.tiling.tile(key.tile)?;
        Some(snapshot(tile, slot, &state.stack))
    }

    pub fn contains(&self, key: TileKey) -> bool {
        self.inner.cache.read().slots.contains_key(&key)
    }

    /// Block until every fetch and composite issued so far has finished,
    /// including re-fetches they trigger.
    pub fn join(&self) {
        self.inner.pool.wait_idle();
    }

    /// [`join`](Self::join) with an upper bound. Returns whether the work
    /// drained in time.
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        self.inner.pool.wait_idle_timeout(timeout)
    }

    /// Jobs queued or running.
    pub fn outstanding(&self) -> usize {
        self.inner.pool.outstanding()
    }

    /// Stop accepting work. Results still arriving are discarded.
    pub fn notify_threads_to_stop(&self) {
        self.inner.pool.notify_threads_to_stop();
    }

    /// Stop and wait for the worker threads to exit.
    pub fn join_threads(&self) {
        self.inner.pool.join_threads();
    }

    pub fn stats(&self) -> ProviderStats {
        self.inner.counters.snapshot()
    }
}

impl Drop for TileProvider {
    fn drop(&mut self) {
        // Queued jobs hold the engine alive; dropping them breaks the cycle.
        self.inner.pool.notify_threads_to_stop();
    }
}

impl Inner {
    /// Make sure `key` has a slot. Returns `false` if it could not be
    /// admitted.
    fn admit(&self, state: &mut CacheState, key: TileKey, admission: Admission) -> bool {
        if state.slots.contains_key(&key) {
            return true;
        }
        if state.slots.len() >= state.cache_size {
            let older_than = match admission {
                Admission::Grow => None,
                Admission::Skip => Some(state.pass_start),
            };
            match state.eviction_candidate(older_than) {
                Some(victim) => self.evict(state, victim),
                None if admission == Admission::Grow => {
                    Counters::bump(&self.counters.soft_overflows);
                    debug!(
                        key = %key,
                        slots = state.slots.len(),
                        cache_size = state.cache_size,
                        "cache grows past its size, every slot is on screen"
                    );
                }
                None => return false,
            }
        }
        state.slots.insert(key, Slot::new(0));
        true
    }

    fn evict(&self, state: &mut CacheState, key: TileKey) {
        if state.slots.remove(&key).is_some() {
            Counters::bump(&self.counters.evictions);
            trace!(key = %key, "slot evicted");
        }
    }

    fn evict_excess(&self, state: &mut CacheState) {
        while state.slots.len() > state.cache_size {
            let Some(victim) = state.eviction_candidate(None) else {
                break;
            };
            self.evict(state, victim);
        }
    }

    fn invalidate_layer_in(&self, state: &mut CacheState, layer: LayerId, region: Option<&IntRect>) {
        let mut touched = 0usize;
        for (key, slot) in state.slots.iter_mut() {
            let hit = match (region, self.tiling.tile(key.tile)) {
                (None, _) => true,
                (Some(region), Some(tile)) => tile.data_rect.intersects(region),
                (Some(_), None) => false,
            };
            if hit {
                slot.invalidate_layer(layer);
                touched += 1;
            }
        }
        debug!(layer = %layer, touched, "layer invalidated");
    }

    /// Request whatever the slot lacks: missing layer pixels, then the
    /// composite once every layer is in.
    fn refresh(self: &Arc<Self>, slot: &mut Slot, key: TileKey, stack: &StackSnapshot, priority: Priority) {
        let Some(tile) = self.tiling.tile(key.tile) else {
            return;
        };
        for layer in stack.visible() {
            let missing = matches!(
                slot.layers.get(&layer.id).map(|l| &l.data),
                None | Some(LayerData::Missing)
            );
            if missing {
                self.issue_fetch(slot, key, tile, layer, priority);
            }
        }
        self.schedule_composite(slot, key, stack, priority);
    }

    fn issue_fetch(self: &Arc<Self>, slot: &mut Slot, key: TileKey, tile: &Tile, layer: &LayerView, priority: Priority) {
        let entry = slot.layers.entry(layer.id).or_default();
        if tile.data_rect.is_empty() {
            entry.data = LayerData::Ready(Arc::new(RgbaImage::new(0, 0)));
            slot.patch.bump_data();
            return;
        }

        let request = FetchRequest::new(tile.data_rect, key.through);
        let generation = entry.generation;
        let engine = Arc::clone(self);
        let view = layer.clone();
        let job: Job = Box::new(move || {
            let result = fetch_guarded(&view, &request);
            engine.complete_fetch(key, view.id, generation, result);
        });

        if self.pool.submit(priority, job) {
            entry.data = LayerData::InFlight;
            Counters::bump(&self.counters.fetches_issued);
            trace!(key = %key, layer = %layer.id, generation, "fetch issued");
        }
    }

    fn schedule_composite(self: &Arc<Self>, slot: &mut Slot, key: TileKey, stack: &StackSnapshot, priority: Priority) {
        let version = slot.patch.data_version();
        if slot.patch.is_current() || slot.composite_version == Some(version) {
            return;
        }
        let Some(layers) = slot.composite_inputs(stack) else {
            return;
        };
        let Some(tile) = self.tiling.tile(key.tile).copied() else {
            return;
        };

        let engine = Arc::clone(self);
        let job: Job = Box::new(move || {
            let image = composite_tile(&tile, engine.tiling.inverse(), engine.background, &layers);
            engine.complete_composite(key, version, image);
        });
        if self.pool.submit(priority, job) {
            slot.composite_version = Some(version);
        }
    }

    fn complete_fetch(
        self: &Arc<Self>,
        key: TileKey,
        layer: LayerId,
        generation: u64,
        result: Result<RgbaImage, SourceError>,
    ) {
        if self.pool.is_stopped() {
            Counters::bump(&self.counters.stale_discarded);
            return;
        }

        let mut guard = self.cache.write();
        let state = &mut *guard;
        let wanted = state.in_current_pass(&key);
        let priority = state.priority_for(&key);

        let Some(slot) = state.slots.get_mut(&key) else {
            Counters::bump(&self.counters.stale_discarded);
            trace!(key = %key, layer = %layer, "completion for evicted slot dropped");
            return;
        };
        let Some(entry) = slot.layers.get_mut(&layer) else {
            Counters::bump(&self.counters.stale_discarded);
            return;
        };

        if entry.generation != generation || !matches!(entry.data, LayerData::InFlight) {
            Counters::bump(&self.counters.stale_discarded);
            debug!(
                key = %key,
                layer = %layer,
                generation,
                current = entry.generation,
                "stale completion dropped"
            );
            let refetch = wanted && matches!(entry.data, LayerData::Missing);
            if refetch {
                if let (Some(tile), Some(view)) = (self.tiling.tile(key.tile), state.stack.get(layer)) {
                    if view.visible {
                        self.issue_fetch(slot, key, tile, view, priority);
                    }
                }
            }
            return;
        }

        match result {
            Ok(image) => {
                entry.data = LayerData::Ready(Arc::new(image));
                Counters::bump(&self.counters.fetches_completed);
            }
            Err(err) => {
                warn!(key = %key, layer = %layer, error = %err, "layer fetch failed");
                entry.data = LayerData::Failed(err);
                Counters::bump(&self.counters.fetches_failed);
            }
        }
        slot.patch.bump_data();
        self.schedule_composite(slot, key, &state.stack, priority);
    }

    fn complete_composite(&self, key: TileKey, version: u64, image: RgbaImage) {
        if self.pool.is_stopped() {
            return;
        }
        let published = {
            let mut state = self.cache.write();
            let Some(slot) = state.slots.get_mut(&key) else {
                return;
            };
            if slot.composite_version == Some(version) {
                slot.composite_version = None;
            }
            if slot.patch.publish(Arc::new(image), version) {
                Counters::bump(&self.counters.composites);
                trace!(key = %key, version, "tile composited");
                // Only the slice on screen needs a repaint.
                key.through == state.through
            } else {
                Counters::bump(&self.counters.stale_discarded);
                debug!(key = %key, version, current = slot.patch.data_version(), "stale composite dropped");
                false
            }
        };

        if published {
            if let Some(tile) = self.tiling.tile(key.tile) {
                self.events.emit(ViewEvent::TileUpdated(tile.display_rect));
            }
        }
    }
}

fn snapshot(tile: &Tile, slot: &Slot, stack: &StackSnapshot) -> TileSnapshot {
    TileSnapshot {
        id: tile.id,
        display_rect: tile.display_rect,
        image: slot.patch.image().cloned(),
        progress: slot.progress(stack),
        state: slot.state(stack),
        error: slot.error(stack),
        data_version: slot.patch.data_version(),
        image_version: slot.patch.image_version(),
    }
}

/// Run a source, turning panics and wrongly sized images into errors.
fn fetch_guarded(layer: &LayerView, request: &FetchRequest) -> Result<RgbaImage, SourceError> {
    let image = panic::catch_unwind(AssertUnwindSafe(|| layer.source.fetch(request)))
        .map_err(|payload| SourceError::Panicked(panic_message(payload.as_ref())))??;
    check_dimensions(request, &image)?;
    Ok(image)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Affine;
    use crate::layer::{ConstantSource, FnSource, LayerStack, PixelSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn tiling() -> Arc<Tiling> {
        Arc::new(Tiling::new((40, 40), Affine::identity(), 10).unwrap())
    }

    fn provider(stack: &Arc<LayerStack>, cache_size: usize) -> TileProvider {
        let sources: Arc<dyn StackedSources> = stack.clone();
        TileProvider::new(
            tiling(),
            sources,
            ProviderConfig::default()
                .with_cache_size(cache_size)
                .with_worker_threads(2),
        )
        .unwrap()
    }

    fn all() -> Rect {
        Rect::new(0.0, 0.0, 40.0, 40.0)
    }

    /// Source that blocks every fetch until the test releases it.
    fn gated() -> (Arc<dyn PixelSource>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel::<()>();
        let rx = parking_lot::Mutex::new(rx);
        let source = FnSource::new(move |req| {
            let _ = rx.lock().recv();
            Ok(RgbaImage::from_pixel(req.region.width, req.region.height, Rgba([7, 7, 7, 255])))
        });
        (Arc::new(source), tx)
    }

    #[test]
    fn test_first_request_is_incomplete_then_ready() {
        let stack = Arc::new(LayerStack::new());
        stack.add(Arc::new(ConstantSource::gray(201)));
        let p = provider(&stack, 100);

        let first = p.get_tiles(&Rect::new(0.0, 0.0, 15.0, 15.0));
        assert_eq!(first.iter().map(|t| t.id).collect::<Vec<_>>(), vec![0, 1, 4, 5]);

        assert!(p.join_timeout(TIMEOUT));
        let tiles = p.get_tiles(&Rect::new(0.0, 0.0, 15.0, 15.0));
        for tile in &tiles {
            assert_eq!(tile.progress, 1.0);
            assert_eq!(tile.state, TileState::Ready);
            assert_eq!(tile.image_version, tile.data_version);
            let image = tile.image.as_ref().unwrap();
            assert!(image.pixels().all(|p| *p == Rgba([201, 201, 201, 255])));
        }
    }

    #[test]
    fn test_cached_tiles_are_not_refetched() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let stack = Arc::new(LayerStack::new());
        stack.add(Arc::new(FnSource::new(move |req| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(RgbaImage::new(req.region.width, req.region.height))
        })));
        let p = provider(&stack, 100);

        p.get_tiles(&all());
        p.join();
        p.get_tiles(&all());
        p.join();
        assert_eq!(calls.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn test_stale_completion_never_marks_ready() {
        let stack = Arc::new(LayerStack::new());
        let (source, release) = gated();
        let layer = stack.add(source);
        let p = provider(&stack, 100);
        let view = Rect::new(0.0, 0.0, 5.0, 5.0);
        let key = TileKey::new(SlicePosition::default(), 0);

        p.get_tiles(&view);
        assert_eq!(p.tile_state(key), TileState::Requested);

        // Invalidate while the first fetch is blocked in the source.
        p.invalidate_layer(layer, None);
        release.send(()).unwrap();
        release.send(()).unwrap();
        assert!(p.join_timeout(TIMEOUT));

        let stats = p.stats();
        assert!(stats.stale_discarded >= 1);
        assert_eq!(stats.fetches_issued, 2);
        assert_eq!(p.tile_state(key), TileState::Ready);
    }

    #[test]
    fn test_eviction_keeps_cache_bounded() {
        let stack = Arc::new(LayerStack::new());
        stack.add(Arc::new(ConstantSource::gray(1)));
        let p = provider(&stack, 4);

        for id in 0..16 {
            let tile = p.tiling().tile(id).unwrap().display_rect.to_rect();
            p.get_tiles(&tile);
            assert!(p.len() <= 4);
        }
        p.join();
        assert_eq!(p.len(), 4);
        assert_eq!(p.stats().evictions, 12);
    }

    #[test]
    fn test_visible_tiles_are_never_evicted() {
        let stack = Arc::new(LayerStack::new());
        stack.add(Arc::new(ConstantSource::gray(1)));
        let p = provider(&stack, 2);

        let tiles = p.get_tiles(&all());
        assert_eq!(tiles.len(), 16);
        assert_eq!(p.len(), 16);
        assert_eq!(p.stats().soft_overflows, 14);

        p.get_tiles(&Rect::new(0.0, 0.0, 5.0, 5.0));
        assert_eq!(p.len(), 2);
        assert!(p.contains(TileKey::new(SlicePosition::default(), 0)));
    }

    #[test]
    fn test_prefetch_does_not_overflow() {
        let stack = Arc::new(LayerStack::new());
        stack.add(Arc::new(ConstantSource::gray(1)));
        let p = provider(&stack, 16);

        p.get_tiles(&all());
        p.prefetch(&all(), SlicePosition::new(0, 1, 0));
        assert_eq!(p.len(), 16);
        assert_eq!(p.stats().soft_overflows, 0);
    }

    #[test]
    fn test_prefetch_warms_other_slice() {
        let stack = Arc::new(LayerStack::new());
        stack.add(Arc::new(ConstantSource::gray(1)));
        let p = provider(&stack, 100);
        let next = SlicePosition::new(0, 1, 0);

        p.get_tiles(&Rect::new(0.0, 0.0, 5.0, 5.0));
        p.prefetch(&Rect::new(0.0, 0.0, 5.0, 5.0), next);
        p.join();
        assert_eq!(p.tile_state(TileKey::new(next, 0)), TileState::Ready);

        p.set_slice_position(next);
        let issued = p.stats().fetches_issued;
        let tiles = p.get_tiles(&Rect::new(0.0, 0.0, 5.0, 5.0));
        assert_eq!(tiles[0].progress, 1.0);
        assert_eq!(p.stats().fetches_issued, issued);
    }

    #[test]
    fn test_source_failure_is_flagged_per_tile() {
        let stack = Arc::new(LayerStack::new());
        stack.add(Arc::new(ConstantSource::gray(9)));
        stack.add(Arc::new(FnSource::new(|req| {
            if req.region.x == 0 && req.region.y == 0 {
                Err(SourceError::Unavailable("bad block".into()))
            } else {
                Ok(RgbaImage::new(req.region.width, req.region.height))
            }
        })));
        let p = provider(&stack, 100);

        p.get_tiles(&Rect::new(0.0, 0.0, 15.0, 5.0));
        p.join();
        let tiles = p.get_tiles(&Rect::new(0.0, 0.0, 15.0, 5.0));

        assert_eq!(tiles[0].state, TileState::Failed);
        assert_eq!(tiles[0].progress, 0.5);
        assert_eq!(tiles[0].error, Some(SourceError::Unavailable("bad block".into())));
        assert!(tiles[0].image.is_none());
        assert_eq!(tiles[1].state, TileState::Ready);
        assert_eq!(p.stats().fetches_failed, 1);
    }

    #[test]
    fn test_panicking_source_becomes_error() {
        let stack = Arc::new(LayerStack::new());
        stack.add(Arc::new(FnSource::new(|_| panic!("decoder exploded"))));
        let p = provider(&stack, 100);

        p.get_tiles(&Rect::new(0.0, 0.0, 5.0, 5.0));
        assert!(p.join_timeout(TIMEOUT));
        let tiles = p.get_tiles(&Rect::new(0.0, 0.0, 5.0, 5.0));
        assert_eq!(
            tiles[0].error,
            Some(SourceError::Panicked("decoder exploded".into()))
        );
    }

    #[test]
    fn test_wrong_size_is_rejected() {
        let stack = Arc::new(LayerStack::new());
        stack.add(Arc::new(FnSource::new(|_| Ok(RgbaImage::new(1, 1)))));
        let p = provider(&stack, 100);

        p.get_tiles(&Rect::new(0.0, 0.0, 5.0, 5.0));
        p.join();
        let tiles = p.get_tiles(&Rect::new(0.0, 0.0, 5.0, 5.0));
        assert!(matches!(tiles[0].error, Some(SourceError::SizeMismatch { .. })));
    }

    #[test]
    fn test_opacity_change_recomposites_without_refetch() {
        let stack = Arc::new(LayerStack::new());
        let id = stack.add(Arc::new(ConstantSource::new(Rgba([0, 0, 0, 255]))));
        let p = provider(&stack, 100);
        let view = Rect::new(0.0, 0.0, 5.0, 5.0);

        p.get_tiles(&view);
        p.join();
        let issued = p.stats().fetches_issued;

        stack.set_opacity(id, 0.0);
        p.handle_stack_change(&StackChange::OpacityChanged { layer: id, opacity: 0.0 });
        p.get_tiles(&view);
        p.join();

        let tiles = p.get_tiles(&view);
        assert_eq!(p.stats().fetches_issued, issued);
        let image = tiles[0].image.as_ref().unwrap();
        assert!(image.pixels().all(|px| *px == Rgba([255, 255, 255, 255])));
    }

    #[test]
    fn test_set_dirty_region_only_hits_overlapping_tiles() {
        let stack = Arc::new(LayerStack::new());
        stack.add(Arc::new(ConstantSource::gray(1)));
        let p = provider(&stack, 100);

        p.get_tiles(&all());
        p.join();
        p.set_dirty(Some(Rect::new(12.0, 12.0, 2.0, 2.0)));

        let at = |id| p.tile_state(TileKey::new(SlicePosition::default(), id));
        assert_eq!(at(5), TileState::Stale);
        assert_eq!(at(0), TileState::Ready);
        assert_eq!(at(6), TileState::Ready);
    }

    #[test]
    fn test_set_cache_size_evicts_immediately() {
        let stack = Arc::new(LayerStack::new());
        stack.add(Arc::new(ConstantSource::gray(1)));
        let p = provider(&stack, 100);

        p.get_tiles(&all());
        p.get_tiles(&Rect::new(0.0, 0.0, 5.0, 5.0));
        p.set_cache_size(3);
        assert_eq!(p.len(), 3);
        assert_eq!(p.cache_size(), 3);
        assert!(p.contains(TileKey::new(SlicePosition::default(), 0)));
    }

    #[test]
    fn test_prefetch_keeps_its_own_pass_when_cache_is_short() {
        let stack = Arc::new(LayerStack::new());
        stack.add(Arc::new(ConstantSource::gray(1)));
        let p = provider(&stack, 8);
        let view = Rect::new(0.0, 0.0, 15.0, 15.0);

        // 4 tiles on screen and 3 slices ahead would need 16 slots.
        let frame = || {
            p.get_tiles(&view);
            for slice in 1..=3 {
                p.prefetch(&view, SlicePosition::new(0, slice, 0));
            }
            p.join();
            p.stats().fetches_issued
        };

        let issued: Vec<u64> = (0..4).map(|_| frame()).collect();
        assert_eq!(issued, vec![8, 8, 8, 8]);
        assert_eq!(p.stats().evictions, 0);
        assert_eq!(p.len(), 8);
        assert_eq!(
            p.tile_state(TileKey::new(SlicePosition::new(0, 1, 0), 5)),
            TileState::Ready
        );
        assert!(!p.contains(TileKey::new(SlicePosition::new(0, 2, 0), 0)));
    }

    #[test]
    fn test_prefetch_replaces_slots_from_earlier_passes() {
        let stack = Arc::new(LayerStack::new());
        stack.add(Arc::new(ConstantSource::gray(1)));
        let p = provider(&stack, 2);
        let view = Rect::new(0.0, 0.0, 5.0, 5.0);

        p.get_tiles(&view);
        p.prefetch(&view, SlicePosition::new(0, 1, 0));
        p.join();

        p.set_slice_position(SlicePosition::new(0, 1, 0));
        p.get_tiles(&view);
        p.prefetch(&view, SlicePosition::new(0, 2, 0));

        assert!(!p.contains(TileKey::new(SlicePosition::default(), 0)));
        assert!(p.contains(TileKey::new(SlicePosition::new(0, 2, 0), 0)));
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn test_stale_completion_ahead_of_view_is_refetched() {
        let (tx, rx) = mpsc::channel::<()>();
        let rx = parking_lot::Mutex::new(rx);
        let stack = Arc::new(LayerStack::new());
        let layer = stack.add(Arc::new(FnSource::new(move |req| {
            // Only the slice ahead of the view blocks.
            if req.through[1] == 1 {
                let _ = rx.lock().recv();
            }
            Ok(RgbaImage::new(req.region.width, req.region.height))
        })));
        let p = provider(&stack, 100);
        let view = Rect::new(0.0, 0.0, 5.0, 5.0);
        let ahead = TileKey::new(SlicePosition::new(0, 1, 0), 0);

        p.get_tiles(&view);
        p.prefetch(&view, ahead.through);
        p.invalidate_layer(layer, None);
        tx.send(()).unwrap();
        tx.send(()).unwrap();
        assert!(p.join_timeout(TIMEOUT));

        assert_eq!(p.tile_state(ahead), TileState::Ready);
        assert!(p.stats().stale_discarded >= 1);
    }

    #[test]
    fn test_published_tiles_are_announced() {
        let stack = Arc::new(LayerStack::new());
        stack.add(Arc::new(ConstantSource::gray(1)));
        let p = provider(&stack, 100);
        let rx = p.subscribe();

        p.get_tiles(&Rect::new(0.0, 0.0, 15.0, 5.0));
        // Tiles warmed for another slice are not on screen.
        p.prefetch(&Rect::new(0.0, 0.0, 15.0, 5.0), SlicePosition::new(0, 1, 0));
        p.join();
        assert_eq!(p.stats().composites, 4);

        let mut updated: Vec<IntRect> = rx
            .try_iter()
            .map(|event| match event {
                ViewEvent::TileUpdated(rect) => rect,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        updated.sort_by_key(|rect| rect.x);
        assert_eq!(
            updated,
            vec![IntRect::new(0, 0, 10, 10), IntRect::new(10, 0, 10, 10)]
        );

        // Nothing new to publish on a cached frame.
        p.get_tiles(&Rect::new(0.0, 0.0, 15.0, 5.0));
        p.join();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_results_after_stop_are_discarded() {
        let stack = Arc::new(LayerStack::new());
        let (source, release) = gated();
        stack.add(source);
        let p = provider(&stack, 100);

        p.get_tiles(&Rect::new(0.0, 0.0, 5.0, 5.0));
        p.notify_threads_to_stop();
        release.send(()).unwrap();
        p.join_threads();

        assert_eq!(p.stats().fetches_completed, 0);
        assert!(p.get_tiles(&Rect::new(0.0, 0.0, 5.0, 5.0))[0].image.is_none());
    }
}
