//! Layer stack model.

use super::source::PixelSource;
use crate::events::{EventBus, SceneEvent, StackChange};
use crate::geometry::IntRect;
use parking_lot::RwLock;
use std::fmt;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::debug;

/// Identifier of a layer, unique within one [`LayerStack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer-{}", self.0)
    }
}

/// One layer as seen by the tile provider.
#[derive(Clone)]
pub struct LayerView {
    pub id: LayerId,
    pub source: Arc<dyn PixelSource>,
    pub visible: bool,
    /// Opacity in `[0, 1]`.
    pub opacity: f32,
}

impl fmt::Debug for LayerView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerView")
            .field("id", &self.id)
            .field("visible", &self.visible)
            .field("opacity", &self.opacity)
            .finish_non_exhaustive()
    }
}

/// Consistent view of a layer stack at one version.
#[derive(Debug, Clone, Default)]
pub struct StackSnapshot {
    /// Bumped by every structural or appearance change.
    pub version: u64,
    /// Bottom layer first.
    pub layers: Vec<LayerView>,
}

impl StackSnapshot {
    pub fn visible(&self) -> impl Iterator<Item = &LayerView> {
        self.layers.iter().filter(|layer| layer.visible)
    }

    pub fn get(&self, id: LayerId) -> Option<&LayerView> {
        self.layers.iter().find(|layer| layer.id == id)
    }
}

/// Factory interface the tile provider pulls layer sources from.
pub trait StackedSources: Send + Sync {
    fn snapshot(&self) -> StackSnapshot;

    /// `(t, x, y, z, c)` shape of the volume the sources describe, if they
    /// know it. Changes are announced as [`StackChange::ShapeChanged`].
    fn shape(&self) -> Option<[usize; 5]> {
        None
    }
}

#[derive(Default)]
struct StackState {
    layers: Vec<LayerView>,
    version: u64,
    next_id: u64,
    shape: Option<[usize; 5]>,
}

impl StackState {
    fn position(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|layer| layer.id == id)
    }
}

/// Ordered, observable collection of layers.
///
/// Every mutation publishes a [`SceneEvent::LayerStackChanged`] to the
/// subscribers. Mutations that reference an unknown layer do nothing and
/// return `false`.
#[derive(Default)]
pub struct LayerStack {
    state: RwLock<StackState>,
    bus: EventBus,
}

impl fmt::Debug for LayerStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("LayerStack")
            .field("layers", &state.layers)
            .field("version", &state.version)
            .finish()
    }
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<SceneEvent> {
        self.bus.subscribe()
    }

    /// Add a visible, opaque layer on top of the stack.
    pub fn add(&self, source: Arc<dyn PixelSource>) -> LayerId {
        self.add_with(source, true, 1.0)
    }

    pub fn add_with(&self, source: Arc<dyn PixelSource>, visible: bool, opacity: f32) -> LayerId {
        let id = {
            let mut state = self.state.write();
            let id = LayerId(state.next_id);
            state.next_id += 1;
            state.layers.push(LayerView {
                id,
                source,
                visible,
                opacity: opacity.clamp(0.0, 1.0),
            });
            state.version += 1;
            id
        };
        debug!(layer = %id, "layer added");
        self.bus
            .emit(SceneEvent::LayerStackChanged(StackChange::Added(id)));
        id
    }

    pub fn remove(&self, id: LayerId) -> bool {
        {
            let mut state = self.state.write();
            let Some(index) = state.position(id) else {
                return false;
            };
            state.layers.remove(index);
            state.version += 1;
        }
        debug!(layer = %id, "layer removed");
        self.bus
            .emit(SceneEvent::LayerStackChanged(StackChange::Removed(id)));
        true
    }

    /// Move a layer to `index` (clamped to the top of the stack).
    pub fn move_to(&self, id: LayerId, index: usize) -> bool {
        {
            let mut state = self.state.write();
            let Some(from) = state.position(id) else {
                return false;
            };
            let to = index.min(state.layers.len() - 1);
            if from == to {
                return true;
            }
            let layer = state.layers.remove(from);
            state.layers.insert(to, layer);
            state.version += 1;
        }
        self.bus
            .emit(SceneEvent::LayerStackChanged(StackChange::Moved(id)));
        true
    }

    pub fn set_visible(&self, id: LayerId, visible: bool) -> bool {
        {
            let mut state = self.state.write();
            let Some(index) = state.position(id) else {
                return false;
            };
            if state.layers[index].visible == visible {
                return true;
            }
            state.layers[index].visible = visible;
            state.version += 1;
        }
        debug!(layer = %id, visible, "layer visibility changed");
        self.bus.emit(SceneEvent::LayerStackChanged(
            StackChange::VisibilityChanged { layer: id, visible },
        ));
        true
    }

    /// Flip visibility. Returns the new visibility, `None` for an unknown id.
    pub fn toggle_visible(&self, id: LayerId) -> Option<bool> {
        let visible = !self.layer(id)?.visible;
        self.set_visible(id, visible);
        Some(visible)
    }

    pub fn set_opacity(&self, id: LayerId, opacity: f32) -> bool {
        let opacity = opacity.clamp(0.0, 1.0);
        {
            let mut state = self.state.write();
            let Some(index) = state.position(id) else {
                return false;
            };
            if state.layers[index].opacity == opacity {
                return true;
            }
            state.layers[index].opacity = opacity;
            state.version += 1;
        }
        self.bus.emit(SceneEvent::LayerStackChanged(
            StackChange::OpacityChanged { layer: id, opacity },
        ));
        true
    }

    /// Announce that a layer's source now produces different pixels, either
    /// everywhere (`None`) or inside a data-space region.
    pub fn mark_dirty(&self, id: LayerId, region: Option<IntRect>) -> bool {
        if self.state.read().position(id).is_none() {
            return false;
        }
        self.bus.emit(SceneEvent::LayerStackChanged(
            StackChange::DataChanged { layer: id, region },
        ));
        true
    }

    /// Record the volume shape the layers' sources cover. Subscribers get a
    /// [`StackChange::ShapeChanged`] when it differs from the previous one.
    pub fn set_shape(&self, shape: [usize; 5]) {
        {
            let mut state = self.state.write();
            if state.shape == Some(shape) {
                return;
            }
            state.shape = Some(shape);
        }
        debug!(?shape, "layer stack shape changed");
        self.bus
            .emit(SceneEvent::LayerStackChanged(StackChange::ShapeChanged(shape)));
    }

    pub fn layer(&self, id: LayerId) -> Option<LayerView> {
        let state = self.state.read();
        state.position(id).map(|index| state.layers[index].clone())
    }

    pub fn ids(&self) -> Vec<LayerId> {
        self.state.read().layers.iter().map(|layer| layer.id).collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn version(&self) -> u64 {
        self.state.read().version
    }
}

impl StackedSources for LayerStack {
    fn snapshot(&self) -> StackSnapshot {
        let state = self.state.read();
        StackSnapshot {
            version: state.version,
            layers: state.layers.clone(),
        }
    }

    fn shape(&self) -> Option<[usize; 5]> {
        self.state.read().shape
    }
}
