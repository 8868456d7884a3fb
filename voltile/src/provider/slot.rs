//! Per-tile cache slot and its state machine.

use super::types::TileState;
use crate::layer::{LayerId, SourceError, StackSnapshot};
use crate::patch::TilePatch;
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::Arc;

/// Latest known pixels of one layer for one tile.
#[derive(Debug, Clone, Default)]
pub(crate) enum LayerData {
    #[default]
    Missing,
    InFlight,
    Ready(Arc<RgbaImage>),
    Failed(SourceError),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct LayerSlot {
    /// Bumped by every invalidation; completions carry the value they were
    /// issued with.
    pub generation: u64,
    pub data: LayerData,
}

impl LayerSlot {
    /// Forget the current pixels; an outstanding fetch becomes stale.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.data = LayerData::Missing;
    }
}

#[derive(Debug, Default)]
pub(crate) struct Slot {
    pub patch: TilePatch,
    pub layers: HashMap<LayerId, LayerSlot>,
    /// Data version of the composite currently being built, if any.
    pub composite_version: Option<u64>,
    pub recency: u64,
}

impl Slot {
    pub fn new(recency: u64) -> Self {
        Self {
            recency,
            ..Self::default()
        }
    }

    fn data(&self, layer: LayerId) -> Option<&LayerData> {
        self.layers.get(&layer).map(|slot| &slot.data)
    }

    /// Completed fraction of the visible layers, 1.0 with none visible.
    pub fn progress(&self, stack: &StackSnapshot) -> f32 {
        let mut total = 0usize;
        let mut ready = 0usize;
        for layer in stack.visible() {
            total += 1;
            if matches!(self.data(layer.id), Some(LayerData::Ready(_))) {
                ready += 1;
            }
        }
        if total == 0 {
            1.0
        } else {
            ready as f32 / total as f32
        }
    }

    pub fn error(&self, stack: &StackSnapshot) -> Option<SourceError> {
        stack.visible().find_map(|layer| match self.data(layer.id) {
            Some(LayerData::Failed(err)) => Some(err.clone()),
            _ => None,
        })
    }

    /// Pixels of every visible layer in stack order with their opacity, or
    /// `None` while any of them is not in yet.
    pub fn composite_inputs(&self, stack: &StackSnapshot) -> Option<Vec<(Arc<RgbaImage>, f32)>> {
        stack
            .visible()
            .map(|layer| match self.data(layer.id) {
                Some(LayerData::Ready(image)) => Some((Arc::clone(image), layer.opacity)),
                _ => None,
            })
            .collect()
    }

    pub fn state(&self, stack: &StackSnapshot) -> TileState {
        let mut in_flight = false;
        let mut failed = false;
        let mut all_ready = true;
        for layer in stack.visible() {
            match self.data(layer.id) {
                Some(LayerData::Ready(_)) => {}
                Some(LayerData::InFlight) => {
                    in_flight = true;
                    all_ready = false;
                }
                Some(LayerData::Failed(_)) => {
                    failed = true;
                    all_ready = false;
                }
                Some(LayerData::Missing) | None => all_ready = false,
            }
        }

        if in_flight {
            TileState::Requested
        } else if failed {
            TileState::Failed
        } else if all_ready && self.patch.is_current() {
            TileState::Ready
        } else if all_ready && self.composite_version == Some(self.patch.data_version()) {
            TileState::Requested
        } else {
            TileState::Stale
        }
    }

    /// Drop one layer's pixels and mark the display image out of date.
    pub fn invalidate_layer(&mut self, layer: LayerId) {
        self.layers.entry(layer).or_default().invalidate();
        self.patch.bump_data();
    }

    /// Drop every layer's pixels.
    pub fn invalidate_all(&mut self) {
        for layer in self.layers.values_mut() {
            layer.invalidate();
        }
        self.patch.bump_data();
    }
}
