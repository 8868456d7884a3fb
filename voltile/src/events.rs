//! Typed change notifications.
//!
//! Collaborators (layer stack, position model) publish [`SceneEvent`]s to
//! every subscriber over a channel. Subscribers drain their receiver on their
//! own update path, so nothing reacts behind the caller's back.
//!
//! ```text
//! LayerStack ──┐                       ┌──► SliceScene::process_events()
//!              ├─► EventBus::emit() ───┤
//! PositionModel┘                       └──► other subscribers
//!
//! TileProvider ─► EventBus<ViewEvent> ────► viewers (repaint requests)
//! SliceScene ───┘
//! ```

use crate::geometry::{IntRect, Rect};
use crate::layer::LayerId;
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

/// What changed in a layer stack.
#[derive(Debug, Clone, PartialEq)]
pub enum StackChange {
    Added(LayerId),
    Removed(LayerId),
    Moved(LayerId),
    VisibilityChanged { layer: LayerId, visible: bool },
    OpacityChanged { layer: LayerId, opacity: f32 },
    /// The layer's source produces different pixels now. `None` means the
    /// whole layer; otherwise a data-space region.
    DataChanged {
        layer: LayerId,
        region: Option<IntRect>,
    },
    /// The sources now describe a volume of this `(t, x, y, z, c)` shape.
    ShapeChanged([usize; 5]),
}

/// Change notifications consumed by a scene.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    /// The 5D shape `(t, x, y, z, c)` of the viewed volume changed.
    ShapeChanged([usize; 5]),
    LayerStackChanged(StackChange),
    /// Spatial cursor `(x, y, z)` moved.
    SlicingPositionChanged { new: [usize; 3], old: [usize; 3] },
    TimeChanged { new: usize, old: usize },
    ChannelChanged { new: usize, old: usize },
}

/// Notifications a scene sends to whoever paints it.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// A tile published a new image; repaint this display rectangle.
    TileUpdated(IntRect),
    /// The tiling was rebuilt and the scene now covers this rectangle.
    SceneRectChanged(Rect),
}

/// Fan-out of events to channel subscribers.
///
/// Subscribers whose receiver was dropped are pruned on the next emit.
#[derive(Debug)]
pub struct EventBus<E = SceneEvent> {
    subscribers: Mutex<Vec<Sender<E>>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn emit(&self, event: E) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_all_subscribers() {
        let bus: EventBus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.emit(SceneEvent::TimeChanged { new: 2, old: 1 });

        assert_eq!(a.try_recv().unwrap(), SceneEvent::TimeChanged { new: 2, old: 1 });
        assert_eq!(b.try_recv().unwrap(), SceneEvent::TimeChanged { new: 2, old: 1 });
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus: EventBus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(SceneEvent::ChannelChanged { new: 1, old: 0 });

        assert_eq!(bus.subscriber_count(), 1);
        assert!(keep.try_recv().is_ok());
    }

    #[test]
    fn test_view_events_use_their_own_bus() {
        let bus: EventBus<ViewEvent> = EventBus::new();
        let rx = bus.subscribe();

        bus.emit(ViewEvent::TileUpdated(IntRect::new(0, 0, 8, 8)));

        assert_eq!(rx.try_recv().unwrap(), ViewEvent::TileUpdated(IntRect::new(0, 0, 8, 8)));
    }
}
