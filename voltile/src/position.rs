//! Slicing position of a 5D `(t, x, y, z, c)` volume.

use crate::events::{EventBus, SceneEvent};
use parking_lot::RwLock;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::mpsc::Receiver;

/// Number of axes a 2D slice view does not display: time, the sliced
/// spatial axis and channel.
pub const THROUGH_AXES: usize = 3;

/// Coordinates along the non-displayed axes of one 2D slice, in the order
/// `(time, sliced spatial axis, channel)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SlicePosition(pub [usize; THROUGH_AXES]);

impl SlicePosition {
    pub fn new(time: usize, slice: usize, channel: usize) -> Self {
        Self([time, slice, channel])
    }
}

impl Index<usize> for SlicePosition {
    type Output = usize;

    fn index(&self, axis: usize) -> &usize {
        &self.0[axis]
    }
}

impl IndexMut<usize> for SlicePosition {
    fn index_mut(&mut self, axis: usize) -> &mut usize {
        &mut self.0[axis]
    }
}

impl fmt::Display for SlicePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}:s{}:c{}", self.0[0], self.0[1], self.0[2])
    }
}

#[derive(Debug, Clone, Copy)]
struct PositionState {
    shape: [usize; 5],
    time: usize,
    channel: usize,
    slicing: [usize; 3],
}

/// Navigation state shared by all views of a volume.
///
/// Setters clamp into the shape and publish an event only when the value
/// actually changed.
#[derive(Debug)]
pub struct PositionModel {
    state: RwLock<PositionState>,
    bus: EventBus,
}

impl Default for PositionModel {
    fn default() -> Self {
        Self::new([0; 5])
    }
}

fn clamp_to(value: usize, extent: usize) -> usize {
    value.min(extent.saturating_sub(1))
}

impl PositionModel {
    pub fn new(shape: [usize; 5]) -> Self {
        Self {
            state: RwLock::new(PositionState {
                shape,
                time: 0,
                channel: 0,
                slicing: [0; 3],
            }),
            bus: EventBus::new(),
        }
    }

    pub fn subscribe(&self) -> Receiver<SceneEvent> {
        self.bus.subscribe()
    }

    pub fn shape5d(&self) -> [usize; 5] {
        self.state.read().shape
    }

    pub fn time(&self) -> usize {
        self.state.read().time
    }

    pub fn channel(&self) -> usize {
        self.state.read().channel
    }

    pub fn slicing_position(&self) -> [usize; 3] {
        self.state.read().slicing
    }

    /// Full 5D cursor `(t, x, y, z, c)`.
    pub fn slicing_pos5d(&self) -> [usize; 5] {
        let s = self.state.read();
        [s.time, s.slicing[0], s.slicing[1], s.slicing[2], s.channel]
    }

    pub fn set_shape(&self, shape: [usize; 5]) {
        {
            let mut s = self.state.write();
            if s.shape == shape {
                return;
            }
            s.shape = shape;
            s.time = clamp_to(s.time, shape[0]);
            for axis in 0..3 {
                s.slicing[axis] = clamp_to(s.slicing[axis], shape[axis + 1]);
            }
            s.channel = clamp_to(s.channel, shape[4]);
        }
        self.bus.emit(SceneEvent::ShapeChanged(shape));
    }

    pub fn set_time(&self, time: usize) {
        let (new, old) = {
            let mut s = self.state.write();
            let new = clamp_to(time, s.shape[0]);
            if new == s.time {
                return;
            }
            (new, std::mem::replace(&mut s.time, new))
        };
        self.bus.emit(SceneEvent::TimeChanged { new, old });
    }

    pub fn set_channel(&self, channel: usize) {
        let (new, old) = {
            let mut s = self.state.write();
            let new = clamp_to(channel, s.shape[4]);
            if new == s.channel {
                return;
            }
            (new, std::mem::replace(&mut s.channel, new))
        };
        self.bus.emit(SceneEvent::ChannelChanged { new, old });
    }

    pub fn set_slicing_position(&self, position: [usize; 3]) {
        let (new, old) = {
            let mut s = self.state.write();
            let mut new = position;
            for (axis, value) in new.iter_mut().enumerate() {
                *value = clamp_to(*value, s.shape[axis + 1]);
            }
            if new == s.slicing {
                return;
            }
            (new, std::mem::replace(&mut s.slicing, new))
        };
        self.bus.emit(SceneEvent::SlicingPositionChanged { new, old });
    }

    /// Move the cursor along one spatial axis (0 = x, 1 = y, 2 = z).
    pub fn change_slice_relative(&self, axis: usize, delta: isize) {
        let mut position = self.slicing_position();
        position[axis] = position[axis].saturating_add_signed(delta);
        self.set_slicing_position(position);
    }

    pub fn change_time_relative(&self, delta: isize) {
        self.set_time(self.time().saturating_add_signed(delta));
    }
}
