//! Single-axis look-ahead ("bow wave") prefetch planning.
//!
//! The bow wave follows whichever of time, slice or channel the user moved
//! last and proposes the next `n` positions in that direction. It never
//! wraps around and never looks along other axes.

use crate::position::{SlicePosition, THROUGH_AXES};

/// Axis index of time within a [`SlicePosition`].
pub const TIME_AXIS: usize = 0;
/// Axis index of the sliced spatial axis.
pub const SLICE_AXIS: usize = 1;
/// Axis index of the channel.
pub const CHANNEL_AXIS: usize = 2;

/// Direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Course {
    pub axis: usize,
    /// `+1` or `-1`.
    pub sign: i8,
}

impl Default for Course {
    fn default() -> Self {
        Self {
            axis: SLICE_AXIS,
            sign: 1,
        }
    }
}

impl Course {
    pub fn new(axis: usize, sign: i8) -> Self {
        Self {
            axis,
            sign: if sign < 0 { -1 } else { 1 },
        }
    }

    fn from_delta(axis: usize, new: usize, old: usize) -> Self {
        Self::new(axis, if new < old { -1 } else { 1 })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BowWave {
    course: Course,
}

impl BowWave {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn course(&self) -> Course {
        self.course
    }

    pub fn on_time_changed(&mut self, new: usize, old: usize) {
        self.course = Course::from_delta(TIME_AXIS, new, old);
    }

    pub fn on_channel_changed(&mut self, new: usize, old: usize) {
        self.course = Course::from_delta(CHANNEL_AXIS, new, old);
    }

    /// `slicing_axis` is the spatial axis (0 = x, 1 = y, 2 = z) this view
    /// slices through.
    pub fn on_slicing_position_changed(&mut self, new: [usize; 3], old: [usize; 3], slicing_axis: usize) {
        self.course = Course::from_delta(SLICE_AXIS, new[slicing_axis], old[slicing_axis]);
    }

    /// Up to `n` positions ahead of `through` along the current course,
    /// nearest first, stopping at the first one outside `bounds`.
    pub fn targets(&self, through: SlicePosition, bounds: [usize; THROUGH_AXES], n: usize) -> Vec<SlicePosition> {
        let axis = self.course.axis;
        let bound = bounds[axis];
        let mut out = Vec::with_capacity(n);
        for d in 1..=n {
            let step = if self.course.sign < 0 {
                through[axis].checked_sub(d)
            } else {
                through[axis].checked_add(d)
            };
            let Some(m) = step.filter(|&m| m < bound) else {
                break;
            };
            let mut target = through;
            target[axis] = m;
            out.push(target);
        }
        out
    }
}
