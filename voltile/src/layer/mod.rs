//! Layer model and pixel sources.
//!
//! A layer is one visual contribution to a slice view: a [`PixelSource`]
//! plus visibility and opacity. The tile provider never talks to a
//! [`LayerStack`] directly; it asks a [`StackedSources`] implementation for a
//! [`StackSnapshot`] and fetches from the sources in it.
//!
//! Stack order is bottom first: index 0 is painted first, the last layer ends
//! up on top.

mod builtin;
mod source;
mod stack;

pub use builtin::{ConstantSource, FnSource, GradientSource};
pub(crate) use source::check_dimensions;
pub use source::{FetchRequest, PixelSource, SourceError};
pub use stack::{LayerId, LayerStack, LayerView, StackSnapshot, StackedSources};
