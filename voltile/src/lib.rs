//! voltile - tiled render cache for multi-layer 5D volume slice views
//!
//! A slice view cuts a 2D plane out of a `(t, x, y, z, c)` volume and
//! paints a stack of layers over it. voltile splits the view into fixed-size
//! tiles, fetches each layer's pixels for each tile on a worker pool,
//! composites finished tiles, and keeps the results in a bounded cache. While
//! the user scrolls, the slices ahead of them are fetched in the background.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use voltile::config::RenderConfig;
//! use voltile::layer::{ConstantSource, LayerStack};
//! use voltile::position::PositionModel;
//! use voltile::scene::SliceScene;
//!
//! let position = Arc::new(PositionModel::new([1, 512, 512, 64, 1]));
//! let layers = Arc::new(LayerStack::new());
//! layers.add(Arc::new(ConstantSource::gray(201)));
//!
//! let mut scene = SliceScene::new(position, layers, 2, RenderConfig::default())?;
//! let view = scene.scene_rect();
//! scene.render(&view);
//! scene.join_rendering();
//! let image = scene.render(&view);
//! # Ok::<(), voltile::scene::SceneError>(())
//! ```

pub mod bow_wave;
pub mod config;
pub mod events;
pub mod executor;
pub mod geometry;
pub mod indicator;
pub mod layer;
pub mod logging;
pub mod patch;
pub mod position;
pub mod provider;
pub mod scene;
pub mod tiling;

/// Version of the voltile library and CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
