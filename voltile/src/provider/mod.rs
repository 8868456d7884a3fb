//! Tile provider: the per-tile render cache.
//!
//! The provider owns one cache slot per `(slice position, tile)` key. A slot
//! keeps the latest pixels of every layer, the composited display image of
//! the tile and a recency marker for eviction.
//!
//! # Tile lifecycle
//!
//! ```text
//!            get_tiles / prefetch
//!   Absent ─────────────────────────► Requested ──(all layers in,
//!     ▲                                  ▲          composited)──► Ready
//!     │ evicted                          │ next touch               │
//!     │                                  │                          │ invalidation
//!     └──────── any state             Stale ◄───────────────────────┘
//! ```
//!
//! A layer source failing moves the tile to `Failed` once nothing else is in
//! flight; the last good image stays on screen.
//!
//! # Threading
//!
//! Fetches and composites run on the provider's [`WorkerPool`]. The slot map
//! sits behind one lock; workers only take it to commit a result. Every
//! fetch carries the generation of the layer slot it was issued for, and a
//! completion whose generation no longer matches is dropped (and re-issued
//! if the tile is on screen). A composite is published only if the tile's
//! data version did not move while it was being built.
//!
//! [`WorkerPool`]: crate::executor::WorkerPool

mod composite;
mod engine;
mod slot;
mod types;

pub use composite::composite_tile;
pub use engine::TileProvider;
pub use types::{ProviderConfig, ProviderStats, TileKey, TileSnapshot, TileState};
