//! Fixed-size tile grid over a transformed data slice.
//!
//! A [`Tiling`] is pure geometry: it is built once for a data shape and a
//! data → display transform and never mutated afterwards. Rotating, swapping
//! axes or changing the data shape builds a new tiling, and every cache entry
//! keyed by the old tile ids must be dropped with it.
//!
//! # Layout
//!
//! ```text
//!  bounding rect (display coordinates, integer aligned)
//!  ┌────────┬────────┬────┐
//!  │ id 0   │ id 1   │ 2  │   tiles are tile_size × tile_size,
//!  ├────────┼────────┼────┤   the last row / column is clipped
//!  │ id 3   │ id 4   │ 5  │
//!  └────────┴────────┴────┘
//! ```

use crate::geometry::{Affine, GeometryError, IntRect, Rect};
use thiserror::Error;

/// Default edge length of a tile in display pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Identifier of a tile, unique within one [`Tiling`].
///
/// Ids are row-major grid indices and are not stable across rebuilds.
pub type TileId = usize;

/// Errors raised while constructing a tiling.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TilingError {
    /// The data → display transform cannot be inverted.
    #[error("cannot tile through a degenerate transform: {0}")]
    Geometry(#[from] GeometryError),

    /// Tiles must have a positive edge length.
    #[error("tile size must be positive")]
    ZeroTileSize,
}

/// One cell of the tile grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub id: TileId,
    pub row: u32,
    pub col: u32,
    /// Display-space rectangle, integer aligned.
    pub display_rect: IntRect,
    /// Data-space voxels covering the tile, clipped to the data shape.
    /// Empty if the tile lies entirely outside the data.
    pub data_rect: IntRect,
}

/// Immutable tile grid covering `transform(data_shape)`.
#[derive(Debug, Clone)]
pub struct Tiling {
    tiles: Vec<Tile>,
    bounding: IntRect,
    transform: Affine,
    inverse: Affine,
    data_shape: (u32, u32),
    tile_size: u32,
    rows: u32,
    cols: u32,
}

impl Tiling {
    /// Build the grid for a `data_shape` slice seen through `transform`.
    ///
    /// # Errors
    ///
    /// Fails if the transform is not invertible or `tile_size` is zero. An
    /// empty data shape is valid and produces a tiling without tiles.
    pub fn new(
        data_shape: (u32, u32),
        transform: Affine,
        tile_size: u32,
    ) -> Result<Self, TilingError> {
        if tile_size == 0 {
            return Err(TilingError::ZeroTileSize);
        }
        let inverse = transform.inverted()?;

        let (w, h) = data_shape;
        if w == 0 || h == 0 {
            return Ok(Self {
                tiles: Vec::new(),
                bounding: IntRect::default(),
                transform,
                inverse,
                data_shape,
                tile_size,
                rows: 0,
                cols: 0,
            });
        }

        let data_bounds = IntRect::new(0, 0, w, h);
        let bounding = transform
            .map_rect(&Rect::new(0.0, 0.0, w as f64, h as f64))
            .to_int_outer();

        let cols = bounding.width.div_ceil(tile_size);
        let rows = bounding.height.div_ceil(tile_size);
        let mut tiles = Vec::with_capacity((rows * cols) as usize);

        for row in 0..rows {
            for col in 0..cols {
                let x = bounding.x + (col * tile_size) as i64;
                let y = bounding.y + (row * tile_size) as i64;
                let width = tile_size.min((bounding.right() - x) as u32);
                let height = tile_size.min((bounding.bottom() - y) as u32);
                let display_rect = IntRect::new(x, y, width, height);
                let data_rect = inverse
                    .map_rect(&display_rect.to_rect())
                    .to_int_outer()
                    .intersection(&data_bounds)
                    .unwrap_or_default();

                tiles.push(Tile {
                    id: tiles.len(),
                    row,
                    col,
                    display_rect,
                    data_rect,
                });
            }
        }

        Ok(Self {
            tiles,
            bounding,
            transform,
            inverse,
            data_shape,
            tile_size,
            rows,
            cols,
        })
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(id)
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Union of all tile rectangles.
    pub fn bounding_rect(&self) -> IntRect {
        self.bounding
    }

    pub fn transform(&self) -> &Affine {
        &self.transform
    }

    /// Display → data transform.
    pub fn inverse(&self) -> &Affine {
        &self.inverse
    }

    pub fn data_shape(&self) -> (u32, u32) {
        self.data_shape
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Grid dimensions as `(rows, cols)`.
    pub fn grid(&self) -> (u32, u32) {
        (self.rows, self.cols)
    }

    /// Ids of all tiles sharing area with `query`, in ascending (row-major)
    /// order.
    pub fn tiles_intersecting(&self, query: &Rect) -> Vec<TileId> {
        if self.tiles.is_empty() {
            return Vec::new();
        }
        let Some(hit) = query.intersection(&self.bounding.to_rect()) else {
            return Vec::new();
        };

        let ts = self.tile_size as f64;
        let bx = self.bounding.x as f64;
        let by = self.bounding.y as f64;
        let last_col = self.cols as i64 - 1;
        let last_row = self.rows as i64 - 1;

        let c0 = (((hit.x - bx) / ts).floor() as i64).clamp(0, last_col);
        let c1 = ((((hit.right() - bx) / ts).ceil() as i64) - 1).clamp(0, last_col);
        let r0 = (((hit.y - by) / ts).floor() as i64).clamp(0, last_row);
        let r1 = ((((hit.bottom() - by) / ts).ceil() as i64) - 1).clamp(0, last_row);

        let mut ids = Vec::with_capacity(((r1 - r0 + 1) * (c1 - c0 + 1)) as usize);
        for row in r0..=r1 {
            for col in c0..=c1 {
                ids.push((row * self.cols as i64 + col) as TileId);
            }
        }
        ids
    }
}
