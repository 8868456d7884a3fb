//! Layer compositing for one tile.

use crate::geometry::Affine;
use crate::tiling::Tile;
use image::{Rgba, RgbaImage};
use std::sync::Arc;

/// Build the display image of `tile` from per-layer pixels.
///
/// `layers` are bottom first; each image covers `tile.data_rect`. Every
/// display pixel samples its nearest data voxel through `inverse` and layers
/// are blended source-over with `alpha × opacity` onto `background`.
pub fn composite_tile(
    tile: &Tile,
    inverse: &Affine,
    background: Rgba<u8>,
    layers: &[(Arc<RgbaImage>, f32)],
) -> RgbaImage {
    let rect = tile.display_rect;
    let data = tile.data_rect;
    let base = [
        background[0] as f32,
        background[1] as f32,
        background[2] as f32,
        background[3] as f32 / 255.0,
    ];

    RgbaImage::from_fn(rect.width, rect.height, |x, y| {
        let (sx, sy) = inverse.map_point(
            (rect.x + x as i64) as f64 + 0.5,
            (rect.y + y as i64) as f64 + 0.5,
        );
        let (vx, vy) = (sx.floor() as i64, sy.floor() as i64);
        let mut out = base;
        if data.contains(vx, vy) {
            let (lx, ly) = ((vx - data.x) as u32, (vy - data.y) as u32);
            for (image, opacity) in layers {
                if lx >= image.width() || ly >= image.height() {
                    continue;
                }
                let p = image.get_pixel(lx, ly);
                let a = p[3] as f32 / 255.0 * opacity;
                for c in 0..3 {
                    out[c] = out[c] * (1.0 - a) + p[c] as f32 * a;
                }
                out[3] = a + out[3] * (1.0 - a);
            }
        }
        Rgba([
            out[0].round() as u8,
            out[1].round() as u8,
            out[2].round() as u8,
            (out[3] * 255.0).round() as u8,
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::IntRect;
    use crate::tiling::Tiling;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn layer(color: [u8; 4], w: u32, h: u32, opacity: f32) -> (Arc<RgbaImage>, f32) {
        (Arc::new(RgbaImage::from_pixel(w, h, Rgba(color))), opacity)
    }

    #[test]
    fn test_empty_stack_is_background() {
        let tiling = Tiling::new((8, 8), Affine::identity(), 8).unwrap();
        let img = composite_tile(tiling.tile(0).unwrap(), tiling.inverse(), WHITE, &[]);
        assert!(img.pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn test_opaque_top_layer_wins() {
        let tiling = Tiling::new((8, 8), Affine::identity(), 8).unwrap();
        let layers = [
            layer([10, 10, 10, 255], 8, 8, 1.0),
            layer([201, 201, 201, 255], 8, 8, 1.0),
        ];
        let img = composite_tile(tiling.tile(0).unwrap(), tiling.inverse(), WHITE, &layers);
        assert!(img.pixels().all(|p| *p == Rgba([201, 201, 201, 255])));
    }

    #[test]
    fn test_opacity_blends_over_background() {
        let tiling = Tiling::new((4, 4), Affine::identity(), 4).unwrap();
        let layers = [layer([0, 0, 0, 255], 4, 4, 0.5)];
        let img = composite_tile(tiling.tile(0).unwrap(), tiling.inverse(), WHITE, &layers);
        assert_eq!(*img.get_pixel(0, 0), Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn test_zero_opacity_is_invisible() {
        let tiling = Tiling::new((4, 4), Affine::identity(), 4).unwrap();
        let layers = [layer([0, 0, 0, 255], 4, 4, 0.0)];
        let img = composite_tile(tiling.tile(0).unwrap(), tiling.inverse(), WHITE, &layers);
        assert!(img.pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn test_scaled_tile_samples_nearest_voxel() {
        let tiling = Tiling::new((2, 1), Affine::scale(2.0, 2.0), 4).unwrap();
        let tile = tiling.tile(0).unwrap();
        assert_eq!(tile.data_rect, IntRect::new(0, 0, 2, 1));

        let mut data = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 255]));
        data.put_pixel(1, 0, Rgba([100, 100, 100, 255]));
        let img = composite_tile(tile, tiling.inverse(), WHITE, &[(Arc::new(data), 1.0)]);

        assert_eq!(img.dimensions(), (4, 2));
        assert_eq!(img.get_pixel(1, 1)[0], 0);
        assert_eq!(img.get_pixel(2, 0)[0], 100);
        assert_eq!(img.get_pixel(3, 1)[0], 100);
    }
}
