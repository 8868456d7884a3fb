//! Planar geometry for the data → display mapping.
//!
//! Data coordinates address voxels of a 2D slice; display coordinates are
//! the scene plane the tiles are laid out on. The two are related by an
//! [`Affine`] transform which must be invertible for rendering to proceed.

use thiserror::Error;

/// Determinants smaller than this are treated as singular.
const SINGULAR_EPSILON: f64 = 1e-12;

/// Geometry errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// The transform collapses the plane and has no inverse.
    #[error("transform is not invertible (determinant = {determinant})")]
    NonInvertible { determinant: f64 },
}

/// Axis-aligned rectangle in floating point coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// A rectangle with no area never intersects anything.
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn area(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.width * self.height
        }
    }

    /// Intersection of two rectangles, `None` if they share no area.
    ///
    /// Rectangles that only touch along an edge do not intersect.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 > x0 && y1 > y0 {
            Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
        } else {
            None
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersection(other).is_some()
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Round outward to the enclosing integer grid.
    ///
    /// Coordinates within rounding noise of an integer snap to it first, so a
    /// transformed `310.0000000001` does not grow the rectangle by a pixel.
    pub fn to_int_outer(&self) -> IntRect {
        let x0 = snap_integer(self.x).floor();
        let y0 = snap_integer(self.y).floor();
        let x1 = snap_integer(self.right()).ceil();
        let y1 = snap_integer(self.bottom()).ceil();
        IntRect::new(
            x0 as i64,
            y0 as i64,
            (x1 - x0).max(0.0) as u32,
            (y1 - y0).max(0.0) as u32,
        )
    }
}

/// Axis-aligned rectangle on the integer pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IntRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl IntRect {
    pub fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i64 {
        self.x + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn intersection(&self, other: &IntRect) -> Option<IntRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 > x0 && y1 > y0 {
            Some(IntRect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32))
        } else {
            None
        }
    }

    pub fn intersects(&self, other: &IntRect) -> bool {
        self.intersection(other).is_some()
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(
            self.x as f64,
            self.y as f64,
            self.width as f64,
            self.height as f64,
        )
    }
}

/// 2D affine transform using the row-vector convention:
///
/// ```text
/// x' = m11·x + m21·y + dx
/// y' = m12·x + m22·y + dy
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub m11: f64,
    pub m12: f64,
    pub m21: f64,
    pub m22: f64,
    pub dx: f64,
    pub dy: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    pub fn new(m11: f64, m12: f64, m21: f64, m22: f64, dx: f64, dy: f64) -> Self {
        Self {
            m11,
            m12,
            m21,
            m22,
            dx,
            dy,
        }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    pub fn translate(dx: f64, dy: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, dx, dy)
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Transposes x and y.
    pub fn transposed_axes() -> Self {
        Self::new(0.0, 1.0, 1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation by `degrees`; positive angles turn clockwise in a y-down plane.
    pub fn rotation(degrees: f64) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        let (s, c) = (snap_unit(s), snap_unit(c));
        Self::new(c, s, -s, c, 0.0, 0.0)
    }

    pub fn determinant(&self) -> f64 {
        self.m11 * self.m22 - self.m12 * self.m21
    }

    pub fn is_invertible(&self) -> bool {
        self.determinant().abs() >= SINGULAR_EPSILON
    }

    /// Mirroring transforms (negative determinant) swap the display axes.
    pub fn is_axes_swapped(&self) -> bool {
        self.determinant() < 0.0
    }

    pub fn inverted(&self) -> Result<Affine, GeometryError> {
        let det = self.determinant();
        if det.abs() < SINGULAR_EPSILON {
            return Err(GeometryError::NonInvertible { determinant: det });
        }
        let m11 = self.m22 / det;
        let m12 = -self.m12 / det;
        let m21 = -self.m21 / det;
        let m22 = self.m11 / det;
        let dx = -(self.dx * m11 + self.dy * m21);
        let dy = -(self.dx * m12 + self.dy * m22);
        Ok(Affine::new(m11, m12, m21, m22, dx, dy))
    }

    /// `self` followed by `next`.
    pub fn then(&self, next: &Affine) -> Affine {
        Affine::new(
            self.m11 * next.m11 + self.m12 * next.m21,
            self.m11 * next.m12 + self.m12 * next.m22,
            self.m21 * next.m11 + self.m22 * next.m21,
            self.m21 * next.m12 + self.m22 * next.m22,
            self.dx * next.m11 + self.dy * next.m21 + next.dx,
            self.dx * next.m12 + self.dy * next.m22 + next.dy,
        )
    }

    pub fn map_point(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.m11 * x + self.m21 * y + self.dx,
            self.m12 * x + self.m22 * y + self.dy,
        )
    }

    /// Bounding box of the four mapped corners.
    pub fn map_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            self.map_point(rect.x, rect.y),
            self.map_point(rect.right(), rect.y),
            self.map_point(rect.x, rect.bottom()),
            self.map_point(rect.right(), rect.bottom()),
        ];
        let mut x0 = f64::INFINITY;
        let mut y0 = f64::INFINITY;
        let mut x1 = f64::NEG_INFINITY;
        let mut y1 = f64::NEG_INFINITY;
        for (x, y) in corners {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Rotate the scene by a quarter turn around the centre of `scene_rect`.
    ///
    /// `direction` is `-1` for left (counter-clockwise) and `+1` for right.
    /// The result keeps the rotated scene anchored at the origin.
    pub fn rotated_90(&self, scene_rect: &Rect, direction: i8) -> Affine {
        let direction = if direction < 0 { -1.0 } else { 1.0 };
        let (cx, cy) = scene_rect.center();
        let to_origin = Affine::translate(-cx, -cy);
        let rotate = Affine::rotation(direction * 90.0);
        // width and height trade places after a quarter turn
        let back = Affine::translate(cy, cx);
        self.then(&to_origin).then(&rotate).then(&back)
    }

    /// Transpose the display axes of a `data_shape` sized slice.
    ///
    /// The data keeps occupying the positive quadrant starting at the same
    /// corner it started from, so the scene rectangle stays anchored.
    pub fn swap_axes(&self, data_shape: (u32, u32)) -> Affine {
        let (ax, ay) = self.map_point(0.0, 0.0);
        let (bx, by) = self.map_point(data_shape.0 as f64, data_shape.1 as f64);
        let to_origin = Affine::translate(-ax, -ay);
        let (px, py) = self.then(&to_origin).map_point(1.0, 1.0);
        let (flip, dx, dy) = if px * py > 0.0 {
            (1.0, ay, ax)
        } else {
            (-1.0, by, bx)
        };
        let swap = Affine::new(0.0, flip, flip, 0.0, dx, dy);
        self.then(&to_origin).then(&swap)
    }
}

fn snap_integer(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < 1e-9 {
        r
    } else {
        v
    }
}

/// Snap values within rounding noise of 0 or ±1 so quarter turns stay exact.
fn snap_unit(v: f64) -> f64 {
    if v.abs() < 1e-12 {
        0.0
    } else if (v.abs() - 1.0).abs() < 1e-12 {
        v.signum()
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
    }

    #[test]
    fn test_rect_intersection_half_open() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 5.0, 5.0);
        assert!(a.intersection(&b).is_none(), "touching edges share no area");

        let c = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(a.intersection(&c), Some(Rect::new(5.0, 5.0, 5.0, 5.0)));
    }

    #[test]
    fn test_rect_union_ignores_empty() {
        let a = Rect::new(1.0, 1.0, 2.0, 2.0);
        assert_eq!(a.union(&Rect::default()), a);
        let b = Rect::new(-1.0, 0.0, 1.0, 1.0);
        assert_eq!(a.union(&b), Rect::new(-1.0, 0.0, 4.0, 3.0));
    }

    #[test]
    fn test_to_int_outer() {
        let r = Rect::new(0.5, 1.2, 2.0, 3.0).to_int_outer();
        assert_eq!(r, IntRect::new(0, 1, 3, 4));
    }

    #[test]
    fn test_to_int_outer_ignores_rounding_noise() {
        let r = Rect::new(-1e-12, 0.0, 310.000_000_000_1, 290.0).to_int_outer();
        assert_eq!(r, IntRect::new(0, 0, 310, 290));
    }

    #[test]
    fn test_int_rect_contains_is_half_open() {
        let r = IntRect::new(0, 0, 4, 4);
        assert!(r.contains(0, 0));
        assert!(r.contains(3, 3));
        assert!(!r.contains(4, 0));
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = Affine::new(2.0, 0.0, 0.0, 3.0, 5.0, -7.0);
        let inv = t.inverted().unwrap();
        let p = t.map_point(4.0, 9.0);
        assert!(approx(inv.map_point(p.0, p.1), (4.0, 9.0)));
    }

    #[test]
    fn test_singular_transform_rejected() {
        let t = Affine::new(1.0, 2.0, 2.0, 4.0, 0.0, 0.0);
        assert!(matches!(
            t.inverted(),
            Err(GeometryError::NonInvertible { .. })
        ));
        assert!(!t.is_invertible());
    }

    #[test]
    fn test_then_applies_left_to_right() {
        let t = Affine::translate(1.0, 0.0).then(&Affine::scale(2.0, 2.0));
        assert!(approx(t.map_point(0.0, 0.0), (2.0, 0.0)));
    }

    #[test]
    fn test_rotated_90_keeps_scene_anchored() {
        let scene = Rect::new(0.0, 0.0, 40.0, 20.0);
        let t = Affine::identity().rotated_90(&scene, 1);
        let mapped = t.map_rect(&scene);
        assert!((mapped.x).abs() < 1e-9 && (mapped.y).abs() < 1e-9);
        assert!((mapped.width - 20.0).abs() < 1e-9);
        assert!((mapped.height - 40.0).abs() < 1e-9);
        assert!(t.is_invertible());
    }

    #[test]
    fn test_four_right_rotations_are_identity() {
        let mut t = Affine::identity();
        let mut scene = Rect::new(0.0, 0.0, 30.0, 10.0);
        for _ in 0..4 {
            t = t.rotated_90(&scene, 1);
            scene = t.map_rect(&Rect::new(0.0, 0.0, 30.0, 10.0));
        }
        assert!(approx(t.map_point(3.0, 4.0), (3.0, 4.0)));
    }

    #[test]
    fn test_swap_axes_transposes_shape() {
        let t = Affine::identity().swap_axes((30, 10));
        let mapped = t.map_rect(&Rect::new(0.0, 0.0, 30.0, 10.0));
        assert!(approx((mapped.x, mapped.y), (0.0, 0.0)));
        assert!(approx((mapped.width, mapped.height), (10.0, 30.0)));
        assert!(t.is_axes_swapped());
    }

    #[test]
    fn test_swap_axes_twice_restores() {
        let once = Affine::identity().swap_axes((30, 10));
        let twice = once.swap_axes((30, 10));
        assert!(approx(twice.map_point(7.0, 2.0), (7.0, 2.0)));
        assert!(!twice.is_axes_swapped());
    }
}
