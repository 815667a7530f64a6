// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Minimal column-major 4×4 transform.
//!
//! Covers what node geometry, animation and hit testing need: composition,
//! point mapping with perspective divide, inversion, bounding-box mapping
//! and component-wise interpolation.

use core::ops::Mul;
#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;
use kurbo::{Point, Rect};

/// A column-major 4×4 transform stored as `[[f64; 4]; 4]`.
///
/// Each inner array is one *column* of the matrix, the same layout GPU APIs
/// use for uniform upload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform3d {
    /// Four columns, each a 4-element array `[x, y, z, w]`.
    pub cols: [[f64; 4]; 4],
}

impl Transform3d {
    /// The 4×4 identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Creates a transform from a column-major 2-D array.
    #[inline]
    #[must_use]
    pub const fn from_cols_array_2d(cols: [[f64; 4]; 4]) -> Self {
        Self { cols }
    }

    /// Returns column `i` (0-based).
    #[inline]
    #[must_use]
    pub const fn col(self, i: usize) -> [f64; 4] {
        self.cols[i]
    }

    /// Creates a pure translation.
    #[inline]
    #[must_use]
    pub const fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [x, y, z, 1.0],
            ],
        }
    }

    /// Creates a non-uniform scale.
    #[inline]
    #[must_use]
    pub const fn from_scale(sx: f64, sy: f64, sz: f64) -> Self {
        Self {
            cols: [
                [sx, 0.0, 0.0, 0.0],
                [0.0, sy, 0.0, 0.0],
                [0.0, 0.0, sz, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a rotation around the Z axis (radians).
    #[inline]
    #[must_use]
    pub fn from_rotation_z(radians: f64) -> Self {
        let (s, c) = (radians.sin(), radians.cos());
        Self {
            cols: [
                [c, s, 0.0, 0.0],
                [-s, c, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a perspective transform with eye distance `d` (the classic
    /// `m34 = -1/d` trick).
    #[inline]
    #[must_use]
    pub fn from_perspective(d: f64) -> Self {
        let mut t = Self::IDENTITY;
        t.cols[2][3] = -1.0 / d;
        t
    }

    /// Maps a point in the `z = 0` plane, applying the perspective divide.
    #[must_use]
    pub fn transform_point(&self, p: Point) -> Point {
        let c = &self.cols;
        let x = c[0][0] * p.x + c[1][0] * p.y + c[3][0];
        let y = c[0][1] * p.x + c[1][1] * p.y + c[3][1];
        let w = c[0][3] * p.x + c[1][3] * p.y + c[3][3];
        if w == 0.0 || w == 1.0 {
            Point::new(x, y)
        } else {
            Point::new(x / w, y / w)
        }
    }

    /// Maps the four corners of `rect` and returns their axis-aligned
    /// bounding box.
    #[must_use]
    pub fn transform_rect_bbox(&self, rect: Rect) -> Rect {
        let corners = [
            self.transform_point(Point::new(rect.x0, rect.y0)),
            self.transform_point(Point::new(rect.x1, rect.y0)),
            self.transform_point(Point::new(rect.x1, rect.y1)),
            self.transform_point(Point::new(rect.x0, rect.y1)),
        ];
        let mut out = Rect::from_points(corners[0], corners[1]);
        out = out.union_pt(corners[2]);
        out.union_pt(corners[3])
    }

    /// Returns the inverse, or `None` if the matrix is singular.
    ///
    /// Uses Gauss–Jordan elimination with partial pivoting.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        // Work in row-major: m[r][c].
        let mut m = [[0.0_f64; 8]; 4];
        for (r, row) in m.iter_mut().enumerate() {
            for c in 0..4 {
                row[c] = self.cols[c][r];
            }
            row[4 + r] = 1.0;
        }
        for pivot in 0..4 {
            let mut best = pivot;
            for r in pivot + 1..4 {
                if m[r][pivot].abs() > m[best][pivot].abs() {
                    best = r;
                }
            }
            if m[best][pivot].abs() < 1e-12 {
                return None;
            }
            m.swap(pivot, best);
            let inv = 1.0 / m[pivot][pivot];
            for v in &mut m[pivot] {
                *v *= inv;
            }
            for r in 0..4 {
                if r != pivot {
                    let factor = m[r][pivot];
                    if factor != 0.0 {
                        let src = m[pivot];
                        for (dst, s) in m[r].iter_mut().zip(src) {
                            *dst -= factor * s;
                        }
                    }
                }
            }
        }
        let mut out = Self::IDENTITY;
        for (r, row) in m.iter().enumerate() {
            for c in 0..4 {
                out.cols[c][r] = row[4 + c];
            }
        }
        Some(out)
    }

    /// Component-wise interpolation between `self` (at `t = 0`) and `other`.
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        let mut out = *self;
        for c in 0..4 {
            for r in 0..4 {
                out.cols[c][r] += (other.cols[c][r] - self.cols[c][r]) * t;
            }
        }
        out
    }

    /// Flattens to `f32` in column-major order for GPU upload.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "GPU uniforms are single precision"
    )]
    #[must_use]
    pub fn to_cols_f32(&self) -> [f32; 16] {
        let mut out = [0.0_f32; 16];
        for c in 0..4 {
            for r in 0..4 {
                out[c * 4 + r] = self.cols[c][r] as f32;
            }
        }
        out
    }

    /// Is every component [finite](f64::is_finite)?
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.cols.iter().flatten().all(|v| v.is_finite())
    }
}

impl Default for Transform3d {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Transform3d {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let a = &self.cols;
        let b = &rhs.cols;
        let mut out = [[0.0_f64; 4]; 4];
        for (j, col) in out.iter_mut().enumerate() {
            for (i, v) in col.iter_mut().enumerate() {
                *v = a[0][i] * b[j][0] + a[1][i] * b[j][1] + a[2][i] * b[j][2] + a[3][i] * b[j][3];
            }
        }
        Self { cols: out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn identity_multiply() {
        let t = Transform3d::from_translation(1.0, 2.0, 3.0);
        assert_eq!(Transform3d::IDENTITY * t, t);
        assert_eq!(t * Transform3d::IDENTITY, t);
    }

    #[test]
    fn scale_then_translate_maps_points() {
        let t = Transform3d::from_translation(3.0, 4.0, 0.0) * Transform3d::from_scale(2.0, 2.0, 1.0);
        assert!(close(t.transform_point(Point::new(1.0, 1.0)), Point::new(5.0, 6.0)));
    }

    #[test]
    fn inverse_round_trips_points() {
        let t = Transform3d::from_translation(10.0, -4.0, 0.0)
            * Transform3d::from_rotation_z(0.7)
            * Transform3d::from_scale(2.0, 0.5, 1.0);
        let inv = t.inverse().expect("invertible");
        let p = Point::new(13.0, 21.0);
        assert!(close(inv.transform_point(t.transform_point(p)), p));
    }

    #[test]
    fn singular_has_no_inverse() {
        assert!(Transform3d::from_scale(0.0, 1.0, 1.0).inverse().is_none());
    }

    #[test]
    fn bbox_of_rotated_square() {
        let t = Transform3d::from_rotation_z(core::f64::consts::FRAC_PI_2);
        let bbox = t.transform_rect_bbox(Rect::new(0.0, 0.0, 10.0, 20.0));
        assert!((bbox.x0 + 20.0).abs() < 1e-9, "{bbox:?}");
        assert!((bbox.y1 - 10.0).abs() < 1e-9, "{bbox:?}");
    }

    #[test]
    fn lerp_midpoint() {
        let a = Transform3d::from_translation(0.0, 0.0, 0.0);
        let b = Transform3d::from_translation(10.0, 20.0, 0.0);
        assert_eq!(a.lerp(&b, 0.5).col(3), [5.0, 10.0, 0.0, 1.0]);
    }

    #[test]
    fn nan_is_not_finite() {
        let mut t = Transform3d::IDENTITY;
        t.cols[2][1] = f64::NAN;
        assert!(!t.is_finite());
    }
}
