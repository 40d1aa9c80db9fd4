// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Column-major 4x4 matrices.

use std::ops::Mul;

use super::{Vec3, Vec4, EPSILON};

/// A 4x4 column-major matrix.
///
/// The memory layout matches HLSL's default `column_major` packing, so a
/// `Mat4` can be copied verbatim into a constant or structured buffer and used
/// as `mul(M, v)` by shaders.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Mat4 {
    /// The four columns.
    pub cols: [Vec4; 4],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        cols: [Vec4::X, Vec4::Y, Vec4::Z, Vec4::W],
    };

    /// Builds a matrix from its columns.
    #[inline]
    pub const fn from_cols(c0: Vec4, c1: Vec4, c2: Vec4, c3: Vec4) -> Self {
        Self {
            cols: [c0, c1, c2, c3],
        }
    }

    /// Builds a matrix from a column-major nested array.
    #[inline]
    pub const fn from_cols_array_2d(m: &[[f32; 4]; 4]) -> Self {
        Self::from_cols(
            Vec4::from_array(m[0]),
            Vec4::from_array(m[1]),
            Vec4::from_array(m[2]),
            Vec4::from_array(m[3]),
        )
    }

    /// The columns as nested arrays, ready for a GPU record.
    #[inline]
    pub const fn to_cols_array_2d(&self) -> [[f32; 4]; 4] {
        [
            self.cols[0].to_array(),
            self.cols[1].to_array(),
            self.cols[2].to_array(),
            self.cols[3].to_array(),
        ]
    }

    /// Row `index` of the matrix.
    #[inline]
    pub const fn row(&self, index: usize) -> Vec4 {
        Vec4::new(
            self.cols[0].get(index),
            self.cols[1].get(index),
            self.cols[2].get(index),
            self.cols[3].get(index),
        )
    }

    /// A translation by `t`.
    pub const fn from_translation(t: Vec3) -> Self {
        let mut m = Self::IDENTITY;
        m.cols[3] = Vec4::new(t.x, t.y, t.z, 1.0);
        m
    }

    /// A non-uniform scale.
    pub const fn from_scale(s: Vec3) -> Self {
        Self::from_cols(
            Vec4::new(s.x, 0.0, 0.0, 0.0),
            Vec4::new(0.0, s.y, 0.0, 0.0),
            Vec4::new(0.0, 0.0, s.z, 0.0),
            Vec4::W,
        )
    }

    /// A rotation of `angle` radians about the X axis.
    pub fn from_rotation_x(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_cols(
            Vec4::X,
            Vec4::new(0.0, c, s, 0.0),
            Vec4::new(0.0, -s, c, 0.0),
            Vec4::W,
        )
    }

    /// A rotation of `angle` radians about the Y axis.
    pub fn from_rotation_y(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_cols(
            Vec4::new(c, 0.0, -s, 0.0),
            Vec4::Y,
            Vec4::new(s, 0.0, c, 0.0),
            Vec4::W,
        )
    }

    /// A right-handed perspective projection mapping view depth to `[0, 1]`.
    ///
    /// Returns `None` for a non-positive near plane, `far <= near`, or a
    /// degenerate aspect ratio.
    pub fn perspective_rh_zo(fov_y: f32, aspect: f32, near: f32, far: f32) -> Option<Self> {
        if near <= 0.0 || far <= near || aspect <= EPSILON {
            return None;
        }
        let f = 1.0 / (fov_y * 0.5).tan();
        let range = far / (near - far);
        Some(Self::from_cols(
            Vec4::new(f / aspect, 0.0, 0.0, 0.0),
            Vec4::new(0.0, f, 0.0, 0.0),
            Vec4::new(0.0, 0.0, range, -1.0),
            Vec4::new(0.0, 0.0, range * near, 0.0),
        ))
    }

    /// A right-handed orthographic projection mapping view depth to `[0, 1]`.
    pub fn orthographic_rh_zo(
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let rw = 1.0 / (right - left);
        let rh = 1.0 / (top - bottom);
        let rd = 1.0 / (near - far);
        Self::from_cols(
            Vec4::new(2.0 * rw, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0 * rh, 0.0, 0.0),
            Vec4::new(0.0, 0.0, rd, 0.0),
            Vec4::new(-(left + right) * rw, -(top + bottom) * rh, near * rd, 1.0),
        )
    }

    /// A right-handed view matrix looking from `eye` at `target`.
    ///
    /// Returns `None` when `eye == target` or `up` is parallel to the view
    /// direction.
    pub fn look_at_rh(eye: Vec3, target: Vec3, up: Vec3) -> Option<Self> {
        let forward = (target - eye).normalize();
        let side = forward.cross(up).normalize();
        if forward == Vec3::ZERO || side == Vec3::ZERO {
            return None;
        }
        let up = side.cross(forward);
        Some(Self::from_cols(
            Vec4::new(side.x, up.x, -forward.x, 0.0),
            Vec4::new(side.y, up.y, -forward.y, 0.0),
            Vec4::new(side.z, up.z, -forward.z, 0.0),
            Vec4::new(-side.dot(eye), -up.dot(eye), forward.dot(eye), 1.0),
        ))
    }

    /// The transposed matrix.
    pub const fn transpose(&self) -> Self {
        Self::from_cols(self.row(0), self.row(1), self.row(2), self.row(3))
    }

    /// The inverse, or `None` for a singular matrix.
    ///
    /// Gauss-Jordan elimination with partial pivoting on a row-major copy.
    pub fn inverse(&self) -> Option<Self> {
        let mut a = [[0.0f32; 4]; 4];
        let mut inv = [[0.0f32; 4]; 4];
        for (r, row) in a.iter_mut().enumerate() {
            *row = self.row(r).to_array();
            inv[r][r] = 1.0;
        }

        for col in 0..4 {
            let pivot = (col..4)
                .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
                .unwrap_or(col);
            if a[pivot][col].abs() < EPSILON * EPSILON {
                return None;
            }
            a.swap(col, pivot);
            inv.swap(col, pivot);

            let scale = 1.0 / a[col][col];
            for c in 0..4 {
                a[col][c] *= scale;
                inv[col][c] *= scale;
            }
            for r in 0..4 {
                if r == col {
                    continue;
                }
                let factor = a[r][col];
                if factor == 0.0 {
                    continue;
                }
                for c in 0..4 {
                    a[r][c] -= factor * a[col][c];
                    inv[r][c] -= factor * inv[col][c];
                }
            }
        }

        // `inv` is row-major; transpose back into columns.
        Some(
            Self::from_cols(
                Vec4::from_array(inv[0]),
                Vec4::from_array(inv[1]),
                Vec4::from_array(inv[2]),
                Vec4::from_array(inv[3]),
            )
            .transpose(),
        )
    }

    /// Transforms a point (`w = 1`) without perspective division.
    #[inline]
    pub fn transform_point3(&self, p: Vec3) -> Vec3 {
        (*self * p.extend(1.0)).truncate()
    }

    /// Transforms a direction (`w = 0`).
    #[inline]
    pub fn transform_vector3(&self, v: Vec3) -> Vec3 {
        (*self * v.extend(0.0)).truncate()
    }

    /// Transforms a point and divides by the resulting `w`.
    #[inline]
    pub fn project_point3(&self, p: Vec3) -> Vec3 {
        let clip = *self * p.extend(1.0);
        clip.truncate() / clip.w
    }

    /// Inverse-transpose used to carry normals through non-uniform scale.
    /// Falls back to identity for a singular matrix.
    pub fn normal_matrix(&self) -> Self {
        let mut linear = *self;
        linear.cols[3] = Vec4::W;
        linear
            .inverse()
            .map(|inv| inv.transpose())
            .unwrap_or(Self::IDENTITY)
    }
}

impl Mul for Mat4 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::from_cols(
            self * rhs.cols[0],
            self * rhs.cols[1],
            self * rhs.cols[2],
            self * rhs.cols[3],
        )
    }
}

impl Mul<Vec4> for Mat4 {
    type Output = Vec4;

    #[inline]
    fn mul(self, v: Vec4) -> Vec4 {
        self.cols[0] * v.x + self.cols[1] * v.y + self.cols[2] * v.z + self.cols[3] * v.w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_mat_eq(a: &Mat4, b: &Mat4) {
        for c in 0..4 {
            for r in 0..4 {
                assert_abs_diff_eq!(a.cols[c].get(r), b.cols[c].get(r), epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_inverse_round_trip() {
        let m = Mat4::from_translation(Vec3::new(1.0, -2.0, 3.0))
            * Mat4::from_rotation_y(0.7)
            * Mat4::from_scale(Vec3::new(2.0, 0.5, 1.5));
        let inv = m.inverse().expect("invertible");
        assert_mat_eq(&(m * inv), &Mat4::IDENTITY);
    }

    #[test]
    fn test_singular_matrix_has_no_inverse() {
        let m = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        assert!(m.inverse().is_none());
    }

    #[test]
    fn test_perspective_maps_near_and_far_to_unit_depth() {
        let p = Mat4::perspective_rh_zo(FRAC_PI_2_TEST, 1.0, 0.1, 100.0).expect("valid");
        let near = p.project_point3(Vec3::new(0.0, 0.0, -0.1));
        let far = p.project_point3(Vec3::new(0.0, 0.0, -100.0));
        assert_abs_diff_eq!(near.z, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(far.z, 1.0, epsilon = 1e-5);
        assert!(Mat4::perspective_rh_zo(1.0, 1.0, 1.0, 0.5).is_none());
    }

    const FRAC_PI_2_TEST: f32 = std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_look_at_moves_eye_to_origin() {
        let eye = Vec3::new(0.0, 0.0, 5.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y).expect("valid");
        let p = view.transform_point3(eye);
        assert_abs_diff_eq!(p.length(), 0.0, epsilon = 1e-5);
        // The target lies down -Z in view space.
        let t = view.transform_point3(Vec3::ZERO);
        assert_abs_diff_eq!(t.z, -5.0, epsilon = 1e-5);
        assert!(Mat4::look_at_rh(eye, eye, Vec3::Y).is_none());
    }

    #[test]
    fn test_normal_matrix_undoes_non_uniform_scale() {
        let m = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let n = m.normal_matrix().transform_vector3(Vec3::new(1.0, 1.0, 0.0));
        assert_abs_diff_eq!(n.x, 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(n.y, 1.0, epsilon = 1e-5);
    }
}
