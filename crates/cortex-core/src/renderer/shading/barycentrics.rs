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

//! Perspective-correct barycentrics of a pixel from the clip-space
//! positions of its triangle, with their screen-space derivatives.
//!
//! This is the analytic derivative method of visibility-buffer shading: the
//! barycentric plane is expressed in NDC, evaluated at the pixel, and
//! corrected by the interpolated `1/w`.

use crate::math::{Vec2, Vec3, Vec4};

/// Barycentrics at a pixel and their change one pixel right and one down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Barycentrics {
    /// Weights of the three vertices, summing to one.
    pub lambda: Vec3,
    /// Change of `lambda` one pixel to the right.
    pub ddx: Vec3,
    /// Change of `lambda` one pixel down.
    pub ddy: Vec3,
}

impl Barycentrics {
    /// Interpolates a scalar attribute.
    #[inline]
    pub fn interpolate(&self, a: f32, b: f32, c: f32) -> f32 {
        a * self.lambda.x + b * self.lambda.y + c * self.lambda.z
    }

    /// Interpolates a 2-component attribute.
    #[inline]
    pub fn interpolate2(&self, a: Vec2, b: Vec2, c: Vec2) -> Vec2 {
        a * self.lambda.x + b * self.lambda.y + c * self.lambda.z
    }

    /// Interpolates a 3-component attribute.
    #[inline]
    pub fn interpolate3(&self, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
        a * self.lambda.x + b * self.lambda.y + c * self.lambda.z
    }

    /// Interpolates a 4-component attribute.
    #[inline]
    pub fn interpolate4(&self, a: Vec4, b: Vec4, c: Vec4) -> Vec4 {
        a * self.lambda.x + b * self.lambda.y + c * self.lambda.z
    }

    /// Screen-space derivatives of a 2-component attribute, for mip selection.
    pub fn derivatives2(&self, a: Vec2, b: Vec2, c: Vec2) -> (Vec2, Vec2) {
        let dx = a * self.ddx.x + b * self.ddx.y + c * self.ddx.z;
        let dy = a * self.ddy.x + b * self.ddy.y + c * self.ddy.z;
        (dx, dy)
    }
}

struct Plane {
    inv_w: Vec3,
    ndc0: Vec2,
    ddx: Vec3,
    ddy: Vec3,
}

impl Plane {
    fn new(p0: Vec4, p1: Vec4, p2: Vec4) -> Option<Self> {
        if p0.w.abs() < 1e-12 || p1.w.abs() < 1e-12 || p2.w.abs() < 1e-12 {
            return None;
        }
        let inv_w = Vec3::new(1.0 / p0.w, 1.0 / p1.w, 1.0 / p2.w);
        let ndc0 = Vec2::new(p0.x, p0.y) * inv_w.x;
        let ndc1 = Vec2::new(p1.x, p1.y) * inv_w.y;
        let ndc2 = Vec2::new(p2.x, p2.y) * inv_w.z;

        let a = ndc2 - ndc1;
        let b = ndc0 - ndc1;
        let det = a.x * b.y - a.y * b.x;
        if det.abs() < 1e-12 {
            return None;
        }
        let inv_det = 1.0 / det;
        let ddx = Vec3::new(ndc1.y - ndc2.y, ndc2.y - ndc0.y, ndc0.y - ndc1.y) * inv_det * inv_w;
        let ddy = Vec3::new(ndc2.x - ndc1.x, ndc0.x - ndc2.x, ndc1.x - ndc0.x) * inv_det * inv_w;
        Some(Self {
            inv_w,
            ndc0,
            ddx,
            ddy,
        })
    }

    fn eval(&self, ndc: Vec2) -> Vec3 {
        let d = ndc - self.ndc0;
        let ddx_sum = self.ddx.x + self.ddx.y + self.ddx.z;
        let ddy_sum = self.ddy.x + self.ddy.y + self.ddy.z;
        let interp_inv_w = self.inv_w.x + d.x * ddx_sum + d.y * ddy_sum;
        let w = 1.0 / interp_inv_w;
        Vec3::new(
            w * (self.inv_w.x + d.x * self.ddx.x + d.y * self.ddy.x),
            w * (d.x * self.ddx.y + d.y * self.ddy.y),
            w * (d.x * self.ddx.z + d.y * self.ddy.z),
        )
    }
}

/// Barycentrics of the pixel at `ndc` inside the triangle `p0 p1 p2`
/// (clip space) on a `width` x `height` target.
///
/// Returns `None` for degenerate triangles.
pub fn compute(p0: Vec4, p1: Vec4, p2: Vec4, ndc: Vec2, width: u32, height: u32) -> Option<Barycentrics> {
    let plane = Plane::new(p0, p1, p2)?;
    let step_x = 2.0 / width.max(1) as f32;
    let step_y = -2.0 / height.max(1) as f32;
    let lambda = plane.eval(ndc);
    let right = plane.eval(ndc + Vec2::new(step_x, 0.0));
    let down = plane.eval(ndc + Vec2::new(0.0, step_y));
    Some(Barycentrics {
        lambda,
        ddx: right - lambda,
        ddy: down - lambda,
    })
}

/// NDC of the center of pixel `(x, y)`, row 0 at the top.
#[inline]
pub fn pixel_to_ndc(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) / width as f32 * 2.0 - 1.0,
        1.0 - (y as f32 + 0.5) / height as f32 * 2.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Mat4;
    use approx::assert_relative_eq;

    #[test]
    fn test_vertices_get_unit_weights() {
        let p0 = Vec4::new(-1.0, -1.0, 0.5, 1.0);
        let p1 = Vec4::new(1.0, -1.0, 0.5, 1.0);
        let p2 = Vec4::new(0.0, 1.0, 0.5, 1.0);
        let b = compute(p0, p1, p2, Vec2::new(1.0, -1.0), 64, 64).unwrap();
        assert_relative_eq!(b.lambda.y, 1.0, epsilon = 1e-5);
        let c = compute(p0, p1, p2, Vec2::new(0.0, -1.0 / 3.0), 64, 64).unwrap();
        assert_relative_eq!(c.lambda.x, 1.0 / 3.0, epsilon = 1e-5);
        assert_relative_eq!(c.lambda.z, 1.0 / 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_perspective_correct_weights_recover_world_point() {
        let proj = Mat4::perspective_rh_zo(1.2, 1.0, 0.1, 100.0).unwrap();
        let world = [
            Vec3::new(-1.0, -1.0, -2.0),
            Vec3::new(1.0, -1.0, -8.0),
            Vec3::new(0.0, 1.5, -4.0),
        ];
        let weights = Vec3::new(0.2, 0.5, 0.3);
        let point = world[0] * weights.x + world[1] * weights.y + world[2] * weights.z;
        let clip = |p: Vec3| proj * p.extend(1.0);
        let p = clip(point);
        let ndc = Vec2::new(p.x / p.w, p.y / p.w);
        let b = compute(clip(world[0]), clip(world[1]), clip(world[2]), ndc, 128, 128).unwrap();
        assert_relative_eq!(b.lambda.x, weights.x, epsilon = 1e-4);
        assert_relative_eq!(b.lambda.y, weights.y, epsilon = 1e-4);
        assert_relative_eq!(b.lambda.z, weights.z, epsilon = 1e-4);
        assert_relative_eq!(b.lambda.x + b.lambda.y + b.lambda.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_affine_derivatives_are_constant() {
        let p0 = Vec4::new(-1.0, -1.0, 0.0, 1.0);
        let p1 = Vec4::new(1.0, -1.0, 0.0, 1.0);
        let p2 = Vec4::new(-1.0, 1.0, 0.0, 1.0);
        let b = compute(p0, p1, p2, pixel_to_ndc(3, 20, 32, 32), 32, 32).unwrap();
        // One pixel right moves 2/32 in NDC over a triangle 2 NDC wide.
        assert_relative_eq!(b.ddx.y, 1.0 / 32.0, epsilon = 1e-5);
        assert_relative_eq!(b.ddy.z, -1.0 / 32.0, epsilon = 1e-5);
        assert!(compute(p0, p0, p2, Vec2::ZERO, 32, 32).is_none());
    }
}
