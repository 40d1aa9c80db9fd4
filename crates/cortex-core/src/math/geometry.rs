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

//! Bounding volumes.

use super::{Mat4, Vec3, Vec4, EPSILON};

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// A box spanning `min..max`.
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// The tightest box enclosing `points`; `None` for an empty slice.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut aabb = Self::new(*first, *first);
        for p in rest {
            aabb.min = aabb.min.min(*p);
            aabb.max = aabb.max.max(*p);
        }
        Some(aabb)
    }

    /// The point of the box closest to `p`.
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        p.max(self.min).min(self.max)
    }

    /// Center of the box.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

/// A bounding sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Center of the sphere.
    pub center: Vec3,
    /// Radius of the sphere.
    pub radius: f32,
}

impl Sphere {
    /// A sphere at `center` with `radius`.
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// `true` when the sphere overlaps (or touches) `aabb`.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        let d = aabb.closest_point(self.center) - self.center;
        d.length_squared() <= self.radius * self.radius
    }

    /// The sphere enclosing this one after `m`, scaled by the largest axis
    /// scale so non-uniform transforms stay conservative.
    pub fn transformed(&self, m: &Mat4) -> Self {
        let scale = (0..3)
            .map(|i| m.cols[i].truncate().length_squared())
            .fold(0.0f32, f32::max)
            .sqrt();
        Self::new(m.transform_point3(self.center), self.radius * scale)
    }
}

/// The six clip planes of a view-projection matrix.
///
/// Each plane is `(normal, distance)` with the normal pointing inward; a
/// point `p` is inside when `normal.dot(p) + distance >= 0` for all six.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far.
    pub planes: [Vec4; 6],
}

impl Frustum {
    /// Extracts the planes of `view_proj`, for clip depth in `[0, 1]`.
    pub fn from_view_proj(view_proj: &Mat4) -> Self {
        let [r0, r1, r2, r3] = [0, 1, 2, 3].map(|i| view_proj.row(i));
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(|plane| {
            let length = plane.truncate().length();
            if length > EPSILON {
                plane / length
            } else {
                plane
            }
        });
        Self { planes }
    }

    /// `false` only when `sphere` lies entirely behind one of the planes.
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(sphere.center) + plane.w >= -sphere.radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::FRAC_PI_2;

    #[test]
    fn test_sphere_aabb_overlap() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(Sphere::new(Vec3::splat(0.5), 0.1).intersects_aabb(&aabb));
        assert!(Sphere::new(Vec3::new(2.0, 0.5, 0.5), 1.0).intersects_aabb(&aabb));
        assert!(!Sphere::new(Vec3::new(2.0, 2.0, 2.0), 1.0).intersects_aabb(&aabb));
    }

    #[test]
    fn test_frustum_keeps_spheres_in_view() {
        let proj = Mat4::perspective_rh_zo(FRAC_PI_2, 1.0, 0.1, 100.0).expect("valid projection");
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y)
            .expect("valid view");
        let frustum = Frustum::from_view_proj(&(proj * view));
        assert!(frustum.intersects_sphere(&Sphere::new(Vec3::ZERO, 0.5)));
        // Behind the camera.
        assert!(!frustum.intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, 8.0), 1.0)));
        // Far off to the side.
        assert!(!frustum.intersects_sphere(&Sphere::new(Vec3::new(40.0, 0.0, 0.0), 1.0)));
        // Straddling the left plane.
        assert!(frustum.intersects_sphere(&Sphere::new(Vec3::new(-5.5, 0.0, 0.0), 1.0)));
        // Past the far plane.
        assert!(!frustum.intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, -200.0), 1.0)));
    }

    #[test]
    fn test_transformed_sphere_takes_the_largest_scale() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0))
            * Mat4::from_scale(Vec3::new(1.0, 4.0, 2.0));
        let sphere = Sphere::new(Vec3::ZERO, 0.5).transformed(&m);
        assert_eq!(sphere.center, Vec3::new(1.0, 2.0, 3.0));
        assert!((sphere.radius - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_from_points() {
        assert!(Aabb::from_points(&[]).is_none());
        let aabb = Aabb::from_points(&[Vec3::new(1.0, -1.0, 0.0), Vec3::new(-1.0, 2.0, 3.0)])
            .expect("non-empty");
        assert_eq!(aabb.min, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(aabb.center(), Vec3::new(0.0, 0.5, 1.5));
    }
}
