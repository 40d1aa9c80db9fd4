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

//! Froxel grid math shared by the light culling dispatch and the lighting
//! pass.
//!
//! The view frustum is cut into `x * y` screen tiles and `z` depth slices
//! spaced exponentially between the near and far planes. Each froxel owns a
//! fixed window of `max_lights_per_cluster` entries in the global index list,
//! so cluster `i` lists its lights at `indices[i * max ..]`.

use super::gpu_types::{GpuLight, LIGHT_TYPE_DIRECTIONAL};
use crate::config::ClusterConfig;
use crate::math::{Aabb, Mat4, Sphere, Vec3, Vec4};

/// The froxel grid layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterGrid {
    /// Tiles across, tiles down, depth slices.
    pub dims: [u32; 3],
    /// View distance of the first slice.
    pub near: f32,
    /// View distance of the end of the last slice.
    pub far: f32,
    /// Entries reserved per cluster in the index list.
    pub max_lights_per_cluster: u32,
}

impl ClusterGrid {
    /// The grid described by the configuration.
    pub fn from_config(config: &ClusterConfig) -> Self {
        Self {
            dims: [config.x, config.y, config.z],
            near: config.near,
            far: config.far,
            max_lights_per_cluster: config.max_lights_per_cluster,
        }
    }

    /// Number of clusters.
    pub fn cluster_count(&self) -> u32 {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Length of the global light-index list.
    pub fn index_capacity(&self) -> u32 {
        self.cluster_count() * self.max_lights_per_cluster
    }

    /// View distance where slice `k` starts: `near * (far / near)^(k / z)`.
    pub fn slice_start(&self, k: u32) -> f32 {
        self.near * (self.far / self.near).powf(k as f32 / self.dims[2] as f32)
    }

    /// Slice holding a point at positive view distance `depth`, clamped to
    /// the grid.
    pub fn slice_of(&self, depth: f32) -> u32 {
        if depth <= self.near {
            return 0;
        }
        let slices = self.dims[2] as f32;
        let k = (depth / self.near).ln() / (self.far / self.near).ln() * slices;
        (k.floor().max(0.0) as u32).min(self.dims[2] - 1)
    }

    /// Linear index of cluster `(x, y, z)`.
    pub fn index(&self, x: u32, y: u32, z: u32) -> u32 {
        x + y * self.dims[0] + z * self.dims[0] * self.dims[1]
    }

    /// `(x, y, z)` of a linear cluster index.
    pub fn coords(&self, index: u32) -> [u32; 3] {
        let plane = self.dims[0] * self.dims[1];
        [index % self.dims[0], (index % plane) / self.dims[0], index / plane]
    }

    /// Cluster of a pixel at positive view distance `depth`.
    pub fn cluster_of_pixel(&self, px: u32, py: u32, width: u32, height: u32, depth: f32) -> u32 {
        let x = (px * self.dims[0] / width.max(1)).min(self.dims[0] - 1);
        let y = (py * self.dims[1] / height.max(1)).min(self.dims[1] - 1);
        self.index(x, y, self.slice_of(depth))
    }

    /// View-space bounds of a froxel.
    ///
    /// The tile's corners are unprojected onto rays from the eye, which looks
    /// down `-z`, and clipped to the slice's depth range. Tile row 0 is the top
    /// of the screen.
    pub fn froxel_bounds(&self, coords: [u32; 3], inv_proj: &Mat4) -> Aabb {
        let [x, y, z] = coords;
        let ndc_x = |tx: u32| -1.0 + 2.0 * tx as f32 / self.dims[0] as f32;
        let ndc_y = |ty: u32| 1.0 - 2.0 * ty as f32 / self.dims[1] as f32;
        let near = self.slice_start(z);
        let far = self.slice_start(z + 1);

        let mut corners = [Vec3::ZERO; 8];
        let mut n = 0;
        for (cx, cy) in [(x, y), (x + 1, y), (x, y + 1), (x + 1, y + 1)] {
            let view = *inv_proj * Vec4::new(ndc_x(cx), ndc_y(cy), 0.0, 1.0);
            let on_ray = view.truncate() / view.w;
            // `on_ray.z` is negative in front of the eye.
            let dir = on_ray / -on_ray.z;
            corners[n] = dir * near;
            corners[n + 1] = dir * far;
            n += 2;
        }
        Aabb::from_points(&corners).unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO))
    }
}

/// View-space bounding sphere of a local light; `None` for directional
/// lights. Spot lights use their full range sphere.
pub fn light_sphere(light: &GpuLight, view: &Mat4) -> Option<Sphere> {
    if light.position_type[3] == LIGHT_TYPE_DIRECTIONAL {
        return None;
    }
    let [x, y, z, _] = light.position_type;
    let center = view.transform_point3(Vec3::new(x, y, z));
    Some(Sphere::new(center, light.color_range[3]))
}

/// Lights of one cluster, as written by the culling dispatch.
///
/// Returns `(offset, count)` and appends up to `max_lights_per_cluster` light
/// indices to `out`, in light order.
pub fn cull_cluster(
    grid: &ClusterGrid,
    cluster: u32,
    inv_proj: &Mat4,
    view: &Mat4,
    lights: &[GpuLight],
    out: &mut Vec<u32>,
) -> [u32; 2] {
    let bounds = grid.froxel_bounds(grid.coords(cluster), inv_proj);
    let offset = cluster * grid.max_lights_per_cluster;
    let mut count = 0;
    for (i, light) in lights.iter().enumerate() {
        if count == grid.max_lights_per_cluster {
            break;
        }
        let Some(sphere) = light_sphere(light, view) else {
            continue;
        };
        if sphere.intersects_aabb(&bounds) {
            out.push(i as u32);
            count += 1;
        }
    }
    [offset, count]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::FRAC_PI_2;
    use approx::assert_relative_eq;

    fn grid() -> ClusterGrid {
        ClusterGrid::from_config(&ClusterConfig::default())
    }

    fn point_light(position: Vec3, range: f32) -> GpuLight {
        GpuLight {
            position_type: [position.x, position.y, position.z, 1.0],
            direction_cos_inner: [0.0; 4],
            color_range: [1.0, 1.0, 1.0, range],
            params: [0.0, -1.0, 0.0, 0.0],
        }
    }

    #[test]
    fn test_exponential_slices() {
        let grid = grid();
        assert_relative_eq!(grid.slice_start(0), 0.1);
        assert_relative_eq!(grid.slice_start(24), 1000.0, max_relative = 1e-4);
        assert_relative_eq!(grid.slice_start(12), 10.0, max_relative = 1e-4);
        assert_eq!(grid.slice_of(0.05), 0);
        assert_eq!(grid.slice_of(10.5), 12);
        assert_eq!(grid.slice_of(5000.0), 23);
    }

    #[test]
    fn test_index_round_trip() {
        let grid = grid();
        assert_eq!(grid.cluster_count(), 16 * 9 * 24);
        let index = grid.index(3, 4, 5);
        assert_eq!(grid.coords(index), [3, 4, 5]);
        assert_eq!(grid.cluster_of_pixel(1279, 719, 1280, 720, 2000.0), grid.cluster_count() - 1);
    }

    #[test]
    fn test_froxel_bounds_follow_slices() {
        let grid = grid();
        let proj = Mat4::perspective_rh_zo(FRAC_PI_2, 16.0 / 9.0, 0.1, 1000.0).unwrap();
        let inv_proj = proj.inverse().unwrap();
        let bounds = grid.froxel_bounds([8, 4, 12], &inv_proj);
        assert_relative_eq!(-bounds.max.z, grid.slice_start(12), max_relative = 1e-3);
        assert_relative_eq!(-bounds.min.z, grid.slice_start(13), max_relative = 1e-3);
        // Tile 8 of 16 starts at the screen center.
        assert!(bounds.min.x >= -1e-3);
    }

    #[test]
    fn test_cull_respects_spheres_and_caps() {
        let mut grid = grid();
        let proj = Mat4::perspective_rh_zo(FRAC_PI_2, 16.0 / 9.0, 0.1, 1000.0).unwrap();
        let inv_proj = proj.inverse().unwrap();
        let view = Mat4::IDENTITY;
        // Straight ahead, about 10 units away, in the central tiles.
        let cluster = grid.cluster_of_pixel(640, 360, 1280, 720, 10.5);
        let lights = [
            point_light(Vec3::new(0.0, 0.0, -10.0), 1.0),
            point_light(Vec3::new(0.0, 0.0, 10.0), 1.0),
            point_light(Vec3::new(0.0, 0.0, -10.0), 2.0),
        ];
        let mut out = Vec::new();
        let [offset, count] = cull_cluster(&grid, cluster, &inv_proj, &view, &lights, &mut out);
        assert_eq!(offset, cluster * 256);
        assert_eq!(count, 2);
        assert_eq!(out, vec![0, 2]);

        grid.max_lights_per_cluster = 1;
        out.clear();
        let [_, count] = cull_cluster(&grid, cluster, &inv_proj, &view, &lights, &mut out);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_directional_lights_are_not_clustered() {
        let mut sun = point_light(Vec3::ZERO, 1.0e6);
        sun.position_type[3] = LIGHT_TYPE_DIRECTIONAL;
        assert!(light_sphere(&sun, &Mat4::IDENTITY).is_none());
    }
}
