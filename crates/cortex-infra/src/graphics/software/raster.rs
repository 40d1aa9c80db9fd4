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

//! Triangle setup and scan conversion.
//!
//! Triangles are clipped against the near plane, mapped through the viewport
//! with row 0 at the top, and sampled at pixel centers with the top-left fill
//! rule. Counter-clockwise triangles in NDC face the viewer.

use cortex_core::math::{Vec3, Vec4};
use cortex_core::renderer::api::{CullMode, Viewport};

const MIN_W: f32 = 1e-6;

/// A covered pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Fragment {
    pub x: u32,
    pub y: u32,
    /// Viewport depth.
    pub depth: f32,
    pub front_facing: bool,
    /// Perspective-correct weights of the three input vertices.
    pub barycentrics: Vec3,
}

/// Where fragments may land.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RasterState {
    pub viewport: Viewport,
    /// `[left, top, right, bottom)` in pixels, already intersected with the
    /// scissor and the render target.
    pub bounds: [i32; 4],
    pub cull: CullMode,
}

#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    position: Vec4,
    weights: Vec3,
}

#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    depth: f32,
    inv_w: f32,
    weights: Vec3,
}

fn clip(polygon: Vec<ClipVertex>, distance: impl Fn(Vec4) -> f32) -> Vec<ClipVertex> {
    let mut out = Vec::with_capacity(polygon.len() + 2);
    for (i, &current) in polygon.iter().enumerate() {
        let next = polygon[(i + 1) % polygon.len()];
        let d0 = distance(current.position);
        let d1 = distance(next.position);
        if d0 >= 0.0 {
            out.push(current);
        }
        if (d0 >= 0.0) != (d1 >= 0.0) {
            let t = d0 / (d0 - d1);
            out.push(ClipVertex {
                position: current.position.lerp(next.position, t),
                weights: current.weights.lerp(next.weights, t),
            });
        }
    }
    out
}

fn edge(a: &ScreenVertex, b: &ScreenVertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// Top and left edges own the pixels lying exactly on them.
fn owns_boundary(a: &ScreenVertex, b: &ScreenVertex) -> bool {
    let dy = b.y - a.y;
    (dy == 0.0 && b.x > a.x) || dy < 0.0
}

/// Fragments of the clip-space triangle `clip_positions`.
pub(crate) fn triangle(clip_positions: [Vec4; 3], state: &RasterState) -> Vec<Fragment> {
    let polygon = vec![
        ClipVertex {
            position: clip_positions[0],
            weights: Vec3::X,
        },
        ClipVertex {
            position: clip_positions[1],
            weights: Vec3::Y,
        },
        ClipVertex {
            position: clip_positions[2],
            weights: Vec3::Z,
        },
    ];
    let polygon = clip(polygon, |p| p.w - MIN_W);
    let polygon = clip(polygon, |p| p.z);
    if polygon.len() < 3 {
        return Vec::new();
    }

    let vp = state.viewport;
    let screen: Vec<ScreenVertex> = polygon
        .iter()
        .map(|v| {
            let inv_w = 1.0 / v.position.w;
            let ndc = v.position.truncate() * inv_w;
            ScreenVertex {
                x: vp.x + (ndc.x + 1.0) * 0.5 * vp.width,
                y: vp.y + (1.0 - ndc.y) * 0.5 * vp.height,
                depth: vp.min_depth + ndc.z * (vp.max_depth - vp.min_depth),
                inv_w,
                weights: v.weights,
            }
        })
        .collect();

    // Twice the signed area in edge-function orientation. The y flip makes
    // counter-clockwise NDC triangles negative.
    let mut area = 0.0;
    for i in 0..screen.len() {
        let a = &screen[i];
        let b = &screen[(i + 1) % screen.len()];
        area -= (b.x - a.x) * (b.y + a.y);
    }
    if area == 0.0 {
        return Vec::new();
    }
    let front_facing = area < 0.0;
    match state.cull {
        CullMode::Back if !front_facing => return Vec::new(),
        CullMode::Front if front_facing => return Vec::new(),
        _ => {}
    }

    let mut fragments = Vec::new();
    for i in 1..screen.len() - 1 {
        let mut tri = [screen[0], screen[i], screen[i + 1]];
        if front_facing {
            tri.swap(1, 2);
        }
        scan(&tri, state, front_facing, &mut fragments);
    }
    fragments
}

fn scan(tri: &[ScreenVertex; 3], state: &RasterState, front_facing: bool, out: &mut Vec<Fragment>) {
    let [v0, v1, v2] = tri;
    let area = edge(v0, v1, v2.x, v2.y);
    if area <= 0.0 {
        return;
    }
    let [left, top, right, bottom] = state.bounds;
    let min_x = (v0.x.min(v1.x).min(v2.x).floor() as i32).max(left);
    let max_x = (v0.x.max(v1.x).max(v2.x).ceil() as i32).min(right);
    let min_y = (v0.y.min(v1.y).min(v2.y).floor() as i32).max(top);
    let max_y = (v0.y.max(v1.y).max(v2.y).ceil() as i32).min(bottom);
    let owns = [owns_boundary(v1, v2), owns_boundary(v2, v0), owns_boundary(v0, v1)];
    let vp = state.viewport;

    for y in min_y..max_y {
        let py = y as f32 + 0.5;
        for x in min_x..max_x {
            let px = x as f32 + 0.5;
            let w = [edge(v1, v2, px, py), edge(v2, v0, px, py), edge(v0, v1, px, py)];
            let inside = w
                .iter()
                .zip(owns)
                .all(|(&e, own)| e > 0.0 || (e == 0.0 && own));
            if !inside {
                continue;
            }
            let l = [w[0] / area, w[1] / area, w[2] / area];
            let depth = l[0] * v0.depth + l[1] * v1.depth + l[2] * v2.depth;
            let inv_w = l[0] * v0.inv_w + l[1] * v1.inv_w + l[2] * v2.inv_w;
            let barycentrics = (v0.weights * (l[0] * v0.inv_w)
                + v1.weights * (l[1] * v1.inv_w)
                + v2.weights * (l[2] * v2.inv_w))
                / inv_w;
            out.push(Fragment {
                x: x as u32,
                y: y as u32,
                depth: depth.clamp(vp.min_depth, vp.max_depth),
                front_facing,
                barycentrics,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn state(size: u32, cull: CullMode) -> RasterState {
        RasterState {
            viewport: Viewport::from_size(size, size),
            bounds: [0, 0, size as i32, size as i32],
            cull,
        }
    }

    fn v(x: f32, y: f32) -> Vec4 {
        Vec4::new(x, y, 0.5, 1.0)
    }

    #[test]
    fn test_fullscreen_triangle_covers_every_pixel_once() {
        let frags = triangle([v(-1.0, -1.0), v(3.0, -1.0), v(-1.0, 3.0)], &state(16, CullMode::Back));
        assert_eq!(frags.len(), 256);
        assert!(frags.iter().all(|f| f.front_facing));
        assert_relative_eq!(frags[0].depth, 0.5);
    }

    #[test]
    fn test_shared_edge_is_rasterized_once() {
        let s = state(8, CullMode::None);
        let mut coverage = [0u32; 64];
        for tri in [
            [v(-1.0, -1.0), v(1.0, -1.0), v(1.0, 1.0)],
            [v(-1.0, -1.0), v(1.0, 1.0), v(-1.0, 1.0)],
        ] {
            for f in triangle(tri, &s) {
                coverage[(f.y * 8 + f.x) as usize] += 1;
            }
        }
        assert!(coverage.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_back_faces_are_culled() {
        let clockwise = [v(-1.0, -1.0), v(-1.0, 3.0), v(3.0, -1.0)];
        assert!(triangle(clockwise, &state(4, CullMode::Back)).is_empty());
        let frags = triangle(clockwise, &state(4, CullMode::None));
        assert_eq!(frags.len(), 16);
        assert!(frags.iter().all(|f| !f.front_facing));
    }

    #[test]
    fn test_barycentrics_sum_to_one_after_near_clip() {
        let tri = [
            Vec4::new(-1.0, -1.0, -0.5, 0.5),
            Vec4::new(1.0, -1.0, 0.5, 1.0),
            Vec4::new(0.0, 1.0, 0.5, 1.0),
        ];
        let frags = triangle(tri, &state(32, CullMode::None));
        assert!(!frags.is_empty());
        for f in frags {
            let b = f.barycentrics;
            assert_relative_eq!(b.x + b.y + b.z, 1.0, epsilon = 1e-4);
            assert!(f.depth >= 0.0);
        }
    }
}
