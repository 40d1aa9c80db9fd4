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

//! `MotionVectors.hlsl`: per-pixel screen-space velocity from the current
//! and previous transforms of the visible surface.

use cortex_core::math::Vec2;
use cortex_core::renderer::scene::bindings::motion_vectors;
use cortex_core::renderer::scene::{MotionVectorParams, VBInstanceData, VBMeshTableEntry};
use cortex_core::renderer::shading::barycentrics;

use super::super::validation::Fault;
use super::{geometry, DispatchContext};

fn ndc_to_pixel(ndc: Vec2, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (ndc.x * 0.5 + 0.5) * width as f32,
        (0.5 - ndc.y * 0.5) * height as f32,
    )
}

pub(super) fn run(ctx: &DispatchContext<'_>) -> Result<(), Fault> {
    let b = &ctx.bindings;
    let params: MotionVectorParams = b.constant_buffer(motion_vectors::PARAMS)?;
    let instances = b.structured::<VBInstanceData>(motion_vectors::INSTANCES)?;
    let meshes = b.structured::<VBMeshTableEntry>(motion_vectors::MESHES)?;
    let visibility = b.texture(motion_vectors::TARGETS, 0)?;
    let depth = b.texture(motion_vectors::TARGETS, 1)?;
    let mut velocity = b.rw_texture(motion_vectors::TARGETS, 2)?;

    let [width, height, ..] = params.dims;
    let (threads_x, threads_y) = ctx.threads_2d(motion_vectors::GROUP_SIZE);
    for y in 0..threads_y.min(height) {
        for x in 0..threads_x.min(width) {
            let mut motion = Vec2::ZERO;
            let z = depth.load(x as i32, y as i32, 0, 0)[0];
            if let (Some(payload), true) = (geometry::payload(&visibility, x, y), z < 1.0) {
                let instance = instances.get(payload.instance)?;
                let mesh = meshes.get(instance.mesh_index)?;
                let vertices = geometry::fetch_triangle(b, &mesh, &instance, payload.triangle)?;
                let clip =
                    geometry::clip_positions(&vertices, &instance.world_matrix, &params.view_proj);
                let ndc = barycentrics::pixel_to_ndc(x, y, width, height);
                if let Some(bary) =
                    barycentrics::compute(clip[0], clip[1], clip[2], ndc, width, height)
                {
                    let [v0, v1, v2] = &vertices;
                    let object = bary.interpolate3(v0.position, v1.position, v2.position);
                    let prev = params.prev_view_proj
                        * instance.prev_world_matrix
                        * object.extend(1.0);
                    if prev.w > 0.0 {
                        let prev_ndc = Vec2::new(prev.x / prev.w, prev.y / prev.w);
                        let current = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                        motion = current - ndc_to_pixel(prev_ndc, width, height);
                    }
                }
            }
            velocity.store(x, y, [motion.x, motion.y, 0.0, 0.0]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ndc_to_pixel_puts_row_zero_on_top() {
        let top_left = ndc_to_pixel(Vec2::new(-1.0, 1.0), 64, 32);
        assert_relative_eq!(top_left.x, 0.0);
        assert_relative_eq!(top_left.y, 0.0);
        let center = ndc_to_pixel(Vec2::ZERO, 64, 32);
        assert_relative_eq!(center.x, 32.0);
        assert_relative_eq!(center.y, 16.0);
    }
}
