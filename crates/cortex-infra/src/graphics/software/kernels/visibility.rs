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

//! `VisibilityBuffer.hlsl`: rasterizes instanced meshes and writes the
//! triangle, draw and instance of the nearest surface per pixel.

use cortex_core::math::{Vec2, Vec3, Vec4};
use cortex_core::renderer::bindless::INVALID_BINDLESS_INDEX;
use cortex_core::renderer::scene::bindings::visibility;
use cortex_core::renderer::scene::{
    VBInstanceData, VBMaterialConstants, VisibilityConstants, VisibilityPayload, TEX_BASE_COLOR,
};

use crate::graphics::recording::DrawCall;

use super::super::bindings::TextureView;
use super::super::raster;
use super::super::sampler;
use super::super::validation::Fault;
use super::{DrawContext, VisibilityPixel};

struct AlphaTest {
    material: VBMaterialConstants,
    texture: Option<TextureView>,
}

pub(super) fn draw(ctx: &mut DrawContext<'_>, pixel: Option<VisibilityPixel>) -> Result<(), Fault> {
    let label = ctx.pipeline.label.clone();
    let DrawCall::Indexed {
        index_count,
        instance_count,
        start_index,
        base_vertex,
        ..
    } = ctx.call
    else {
        return Err(Fault::new(format!("'{label}' only supports indexed draws")));
    };
    let (Some(vertices), Some(indices)) = (ctx.vertices.take(), ctx.indices.take()) else {
        return Err(Fault::new(format!(
            "'{label}' draws without a vertex or index buffer bound"
        )));
    };
    let position_offset = ctx
        .attribute("POSITION")
        .ok_or_else(|| Fault::new(format!("'{label}' has no POSITION input")))?;
    let uv_offset = ctx.attribute("TEXCOORD");

    let constants: VisibilityConstants = ctx.bindings.constants(visibility::CONSTANTS)?;
    let instances = ctx
        .bindings
        .structured::<VBInstanceData>(visibility::INSTANCES)?;
    let materials = match pixel {
        Some(VisibilityPixel::AlphaTest) => Some(
            ctx.bindings
                .structured::<VBMaterialConstants>(visibility::MATERIALS)?,
        ),
        _ => None,
    };
    let linear_wrap = match materials {
        Some(_) => Some(ctx.bindings.sampler(0)?),
        None => None,
    };
    let mut raster_state = ctx.raster;
    raster_state.cull = ctx.pipeline.cull_mode;

    for local in 0..instance_count {
        let instance_id = constants.instance_base + local;
        let instance = instances.get(instance_id)?;
        let alpha = match &materials {
            Some(materials) => {
                let material = materials.get(instance.material_index)?;
                let index = material.tex_idx[TEX_BASE_COLOR];
                let texture = if index == INVALID_BINDLESS_INDEX {
                    None
                } else {
                    Some(ctx.bindings.heap_texture(index)?)
                };
                Some(AlphaTest { material, texture })
            }
            None => None,
        };
        let transform = constants.view_proj * instance.world_matrix;

        for triangle in 0..index_count / 3 {
            let mut clip = [Vec4::ZERO; 3];
            let mut uv = [Vec2::ZERO; 3];
            for k in 0..3 {
                let index = indices.get(start_index + triangle * 3 + k).unwrap_or(0);
                let vertex = index.wrapping_add_signed(base_vertex);
                let position = vertices
                    .read::<[f32; 3]>(vertex, position_offset)
                    .map_or(Vec3::ZERO, Vec3::from_array);
                clip[k as usize] = transform * position.extend(1.0);
                if let Some(offset) = uv_offset {
                    uv[k as usize] = vertices
                        .read::<[f32; 2]>(vertex, offset)
                        .map_or(Vec2::ZERO, |[u, v]| Vec2::new(u, v));
                }
            }
            let payload = VisibilityPayload {
                triangle,
                draw: constants.draw_index,
                instance: instance_id,
            }
            .pack();

            for fragment in raster::triangle(clip, &raster_state) {
                if !ctx.depth_passes(&fragment) {
                    continue;
                }
                if let (Some(test), Some(sampler)) = (&alpha, &linear_wrap) {
                    let b = fragment.barycentrics;
                    let texcoord = uv[0] * b.x + uv[1] * b.y + uv[2] * b.z;
                    let texel = test.texture.as_ref().map_or(1.0, |t| {
                        sampler::sample_level(t, sampler, texcoord, 0.0, 0).w
                    });
                    if test.material.base_color[3] * texel < test.material.alpha_cutoff() {
                        continue;
                    }
                }
                ctx.write_depth(&fragment);
                if pixel.is_some() {
                    ctx.target(0)?
                        .store_uint(fragment.x, fragment.y, [payload[0], payload[1], 0, 0]);
                }
            }
        }
    }
    Ok(())
}
