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

//! `MaterialResolve.hlsl`: rebuilds each visible surface from the
//! visibility buffer and writes the five G-buffer planes.

use cortex_core::math::{Vec2, Vec3, Vec4};
use cortex_core::renderer::api::StaticSampler;
use cortex_core::renderer::bindless::INVALID_BINDLESS_INDEX;
use cortex_core::renderer::scene::bindings::material_resolve;
use cortex_core::renderer::scene::{
    MaterialResolveParams, VBInstanceData, VBMaterialConstants, VBMeshTableEntry,
    TEX_BASE_COLOR, TEX_CLEARCOAT, TEX_EMISSIVE, TEX_METALLIC_ROUGHNESS, TEX_NORMAL,
    TEX_OCCLUSION, TEX_TRANSMISSION, Vertex,
};
use cortex_core::renderer::shading::barycentrics::{self, Barycentrics};

use super::super::bindings::{Bindings, RwTexture};
use super::super::sampler;
use super::super::validation::Fault;
use super::{geometry, DispatchContext};

const ALPHA_MODE_MASK: u32 = 1;

/// Values of one G-buffer texel, plane by plane.
struct GBufferTexel {
    albedo_occlusion: [f32; 4],
    normal_roughness: [f32; 4],
    emissive_metallic: [f32; 4],
    ext0: [f32; 4],
    ext1: [f32; 4],
}

impl GBufferTexel {
    const EMPTY: Self = Self {
        albedo_occlusion: [0.0; 4],
        normal_roughness: [0.0; 4],
        emissive_metallic: [0.0; 4],
        ext0: [0.0; 4],
        ext1: [0.0; 4],
    };
}

struct MaterialSampler<'b, 'a> {
    bindings: &'b Bindings<'a>,
    sampler: StaticSampler,
    uv: Vec2,
    ddx: Vec2,
    ddy: Vec2,
}

impl MaterialSampler<'_, '_> {
    fn sample(&self, index: u32) -> Result<Option<Vec4>, Fault> {
        if index == INVALID_BINDLESS_INDEX {
            return Ok(None);
        }
        let texture = self.bindings.heap_texture(index)?;
        Ok(Some(sampler::sample_grad(
            &texture,
            &self.sampler,
            self.uv,
            self.ddx,
            self.ddy,
        )))
    }
}

fn shade(
    bindings: &Bindings<'_>,
    material: &VBMaterialConstants,
    sampler: StaticSampler,
    bary: &Barycentrics,
    vertices: &[Vertex; 3],
    instance: &VBInstanceData,
    view_dir: Vec3,
) -> Result<Option<GBufferTexel>, Fault> {
    let [v0, v1, v2] = vertices;
    let uv = bary.interpolate2(v0.uv, v1.uv, v2.uv);
    let (ddx, ddy) = bary.derivatives2(v0.uv, v1.uv, v2.uv);
    let textures = MaterialSampler {
        bindings,
        sampler,
        uv,
        ddx,
        ddy,
    };
    let tex = &material.tex_idx;

    let mut base = Vec4::from_array(material.base_color);
    if let Some(texel) = textures.sample(tex[TEX_BASE_COLOR])? {
        base = base * texel;
    }
    if material.alpha_mode() == ALPHA_MODE_MASK && base.w < material.alpha_cutoff() {
        return Ok(None);
    }

    let normal = instance
        .normal_matrix
        .transform_vector3(bary.interpolate3(v0.normal, v1.normal, v2.normal))
        .normalize();
    let tangent4 = bary.interpolate4(v0.tangent, v1.tangent, v2.tangent);
    let mut n = normal;
    if material.specular_color_double_sided[3] > 0.5 && n.dot(view_dir) < 0.0 {
        n = -n;
    }
    if let Some(texel) = textures.sample(tex[TEX_NORMAL])? {
        let t = instance.world_matrix.transform_vector3(tangent4.truncate());
        let t = (t - n * n.dot(t)).normalize();
        let sign = if tangent4.w < 0.0 { -1.0 } else { 1.0 };
        let b = n.cross(t) * sign;
        let ts = texel.truncate() * 2.0 - Vec3::ONE;
        let mapped = (t * ts.x + b * ts.y + n * ts.z).normalize();
        if mapped.length_squared() > 0.0 {
            n = mapped;
        }
    }

    let [roughness, specular, ior, clearcoat] = material.roughness_specular_ior_clearcoat;
    let [clearcoat_roughness, transmission, ..] =
        material.clearcoat_roughness_transmission_cutoff_mode;
    let mut metallic = material.metallic();
    let mut roughness = roughness;
    if let Some(texel) = textures.sample(tex[TEX_METALLIC_ROUGHNESS])? {
        roughness *= texel.y;
        metallic *= texel.z;
    }
    let mut emissive = Vec3::new(
        material.emissive_metallic[0],
        material.emissive_metallic[1],
        material.emissive_metallic[2],
    );
    if let Some(texel) = textures.sample(tex[TEX_EMISSIVE])? {
        emissive = emissive * texel.truncate();
    }
    let occlusion = textures.sample(tex[TEX_OCCLUSION])?.map_or(1.0, |t| t.x);
    let (clearcoat, clearcoat_roughness) = match textures.sample(tex[TEX_CLEARCOAT])? {
        Some(t) => (clearcoat * t.x, clearcoat_roughness * t.y),
        None => (clearcoat, clearcoat_roughness),
    };
    let transmission =
        transmission * textures.sample(tex[TEX_TRANSMISSION])?.map_or(1.0, |t| t.x);
    let [sr, sg, sb, _] = material.specular_color_double_sided;

    Ok(Some(GBufferTexel {
        albedo_occlusion: [base.x, base.y, base.z, occlusion],
        normal_roughness: [n.x, n.y, n.z, roughness],
        emissive_metallic: [emissive.x, emissive.y, emissive.z, metallic],
        ext0: [clearcoat, ior, specular, clearcoat_roughness],
        ext1: [sr, sg, sb, transmission],
    }))
}

pub(super) fn run(ctx: &DispatchContext<'_>) -> Result<(), Fault> {
    let b = &ctx.bindings;
    let params: MaterialResolveParams = b.constant_buffer(material_resolve::PARAMS)?;
    let instances = b.structured::<VBInstanceData>(material_resolve::INSTANCES)?;
    let meshes = b.structured::<VBMeshTableEntry>(material_resolve::MESHES)?;
    let materials = b.structured::<VBMaterialConstants>(material_resolve::MATERIALS)?;
    let visibility = b.texture(material_resolve::TARGETS, 0)?;
    let depth = b.texture(material_resolve::TARGETS, 1)?;
    let mut planes: Vec<RwTexture> = (2..material_resolve::TARGETS_LEN)
        .map(|i| b.rw_texture(material_resolve::TARGETS, i))
        .collect::<Result<_, _>>()?;
    let sampler = b.sampler(0)?;

    let width = params.screen[0] as u32;
    let height = params.screen[1] as u32;
    let camera = Vec3::new(params.camera_pos[0], params.camera_pos[1], params.camera_pos[2]);
    let (threads_x, threads_y) = ctx.threads_2d(material_resolve::GROUP_SIZE);

    for y in 0..threads_y.min(height) {
        for x in 0..threads_x.min(width) {
            let texel = match geometry::payload(&visibility, x, y) {
                None => GBufferTexel::EMPTY,
                Some(payload) => {
                    let instance = instances.get(payload.instance)?;
                    let mesh = meshes.get(instance.mesh_index)?;
                    let material = materials.get(instance.material_index)?;
                    let vertices =
                        geometry::fetch_triangle(b, &mesh, &instance, payload.triangle)?;
                    let clip = geometry::clip_positions(
                        &vertices,
                        &instance.world_matrix,
                        &params.view_proj,
                    );
                    let ndc = barycentrics::pixel_to_ndc(x, y, width, height);
                    let z = depth.load(x as i32, y as i32, 0, 0)[0];
                    let world = geometry::world_position(&params.inv_view_proj, ndc, z);
                    let view_dir = (camera - world).normalize();
                    let bary =
                        barycentrics::compute(clip[0], clip[1], clip[2], ndc, width, height);
                    match bary {
                        Some(bary) => {
                            shade(b, &material, sampler, &bary, &vertices, &instance, view_dir)?
                                .unwrap_or(GBufferTexel::EMPTY)
                        }
                        None => GBufferTexel::EMPTY,
                    }
                }
            };
            let values = [
                texel.albedo_occlusion,
                texel.normal_roughness,
                texel.emissive_metallic,
                texel.ext0,
                texel.ext1,
            ];
            for (plane, value) in planes.iter_mut().zip(values) {
                plane.store(x, y, value);
            }
        }
    }
    Ok(())
}
