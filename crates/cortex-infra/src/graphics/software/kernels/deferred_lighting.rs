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

//! `DeferredLighting.hlsl`: fullscreen shading of the G-buffer with the sun,
//! the pixel's cluster of local lights and image-based lighting.

use cortex_core::math::{Vec2, Vec3, Vec4};
use cortex_core::renderer::api::StaticSampler;
use cortex_core::renderer::scene::bindings::deferred_lighting as dl;
use cortex_core::renderer::scene::{
    ClusterGrid, DeferredLightingParams, GpuLight, VBReflectionProbe, LIGHT_TYPE_SPOT,
};
use cortex_core::renderer::shading::{attenuation, barycentrics, equirect, Surface};

use crate::graphics::recording::DrawCall;

use super::super::bindings::{Bindings, StructuredBuffer, TextureView};
use super::super::raster;
use super::super::sampler;
use super::super::validation::Fault;
use super::DrawContext;

fn xyz(v: [f32; 4]) -> Vec3 {
    Vec3::new(v[0], v[1], v[2])
}

/// `SV_VertexID` to the clip position of the fullscreen triangle.
fn fullscreen_vertex(id: u32) -> Vec4 {
    let u = ((id << 1) & 2) as f32;
    let v = (id & 2) as f32;
    Vec4::new(u * 2.0 - 1.0, 1.0 - v * 2.0, 0.0, 1.0)
}

struct Environment {
    diffuse: TextureView,
    specular: TextureView,
    max_mip: f32,
    intensity: f32,
}

struct Inputs<'b, 'a> {
    bindings: &'b Bindings<'a>,
    params: DeferredLightingParams,
    lights: StructuredBuffer<GpuLight>,
    probes: StructuredBuffer<VBReflectionProbe>,
    ranges: StructuredBuffer<[u32; 2]>,
    indices: StructuredBuffer<u32>,
    gbuffer: [TextureView; 5],
    depth: TextureView,
    sky: Environment,
    brdf_lut: TextureView,
    shadow_map: TextureView,
    linear_clamp: StaticSampler,
    shadow_sampler: StaticSampler,
    linear_wrap: StaticSampler,
    grid: ClusterGrid,
}

impl Inputs<'_, '_> {
    fn load(&self, plane: usize, x: u32, y: u32) -> Vec4 {
        Vec4::from_array(self.gbuffer[plane].load(x as i32, y as i32, 0, 0))
    }

    fn shade_pixel(&self, x: u32, y: u32) -> Result<[f32; 4], Fault> {
        let p = &self.params;
        let [width, height, ..] = p.screen_and_cluster;
        let ndc = barycentrics::pixel_to_ndc(x, y, width, height);
        let depth = self.depth.load(x as i32, y as i32, 0, 0)[0];
        let camera = xyz(p.camera_pos);
        let env_enabled = p.env_params[2] > 0.0;

        if depth >= 1.0 {
            if !env_enabled {
                return Ok([0.0, 0.0, 0.0, 1.0]);
            }
            let far = p.inv_view_proj.project_point3(Vec3::new(ndc.x, ndc.y, 1.0));
            let uv = equirect::direction_to_uv(far - camera);
            let sky = sampler::sample_level(&self.sky.specular, &self.linear_wrap, uv, 0.0, 0)
                .truncate()
                * p.env_params[1];
            return Ok([sky.x, sky.y, sky.z, 1.0]);
        }

        let albedo = self.load(0, x, y);
        let normal_roughness = self.load(1, x, y);
        let emissive_metallic = self.load(2, x, y);
        let ext0 = self.load(3, x, y);
        let ext1 = self.load(4, x, y);
        let surface = Surface {
            base_color: albedo.truncate(),
            metallic: emissive_metallic.w,
            roughness: normal_roughness.w,
            specular: ext0.z,
            ior: ext0.y,
            specular_color: ext1.truncate(),
            clearcoat: ext0.x,
            clearcoat_roughness: ext0.w,
            transmission: ext1.w,
        };
        let occlusion = albedo.w;
        let n = normal_roughness.truncate().normalize();
        let world = p.inv_view_proj.project_point3(Vec3::new(ndc.x, ndc.y, depth));
        let v = (camera - world).normalize();
        let mut color = emissive_metallic.truncate();

        let sun = xyz(p.sun_radiance);
        if sun.max_element() > 0.0 {
            let l = xyz(p.sun_dir).normalize();
            color += surface.shade(n, v, l, sun * self.sun_visibility(world));
        }

        let light_count = p.cluster_params[2];
        if light_count > 0 {
            let view_depth = -p.view.transform_point3(world).z;
            let cluster = self.grid.cluster_of_pixel(x, y, width, height, view_depth);
            let [offset, count] = self.ranges.get(cluster)?;
            for i in 0..count.min(self.grid.max_lights_per_cluster) {
                let index = self.indices.get(offset + i)?;
                if index >= light_count {
                    continue;
                }
                color += self.local_light(&surface, &self.lights.get(index)?, n, v, world);
            }
        }

        if env_enabled {
            let env = self.environment_at(world)?;
            let env = env.as_ref().unwrap_or(&self.sky);
            let n_dot_v = n.dot(v).clamp(0.0, 1.0);
            let r = n * (2.0 * n.dot(v)) - v;
            let irradiance = sampler::sample_level(
                &env.diffuse,
                &self.linear_wrap,
                equirect::direction_to_uv(n),
                0.0,
                0,
            )
            .truncate()
                * (p.env_params[0] * env.intensity);
            let prefiltered = sampler::sample_level(
                &env.specular,
                &self.linear_wrap,
                equirect::direction_to_uv(r),
                surface.specular_mip(env.max_mip),
                0,
            )
            .truncate()
                * (p.env_params[1] * env.intensity);
            let lut = sampler::sample_level(
                &self.brdf_lut,
                &self.linear_clamp,
                Vec2::new(n_dot_v, surface.roughness),
                0.0,
                0,
            );
            color += surface.ambient(n_dot_v, irradiance, prefiltered, [lut.x, lut.y]) * occlusion;
        }
        Ok([color.x, color.y, color.z, 1.0])
    }

    /// 3x3 PCF on cascade 0. Points outside the cascade are lit.
    fn sun_visibility(&self, world: Vec3) -> f32 {
        let p = &self.params;
        if p.shadow_params[2] <= 0.0 {
            return 1.0;
        }
        let clip = p.light_view_projection[0] * world.extend(1.0);
        if clip.w <= 0.0 {
            return 1.0;
        }
        let ndc = clip.truncate() / clip.w;
        let uv = Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
        if !(0.0..=1.0).contains(&uv.x) || !(0.0..=1.0).contains(&uv.y) || ndc.z > 1.0 {
            return 1.0;
        }
        let reference = ndc.z - p.shadow_params[0];
        let step = Vec2::new(
            p.shadow_inv_size_and_spec_max_mip[0],
            p.shadow_inv_size_and_spec_max_mip[1],
        ) * p.shadow_params[1];
        let mut lit = 0.0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let offset = Vec2::new(dx as f32 * step.x, dy as f32 * step.y);
                lit += sampler::sample_compare(
                    &self.shadow_map,
                    &self.shadow_sampler,
                    uv + offset,
                    0,
                    reference,
                );
            }
        }
        lit / 9.0
    }

    fn local_light(
        &self,
        surface: &Surface,
        light: &GpuLight,
        n: Vec3,
        v: Vec3,
        world: Vec3,
    ) -> Vec3 {
        let to_light = xyz(light.position_type) - world;
        let distance = to_light.length();
        if distance <= 0.0 {
            return Vec3::ZERO;
        }
        let l = to_light / distance;
        let mut falloff = attenuation::distance(distance, light.color_range[3]);
        if light.position_type[3] == LIGHT_TYPE_SPOT {
            let axis = xyz(light.direction_cos_inner).normalize();
            falloff *= attenuation::spot(
                (-l).dot(axis),
                light.direction_cos_inner[3],
                light.params[0],
            );
        }
        if falloff <= 0.0 {
            return Vec3::ZERO;
        }
        surface.shade(n, v, l, xyz(light.color_range) * falloff)
    }

    /// The nearest probe whose sphere contains `world`.
    fn environment_at(&self, world: Vec3) -> Result<Option<Environment>, Fault> {
        let mut best: Option<(f32, VBReflectionProbe)> = None;
        for i in 0..self.params.reflection_probe_params[1] {
            let probe = self.probes.get(i)?;
            let distance = (xyz(probe.position_radius) - world).length();
            if distance <= probe.position_radius[3]
                && best.map_or(true, |(d, _)| distance < d)
            {
                best = Some((distance, probe));
            }
        }
        let Some((_, probe)) = best else {
            return Ok(None);
        };
        Ok(Some(Environment {
            diffuse: self.bindings.heap_texture(probe.env_diffuse_index)?,
            specular: self.bindings.heap_texture(probe.env_specular_index)?,
            max_mip: probe.max_mip,
            intensity: probe.intensity,
        }))
    }
}

fn gather<'b, 'a>(b: &'b Bindings<'a>) -> Result<Inputs<'b, 'a>, Fault> {
    let params: DeferredLightingParams = b.constant_buffer(dl::PARAMS)?;
    let texture = |i: u32| b.texture(dl::TEXTURES, i);
    let grid = ClusterGrid {
        dims: [
            params.screen_and_cluster[2].max(1),
            params.screen_and_cluster[3].max(1),
            params.cluster_params[0].max(1),
        ],
        near: params.projection_params[2],
        far: params.projection_params[3],
        max_lights_per_cluster: params.cluster_params[1],
    };
    Ok(Inputs {
        bindings: b,
        lights: b.structured(dl::LIGHTS)?,
        probes: b.structured(dl::PROBES)?,
        ranges: b.structured(dl::CLUSTER_RANGES)?,
        indices: b.structured(dl::CLUSTER_INDICES)?,
        gbuffer: [
            texture(dl::TEX_ALBEDO)?,
            texture(dl::TEX_NORMAL_ROUGHNESS)?,
            texture(dl::TEX_EMISSIVE_METALLIC)?,
            texture(dl::TEX_MATERIAL_EXT0)?,
            texture(dl::TEX_MATERIAL_EXT1)?,
        ],
        depth: texture(dl::TEX_DEPTH)?,
        sky: Environment {
            diffuse: texture(dl::TEX_ENV_DIFFUSE)?,
            specular: texture(dl::TEX_ENV_SPECULAR)?,
            max_mip: params.shadow_inv_size_and_spec_max_mip[2],
            intensity: 1.0,
        },
        brdf_lut: texture(dl::TEX_BRDF_LUT)?,
        shadow_map: texture(dl::TEX_SHADOW_MAP)?,
        linear_clamp: b.sampler(0)?,
        shadow_sampler: b.sampler(1)?,
        linear_wrap: b.sampler(2)?,
        grid,
        params,
    })
}

pub(super) fn draw(ctx: &mut DrawContext<'_>) -> Result<(), Fault> {
    let DrawCall::Instanced {
        vertex_count,
        start_vertex,
        ..
    } = ctx.call
    else {
        return Err(Fault::new(format!(
            "'{}' is drawn without an index buffer",
            ctx.pipeline.label
        )));
    };
    let mut state = ctx.raster;
    state.cull = ctx.pipeline.cull_mode;
    let mut fragments = Vec::new();
    for first in (0..vertex_count / 3).map(|t| start_vertex + t * 3) {
        let clip = [
            fullscreen_vertex(first),
            fullscreen_vertex(first + 1),
            fullscreen_vertex(first + 2),
        ];
        fragments.extend(raster::triangle(clip, &state));
    }

    let mut colors = Vec::with_capacity(fragments.len());
    {
        let inputs = gather(&ctx.bindings)?;
        for fragment in &fragments {
            colors.push(inputs.shade_pixel(fragment.x, fragment.y)?);
        }
    }
    let target = ctx.target(0)?;
    for (fragment, color) in fragments.iter().zip(colors) {
        target.store(fragment.x, fragment.y, color);
    }
    Ok(())
}
