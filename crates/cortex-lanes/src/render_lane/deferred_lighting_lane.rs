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

//! Deferred lighting: one fullscreen triangle shading every G-buffer texel
//! into the HDR target.

use std::sync::Arc;

use cortex_core::config::RendererConfig;
use cortex_core::math::{Mat4, Vec3};
use cortex_core::renderer::api::{
    CullMode, DepthState, DescriptorHeapType, Format, GraphicsPipelineDesc, PipelineBindPoint,
    PipelineId, PrimitiveTopology, RenderTargetViewDesc, RootSignatureId, ScissorRect,
    ShaderResourceViewDesc, ShaderStage, Viewport,
};
use cortex_core::renderer::scene::bindings::{self, deferred_lighting, entry_points, programs};
use cortex_core::renderer::scene::{ClusterGrid, DeferredLightingParams, Light};
use cortex_core::renderer::{
    ConstantBuffer, GpuDevice, PassType, RenderError, RenderGraph, RgHandle, RgUsage,
};

use super::{
    shader, write_transient_table, ClusterHandles, FrameTables, FrameView, GBuffer, RenderLane,
    TableEntry, DEPTH_SRV_FORMAT, GBUFFER_VIEW_FORMATS, HDR_FORMAT,
};

/// Format shadow map depth is sampled through.
pub const SHADOW_SRV_FORMAT: Format = Format::R32Float;

/// Most light matrices the lighting constants carry.
pub const MAX_SHADOW_MATRICES: usize = 6;

/// Image-based lighting terms of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightingEnvironment {
    /// Scale of the diffuse irradiance term.
    pub diffuse_scale: f32,
    /// Scale of the prefiltered specular term and of the background sky.
    pub specular_scale: f32,
    /// Deepest mip of the specular map.
    pub specular_max_mip: f32,
    /// When `false` the background is black and no ambient term is added.
    pub enabled: bool,
}

/// Sun shadow data produced by a shadow hook.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunShadow {
    /// World to light clip space, per cascade.
    pub light_view_projection: [Mat4; MAX_SHADOW_MATRICES],
    /// View-space split depths (xyz) and far plane (w).
    pub cascade_splits: [f32; 4],
    /// Depth bias subtracted before comparison.
    pub depth_bias: f32,
    /// PCF kernel radius in texels.
    pub pcf_radius: f32,
}

impl Default for SunShadow {
    fn default() -> Self {
        Self {
            light_view_projection: [Mat4::IDENTITY; MAX_SHADOW_MATRICES],
            cascade_splits: [0.0; 4],
            depth_bias: 0.002,
            pcf_radius: 1.0,
        }
    }
}

/// Everything the lighting pass reads for one frame.
#[derive(Debug, Clone, Copy)]
pub struct DeferredLightingInputs {
    /// G-buffer planes written by the resolve.
    pub gbuffer: GBuffer,
    /// Scene depth.
    pub depth: RgHandle,
    /// HDR color output.
    pub hdr: RgHandle,
    /// Diffuse irradiance map.
    pub env_diffuse: RgHandle,
    /// Prefiltered specular map.
    pub env_specular: RgHandle,
    /// Split-sum table.
    pub brdf_lut: RgHandle,
    /// Sun shadow map array.
    pub shadow_map: RgHandle,
    /// Cluster light lists.
    pub clusters: ClusterHandles,
    /// The directional light, if any.
    pub sun: Option<Light>,
    /// Sun shadow matrices. `None` disables shadowing.
    pub shadow: Option<SunShadow>,
    /// Edge length of one shadow cascade.
    pub shadow_map_size: u32,
    /// Slices of the shadow map.
    pub shadow_cascades: u32,
    /// Image-based lighting.
    pub environment: LightingEnvironment,
    /// Records in the local-light table.
    pub local_light_count: u32,
    /// Records in the probe table.
    pub probe_count: u32,
}

/// Fullscreen shading pass.
#[derive(Debug)]
pub struct DeferredLightingLane {
    root_signature: RootSignatureId,
    pipeline: PipelineId,
    params: ConstantBuffer<DeferredLightingParams>,
    grid: ClusterGrid,
}

impl DeferredLightingLane {
    /// Creates the pipeline drawing into an RGBA16F target.
    pub fn new(device: &Arc<dyn GpuDevice>, config: &RendererConfig) -> Result<Self, RenderError> {
        let root_signature =
            device.create_root_signature(&bindings::deferred_lighting_root_signature())?;
        let pipeline = device.create_graphics_pipeline(&GraphicsPipelineDesc {
            label: "Deferred Lighting".into(),
            root_signature,
            vertex_shader: shader(
                config,
                programs::DEFERRED_LIGHTING,
                entry_points::VS_MAIN,
                ShaderStage::Vertex,
            ),
            pixel_shader: Some(shader(
                config,
                programs::DEFERRED_LIGHTING,
                entry_points::PS_MAIN,
                ShaderStage::Pixel,
            )),
            input_layout: Vec::new(),
            cull_mode: CullMode::None,
            depth: DepthState::DISABLED,
            render_target_formats: vec![HDR_FORMAT],
            depth_format: None,
        })?;
        let params = ConstantBuffer::new(
            device.clone(),
            "Deferred Lighting Params",
            config.frames_in_flight,
        )?;
        Ok(Self {
            root_signature,
            pipeline,
            params,
            grid: ClusterGrid::from_config(&config.cluster),
        })
    }

    /// Packs the lighting constants of a frame.
    pub fn params(&self, view: &FrameView, inputs: &DeferredLightingInputs) -> DeferredLightingParams {
        let (sun_dir, sun_radiance) = match inputs.sun {
            Some(sun) => (-sun.direction.normalize(), sun.color * sun.intensity),
            None => (Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO),
        };
        let shadow = inputs.shadow.unwrap_or_default();
        let shadow_enabled = inputs.shadow.is_some() && inputs.sun.is_some();
        let inv_shadow_size = 1.0 / inputs.shadow_map_size.max(1) as f32;
        let env = &inputs.environment;
        let grid = &self.grid;
        DeferredLightingParams {
            inv_view_proj: view.inv_view_proj,
            view: view.view,
            light_view_projection: shadow.light_view_projection,
            camera_pos: view.camera_pos.extend(1.0).to_array(),
            sun_dir: sun_dir.extend(0.0).to_array(),
            sun_radiance: sun_radiance.extend(0.0).to_array(),
            cascade_splits: shadow.cascade_splits,
            shadow_params: [
                shadow.depth_bias,
                shadow.pcf_radius,
                if shadow_enabled { 1.0 } else { 0.0 },
                0.0,
            ],
            env_params: [
                env.diffuse_scale,
                env.specular_scale,
                if env.enabled { 1.0 } else { 0.0 },
                0.0,
            ],
            shadow_inv_size_and_spec_max_mip: [
                inv_shadow_size,
                inv_shadow_size,
                env.specular_max_mip,
                0.0,
            ],
            projection_params: [
                view.projection.cols[0].x,
                view.projection.cols[1].y,
                grid.near,
                grid.far,
            ],
            screen_and_cluster: [view.width, view.height, grid.dims[0], grid.dims[1]],
            cluster_params: [
                grid.dims[2],
                grid.max_lights_per_cluster,
                inputs.local_light_count,
                0,
            ],
            reflection_probe_params: [0, inputs.probe_count, 0, 0],
        }
    }

    /// Writes this frame's constants and declares the lighting draw.
    pub fn declare(
        &self,
        graph: &mut RenderGraph,
        frame_slot: u32,
        view: &FrameView,
        tables: &FrameTables,
        inputs: DeferredLightingInputs,
    ) -> Result<(), RenderError> {
        let params = self.params.write(frame_slot, &self.params(view, &inputs))?;
        let root_signature = self.root_signature;
        let pipeline = self.pipeline;
        let tables = *tables;
        let (width, height) = (view.width, view.height);
        let cascades = inputs.shadow_cascades.max(1);

        let mut pass = graph.add_pass("DeferredLighting", PassType::Graphics);
        for plane in inputs.gbuffer.planes() {
            pass = pass.read(plane, RgUsage::SHADER_RESOURCE);
        }
        pass.read(inputs.depth, RgUsage::SHADER_RESOURCE)
            .read(inputs.env_diffuse, RgUsage::SHADER_RESOURCE)
            .read(inputs.env_specular, RgUsage::SHADER_RESOURCE)
            .read(inputs.brdf_lut, RgUsage::SHADER_RESOURCE)
            .read(inputs.shadow_map, RgUsage::SHADER_RESOURCE)
            .read(inputs.clusters.ranges, RgUsage::SHADER_RESOURCE)
            .read(inputs.clusters.indices, RgUsage::SHADER_RESOURCE)
            .write(inputs.hdr, RgUsage::RENDER_TARGET)
            .execute(move |ctx| {
                let res = &ctx.resources;
                let mut entries = Vec::with_capacity(deferred_lighting::TEXTURES_LEN as usize);
                for (plane, format) in inputs.gbuffer.planes().into_iter().zip(GBUFFER_VIEW_FORMATS)
                {
                    entries.push(TableEntry::texture(res.resource(plane)?, format));
                }
                entries.push(TableEntry::texture(res.resource(inputs.depth)?, DEPTH_SRV_FORMAT));
                for map in [inputs.env_diffuse, inputs.env_specular, inputs.brdf_lut] {
                    entries.push(TableEntry::texture(res.resource(map)?, res.desc(map)?.format));
                }
                entries.push(TableEntry::Srv(
                    res.resource(inputs.shadow_map)?,
                    ShaderResourceViewDesc::Texture2DArray {
                        format: SHADOW_SRV_FORMAT,
                        most_detailed_mip: 0,
                        mip_levels: 1,
                        first_slice: 0,
                        array_size: cascades,
                    },
                ));
                let ranges = ctx
                    .device
                    .gpu_virtual_address(res.resource(inputs.clusters.ranges)?)?;
                let indices = ctx
                    .device
                    .gpu_virtual_address(res.resource(inputs.clusters.indices)?)?;
                let hdr = res.resource(inputs.hdr)?;

                let rtv = ctx.descriptors.allocate_transient_range(DescriptorHeapType::Rtv, 1)?;
                ctx.device.create_render_target_view(
                    hdr,
                    &RenderTargetViewDesc {
                        format: HDR_FORMAT,
                        mip_slice: 0,
                        array_slice: 0,
                    },
                    rtv.cpu,
                )?;
                let heap = ctx.descriptors.shader_visible_heap();
                let table = write_transient_table(ctx, &entries)?;

                let cmd = &mut *ctx.cmd;
                let bind = PipelineBindPoint::Graphics;
                cmd.set_descriptor_heaps(&[heap]);
                cmd.set_render_targets(&[rtv.cpu], None);
                cmd.set_viewport(Viewport::from_size(width, height));
                cmd.set_scissor_rect(ScissorRect::from_size(width, height));
                cmd.set_primitive_topology(PrimitiveTopology::TriangleList);
                cmd.set_pipeline(pipeline);
                cmd.set_root_signature(bind, root_signature);
                cmd.set_root_constant_buffer_view(bind, deferred_lighting::PARAMS, params);
                cmd.set_root_shader_resource_view(bind, deferred_lighting::LIGHTS, tables.lights);
                cmd.set_root_shader_resource_view(bind, deferred_lighting::PROBES, tables.probes);
                cmd.set_root_shader_resource_view(bind, deferred_lighting::CLUSTER_RANGES, ranges);
                cmd.set_root_shader_resource_view(
                    bind,
                    deferred_lighting::CLUSTER_INDICES,
                    indices,
                );
                cmd.set_root_descriptor_table(bind, deferred_lighting::TEXTURES, table);
                cmd.draw_instanced(3, 1, 0, 0);
                Ok(())
            });
        Ok(())
    }
}

impl RenderLane for DeferredLightingLane {
    fn strategy_name(&self) -> &'static str {
        "ClusteredDeferred"
    }
}
