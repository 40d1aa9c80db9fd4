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

//! Material resolve: rebuilds each pixel's surface from the visibility
//! payload and writes the G-buffer planes.

use std::sync::Arc;

use cortex_core::config::RendererConfig;
use cortex_core::renderer::api::{
    ComputePipelineDesc, PipelineBindPoint, PipelineId, RootSignatureId, ShaderStage,
};
use cortex_core::renderer::scene::bindings::{self, entry_points, material_resolve, programs};
use cortex_core::renderer::scene::MaterialResolveParams;
use cortex_core::renderer::{
    ConstantBuffer, GpuDevice, PassType, RenderError, RenderGraph, RgHandle, RgUsage,
};

use super::{
    group_count, shader, write_transient_table, FrameTables, FrameView, GBuffer, RenderLane,
    TableEntry, DEPTH_SRV_FORMAT, GBUFFER_VIEW_FORMATS, VISIBILITY_FORMAT,
};

/// Handles the resolve pass reads and writes.
#[derive(Debug, Clone, Copy)]
pub struct MaterialResolveInputs {
    /// Visibility payload.
    pub visibility: RgHandle,
    /// Scene depth.
    pub depth: RgHandle,
    /// Output planes.
    pub gbuffer: GBuffer,
}

/// Compute pass writing the G-buffer from the visibility buffer.
#[derive(Debug)]
pub struct MaterialResolveLane {
    root_signature: RootSignatureId,
    pipeline: PipelineId,
    params: ConstantBuffer<MaterialResolveParams>,
}

impl MaterialResolveLane {
    /// Creates the pipeline and one constant slot per frame in flight.
    pub fn new(device: &Arc<dyn GpuDevice>, config: &RendererConfig) -> Result<Self, RenderError> {
        let root_signature =
            device.create_root_signature(&bindings::material_resolve_root_signature())?;
        let pipeline = device.create_compute_pipeline(&ComputePipelineDesc {
            label: "Material Resolve".into(),
            root_signature,
            shader: shader(
                config,
                programs::MATERIAL_RESOLVE,
                entry_points::CS_MAIN,
                ShaderStage::Compute,
            ),
        })?;
        let params = ConstantBuffer::new(
            device.clone(),
            "Material Resolve Params",
            config.frames_in_flight,
        )?;
        Ok(Self {
            root_signature,
            pipeline,
            params,
        })
    }

    /// Writes this frame's constants and declares the resolve dispatch.
    pub fn declare(
        &self,
        graph: &mut RenderGraph,
        frame_slot: u32,
        view: &FrameView,
        tables: &FrameTables,
        inputs: MaterialResolveInputs,
    ) -> Result<(), RenderError> {
        let params = self.params.write(
            frame_slot,
            &MaterialResolveParams {
                inv_view_proj: view.inv_view_proj,
                view_proj: view.view_proj,
                screen: view.screen(),
                camera_pos: view.camera_pos.extend(1.0).to_array(),
            },
        )?;
        let root_signature = self.root_signature;
        let pipeline = self.pipeline;
        let tables = *tables;
        let groups_x = group_count(view.width, material_resolve::GROUP_SIZE);
        let groups_y = group_count(view.height, material_resolve::GROUP_SIZE);
        let MaterialResolveInputs {
            visibility,
            depth,
            gbuffer,
        } = inputs;

        let mut pass = graph
            .add_pass("MaterialResolve", PassType::Compute)
            .read(visibility, RgUsage::SHADER_RESOURCE)
            .read(depth, RgUsage::SHADER_RESOURCE);
        for plane in gbuffer.planes() {
            pass = pass.write(plane, RgUsage::UNORDERED_ACCESS);
        }
        pass.execute(move |ctx| {
            let mut entries = vec![
                TableEntry::texture(ctx.resources.resource(visibility)?, VISIBILITY_FORMAT),
                TableEntry::texture(ctx.resources.resource(depth)?, DEPTH_SRV_FORMAT),
            ];
            for (plane, format) in gbuffer.planes().into_iter().zip(GBUFFER_VIEW_FORMATS) {
                entries.push(TableEntry::rw_texture(ctx.resources.resource(plane)?, format));
            }
            let heap = ctx.descriptors.shader_visible_heap();
            let table = write_transient_table(ctx, &entries)?;

            let cmd = &mut *ctx.cmd;
            let bind = PipelineBindPoint::Compute;
            cmd.set_descriptor_heaps(&[heap]);
            cmd.set_pipeline(pipeline);
            cmd.set_root_signature(bind, root_signature);
            cmd.set_root_constant_buffer_view(bind, material_resolve::PARAMS, params);
            cmd.set_root_shader_resource_view(bind, material_resolve::INSTANCES, tables.instances);
            cmd.set_root_shader_resource_view(bind, material_resolve::MESHES, tables.meshes);
            cmd.set_root_shader_resource_view(bind, material_resolve::MATERIALS, tables.materials);
            cmd.set_root_descriptor_table(bind, material_resolve::TARGETS, table);
            cmd.dispatch(groups_x, groups_y, 1);
            Ok(())
        });
        Ok(())
    }
}

impl RenderLane for MaterialResolveLane {
    fn strategy_name(&self) -> &'static str {
        "MaterialResolve"
    }
}
