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

//! Per-pixel screen-space motion, in pixels, from the previous frame's
//! camera and instance transforms.

use std::sync::Arc;

use cortex_core::config::RendererConfig;
use cortex_core::renderer::api::{
    ComputePipelineDesc, PipelineBindPoint, PipelineId, RootSignatureId, ShaderStage,
};
use cortex_core::renderer::scene::bindings::{self, entry_points, motion_vectors, programs};
use cortex_core::renderer::scene::MotionVectorParams;
use cortex_core::renderer::{
    ConstantBuffer, GpuDevice, PassType, RenderError, RenderGraph, RgHandle, RgUsage,
};

use super::{
    group_count, shader, write_transient_table, FrameTables, FrameView, RenderLane, TableEntry,
    DEPTH_SRV_FORMAT, VELOCITY_FORMAT, VISIBILITY_FORMAT,
};

/// Handles the motion pass reads and writes.
#[derive(Debug, Clone, Copy)]
pub struct MotionVectorInputs {
    /// Visibility payload.
    pub visibility: RgHandle,
    /// Scene depth.
    pub depth: RgHandle,
    /// `R16G16_FLOAT` output, current minus previous pixel position.
    pub velocity: RgHandle,
}

/// Compute pass writing the velocity buffer.
#[derive(Debug)]
pub struct MotionVectorLane {
    root_signature: RootSignatureId,
    pipeline: PipelineId,
    params: ConstantBuffer<MotionVectorParams>,
}

impl MotionVectorLane {
    /// Creates the pipeline.
    pub fn new(device: &Arc<dyn GpuDevice>, config: &RendererConfig) -> Result<Self, RenderError> {
        let root_signature =
            device.create_root_signature(&bindings::motion_vectors_root_signature())?;
        let pipeline = device.create_compute_pipeline(&ComputePipelineDesc {
            label: "Motion Vectors".into(),
            root_signature,
            shader: shader(
                config,
                programs::MOTION_VECTORS,
                entry_points::CS_MAIN,
                ShaderStage::Compute,
            ),
        })?;
        let params =
            ConstantBuffer::new(device.clone(), "Motion Vector Params", config.frames_in_flight)?;
        Ok(Self {
            root_signature,
            pipeline,
            params,
        })
    }

    /// Writes this frame's constants and declares the dispatch.
    pub fn declare(
        &self,
        graph: &mut RenderGraph,
        frame_slot: u32,
        view: &FrameView,
        tables: &FrameTables,
        inputs: MotionVectorInputs,
    ) -> Result<(), RenderError> {
        let params = self.params.write(
            frame_slot,
            &MotionVectorParams {
                inv_view_proj: view.inv_view_proj,
                prev_view_proj: view.prev_view_proj,
                view_proj: view.view_proj,
                dims: [view.width, view.height, 0, 0],
            },
        )?;
        let root_signature = self.root_signature;
        let pipeline = self.pipeline;
        let tables = *tables;
        let groups_x = group_count(view.width, motion_vectors::GROUP_SIZE);
        let groups_y = group_count(view.height, motion_vectors::GROUP_SIZE);
        let MotionVectorInputs {
            visibility,
            depth,
            velocity,
        } = inputs;

        graph
            .add_pass("MotionVectors", PassType::Compute)
            .read(visibility, RgUsage::SHADER_RESOURCE)
            .read(depth, RgUsage::SHADER_RESOURCE)
            .write(velocity, RgUsage::UNORDERED_ACCESS)
            .execute(move |ctx| {
                let entries = [
                    TableEntry::texture(ctx.resources.resource(visibility)?, VISIBILITY_FORMAT),
                    TableEntry::texture(ctx.resources.resource(depth)?, DEPTH_SRV_FORMAT),
                    TableEntry::rw_texture(ctx.resources.resource(velocity)?, VELOCITY_FORMAT),
                ];
                let heap = ctx.descriptors.shader_visible_heap();
                let table = write_transient_table(ctx, &entries)?;

                let cmd = &mut *ctx.cmd;
                let bind = PipelineBindPoint::Compute;
                cmd.set_descriptor_heaps(&[heap]);
                cmd.set_pipeline(pipeline);
                cmd.set_root_signature(bind, root_signature);
                cmd.set_root_constant_buffer_view(bind, motion_vectors::PARAMS, params);
                cmd.set_root_shader_resource_view(bind, motion_vectors::INSTANCES, tables.instances);
                cmd.set_root_shader_resource_view(bind, motion_vectors::MESHES, tables.meshes);
                cmd.set_root_descriptor_table(bind, motion_vectors::TARGETS, table);
                cmd.dispatch(groups_x, groups_y, 1);
                Ok(())
            });
        Ok(())
    }
}

impl RenderLane for MotionVectorLane {
    fn strategy_name(&self) -> &'static str {
        "MotionVectors"
    }
}
