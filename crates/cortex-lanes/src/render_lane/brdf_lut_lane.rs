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

//! Split-sum BRDF preintegration into a persistent lookup texture.

use std::sync::Arc;

use cortex_core::config::RendererConfig;
use cortex_core::renderer::api::{
    ComputePipelineDesc, Format, HeapType, PipelineBindPoint, PipelineId, ResourceDesc,
    ResourceFlags, ResourceId, ResourceStates, RootSignatureId, ShaderStage,
};
use cortex_core::renderer::scene::bindings::{self, brdf_lut, entry_points, programs};
use cortex_core::renderer::scene::BrdfLutConstants;
use cortex_core::renderer::{GpuDevice, PassType, RenderError, RenderGraph, RgHandle, RgUsage};

use super::{group_count, shader, write_transient_table, RenderLane, TableEntry};

/// Format of the LUT: scale (r) and bias (g) applied to F0.
pub const BRDF_LUT_FORMAT: Format = Format::Rg16Float;

/// Computes the GGX split-sum lookup table once.
///
/// The table is indexed by `(N.V, roughness)` and stays valid for the
/// lifetime of the device, so the agent schedules this lane on its first
/// frame only and samples the result every frame after.
#[derive(Debug)]
pub struct BrdfLutLane {
    root_signature: RootSignatureId,
    pipeline: PipelineId,
    size: u32,
    sample_count: u32,
}

impl BrdfLutLane {
    /// Creates the compute pipeline.
    pub fn new(device: &Arc<dyn GpuDevice>, config: &RendererConfig) -> Result<Self, RenderError> {
        let root_signature = device.create_root_signature(&bindings::brdf_lut_root_signature())?;
        let pipeline = device.create_compute_pipeline(&ComputePipelineDesc {
            label: "BRDF LUT".into(),
            root_signature,
            shader: shader(config, programs::BRDF_LUT, entry_points::CS_MAIN, ShaderStage::Compute),
        })?;
        Ok(Self {
            root_signature,
            pipeline,
            size: brdf_lut::SIZE,
            sample_count: brdf_lut::SAMPLE_COUNT,
        })
    }

    /// Edge length of the table.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Creates the persistent table in `UNORDERED_ACCESS`, ready for
    /// [`BrdfLutLane::declare`].
    pub fn create_target(&self, device: &dyn GpuDevice) -> Result<ResourceId, RenderError> {
        let desc = ResourceDesc::texture_2d(self.size, self.size, BRDF_LUT_FORMAT)
            .with_flags(ResourceFlags::ALLOW_UNORDERED_ACCESS);
        Ok(device.create_committed_resource(
            HeapType::Default,
            &desc,
            ResourceStates::UNORDERED_ACCESS,
            None,
            "BRDF LUT",
        )?)
    }

    /// Declares the pass filling `lut`.
    pub fn declare(&self, graph: &mut RenderGraph, lut: RgHandle) {
        let root_signature = self.root_signature;
        let pipeline = self.pipeline;
        let constants = BrdfLutConstants {
            size: self.size,
            sample_count: self.sample_count,
        };
        let groups = group_count(self.size, brdf_lut::GROUP_SIZE);
        graph
            .add_pass("BrdfLut", PassType::Compute)
            .write(lut, RgUsage::UNORDERED_ACCESS)
            .execute(move |ctx| {
                let target = ctx.resources.resource(lut)?;
                let heap = ctx.descriptors.shader_visible_heap();
                let table =
                    write_transient_table(ctx, &[TableEntry::rw_texture(target, BRDF_LUT_FORMAT)])?;
                let cmd = &mut *ctx.cmd;
                cmd.set_descriptor_heaps(&[heap]);
                cmd.set_pipeline(pipeline);
                cmd.set_root_signature(PipelineBindPoint::Compute, root_signature);
                cmd.set_root_constants(
                    PipelineBindPoint::Compute,
                    brdf_lut::CONSTANTS,
                    bytemuck::cast_slice(&[constants]),
                    0,
                );
                cmd.set_root_descriptor_table(PipelineBindPoint::Compute, brdf_lut::OUTPUT, table);
                cmd.dispatch(groups, groups, 1);
                Ok(())
            });
    }
}

impl RenderLane for BrdfLutLane {
    fn strategy_name(&self) -> &'static str {
        "BrdfLut"
    }
}
