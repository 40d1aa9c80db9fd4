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

//! Clustered light culling.
//!
//! The view frustum is cut into a `x * y * z` grid of froxels with
//! exponential depth slices. One thread per cluster tests every local light's
//! range sphere and writes an `(offset, count)` pair plus its light indices
//! into a fixed-stride list.

use std::sync::Arc;

use cortex_core::config::RendererConfig;
use cortex_core::renderer::api::{
    ComputePipelineDesc, GpuVirtualAddress, HeapType, PipelineBindPoint, PipelineId, ResourceDesc,
    ResourceFlags, ResourceId, ResourceStates, RootSignatureId, ShaderStage,
};
use cortex_core::renderer::scene::bindings::{self, cluster_cull, entry_points, programs};
use cortex_core::renderer::scene::{ClusterCullParams, ClusterGrid};
use cortex_core::renderer::{
    ConstantBuffer, GpuDevice, PassType, RenderError, RenderGraph, RgHandle, RgUsage,
};

use super::{group_count, shader, FrameView, RenderLane};

/// Bytes of one `(offset, count)` cluster record.
pub const CLUSTER_RANGE_STRIDE: u64 = 8;

/// The two persistent buffers culling writes and lighting reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterBuffers {
    /// One `(offset, count)` record per cluster.
    pub ranges: ResourceId,
    /// `cluster_count * max_lights_per_cluster` light indices.
    pub indices: ResourceId,
}

/// Graph handles of the cluster buffers for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterHandles {
    /// Imported [`ClusterBuffers::ranges`].
    pub ranges: RgHandle,
    /// Imported [`ClusterBuffers::indices`].
    pub indices: RgHandle,
}

/// Assigns local lights to view-space clusters.
#[derive(Debug)]
pub struct ClusterCullLane {
    root_signature: RootSignatureId,
    pipeline: PipelineId,
    params: ConstantBuffer<ClusterCullParams>,
    grid: ClusterGrid,
}

impl ClusterCullLane {
    /// Creates the pipeline for the grid configured in `config.cluster`.
    pub fn new(device: &Arc<dyn GpuDevice>, config: &RendererConfig) -> Result<Self, RenderError> {
        let root_signature = device.create_root_signature(&bindings::cluster_cull_root_signature())?;
        let pipeline = device.create_compute_pipeline(&ComputePipelineDesc {
            label: "Cluster Cull".into(),
            root_signature,
            shader: shader(
                config,
                programs::CLUSTER_CULL,
                entry_points::CS_MAIN,
                ShaderStage::Compute,
            ),
        })?;
        let params =
            ConstantBuffer::new(device.clone(), "Cluster Cull Params", config.frames_in_flight)?;
        Ok(Self {
            root_signature,
            pipeline,
            params,
            grid: ClusterGrid::from_config(&config.cluster),
        })
    }

    /// The cluster grid.
    pub fn grid(&self) -> &ClusterGrid {
        &self.grid
    }

    /// Creates the range and index buffers in `UNORDERED_ACCESS`.
    pub fn create_buffers(&self, device: &dyn GpuDevice) -> Result<ClusterBuffers, RenderError> {
        let ranges_size = u64::from(self.grid.cluster_count()) * CLUSTER_RANGE_STRIDE;
        let indices_size = u64::from(self.grid.index_capacity().max(1)) * 4;
        let create = |size: u64, label: &str| {
            device.create_committed_resource(
                HeapType::Default,
                &ResourceDesc::buffer(size).with_flags(ResourceFlags::ALLOW_UNORDERED_ACCESS),
                ResourceStates::UNORDERED_ACCESS,
                None,
                label,
            )
        };
        Ok(ClusterBuffers {
            ranges: create(ranges_size, "Cluster Ranges")?,
            indices: create(indices_size, "Cluster Light Indices")?,
        })
    }

    /// Declares the culling dispatch. With no local lights nothing is
    /// declared and the buffers keep their previous contents, which lighting
    /// ignores because its light count is zero.
    pub fn declare(
        &self,
        graph: &mut RenderGraph,
        frame_slot: u32,
        view: &FrameView,
        lights: GpuVirtualAddress,
        light_count: u32,
        clusters: ClusterHandles,
    ) -> Result<bool, RenderError> {
        if light_count == 0 {
            log::trace!("ClusterCull skipped: no local lights");
            return Ok(false);
        }
        let grid = &self.grid;
        let params = self.params.write(
            frame_slot,
            &ClusterCullParams {
                inv_proj: view.inv_projection,
                view: view.view,
                screen: view.screen(),
                grid: [
                    grid.dims[0],
                    grid.dims[1],
                    grid.dims[2],
                    grid.max_lights_per_cluster,
                ],
                depth_range: [grid.near, grid.far, 0.0, 0.0],
                counts: [light_count, 0, 0, 0],
            },
        )?;
        let root_signature = self.root_signature;
        let pipeline = self.pipeline;
        let groups = group_count(grid.cluster_count(), cluster_cull::GROUP_SIZE);
        let ClusterHandles { ranges, indices } = clusters;

        graph
            .add_pass("ClusterCull", PassType::Compute)
            .write(ranges, RgUsage::UNORDERED_ACCESS)
            .write(indices, RgUsage::UNORDERED_ACCESS)
            .execute(move |ctx| {
                let ranges = ctx.device.gpu_virtual_address(ctx.resources.resource(ranges)?)?;
                let indices = ctx.device.gpu_virtual_address(ctx.resources.resource(indices)?)?;
                let cmd = &mut *ctx.cmd;
                let bind = PipelineBindPoint::Compute;
                cmd.set_pipeline(pipeline);
                cmd.set_root_signature(bind, root_signature);
                cmd.set_root_constant_buffer_view(bind, cluster_cull::PARAMS, params);
                cmd.set_root_shader_resource_view(bind, cluster_cull::LIGHTS, lights);
                cmd.set_root_unordered_access_view(bind, cluster_cull::RANGES, ranges);
                cmd.set_root_unordered_access_view(bind, cluster_cull::INDICES, indices);
                cmd.dispatch(groups, 1, 1);
                Ok(())
            });
        Ok(true)
    }
}

impl RenderLane for ClusterCullLane {
    fn strategy_name(&self) -> &'static str {
        "ClusteredLightCulling"
    }
}
