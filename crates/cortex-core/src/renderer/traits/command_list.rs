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

use crate::renderer::api::*;
use crate::renderer::error::DeviceError;

/// A trait for an object that records GPU commands for one queue family.
///
/// Recording is infallible: invalid usage is reported by the device when the
/// list is closed or executed. The list is consumed by [`CommandList::close`],
/// which returns the id to pass to
/// [`GpuDevice::execute_command_lists`](super::GpuDevice::execute_command_lists).
pub trait CommandList: Send {
    /// Queue family the list was opened for.
    fn queue_type(&self) -> QueueType;

    /// Records resource barriers, executed in order.
    fn resource_barrier(&mut self, barriers: &[ResourceBarrier]);

    /// Binds the shader-visible heaps descriptor tables and
    /// `ResourceDescriptorHeap[]` resolve against.
    fn set_descriptor_heaps(&mut self, heaps: &[DescriptorHeapId]);

    /// Binds a pipeline state object.
    fn set_pipeline(&mut self, pipeline: PipelineId);

    /// Binds the root signature for one bind point and resets its arguments.
    fn set_root_signature(&mut self, bind_point: PipelineBindPoint, root_signature: RootSignatureId);

    /// Sets 32-bit root constants of a `Constants` parameter.
    fn set_root_constants(
        &mut self,
        bind_point: PipelineBindPoint,
        parameter: u32,
        values: &[u32],
        dest_offset: u32,
    );

    /// Binds a root constant buffer view by address.
    fn set_root_constant_buffer_view(
        &mut self,
        bind_point: PipelineBindPoint,
        parameter: u32,
        address: GpuVirtualAddress,
    );

    /// Binds a root shader resource view by address.
    fn set_root_shader_resource_view(
        &mut self,
        bind_point: PipelineBindPoint,
        parameter: u32,
        address: GpuVirtualAddress,
    );

    /// Binds a root unordered access view by address.
    fn set_root_unordered_access_view(
        &mut self,
        bind_point: PipelineBindPoint,
        parameter: u32,
        address: GpuVirtualAddress,
    );

    /// Binds the base of a descriptor table.
    fn set_root_descriptor_table(
        &mut self,
        bind_point: PipelineBindPoint,
        parameter: u32,
        base: GpuDescriptorHandle,
    );

    /// Sets the viewport.
    fn set_viewport(&mut self, viewport: Viewport);

    /// Sets the scissor rectangle.
    fn set_scissor_rect(&mut self, rect: ScissorRect);

    /// Binds render targets and an optional depth-stencil target.
    fn set_render_targets(
        &mut self,
        render_targets: &[CpuDescriptorHandle],
        depth_stencil: Option<CpuDescriptorHandle>,
    );

    /// Clears a render target view.
    fn clear_render_target_view(&mut self, rtv: CpuDescriptorHandle, color: [f32; 4]);

    /// Clears the depth of a depth-stencil view.
    fn clear_depth_stencil_view(&mut self, dsv: CpuDescriptorHandle, depth: f32);

    /// Clears a UAV with integer values. `gpu` must be a slot of the bound
    /// shader-visible heap and `cpu` a CPU-visible copy of the same view.
    fn clear_unordered_access_view_uint(
        &mut self,
        gpu: GpuDescriptorHandle,
        cpu: CpuDescriptorHandle,
        resource: ResourceId,
        values: [u32; 4],
    );

    /// Sets the primitive topology.
    fn set_primitive_topology(&mut self, topology: PrimitiveTopology);

    /// Binds vertex buffers starting at `start_slot`.
    fn set_vertex_buffers(&mut self, start_slot: u32, views: &[VertexBufferView]);

    /// Binds the index buffer.
    fn set_index_buffer(&mut self, view: Option<IndexBufferView>);

    /// Records a non-indexed draw.
    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    );

    /// Records an indexed draw.
    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    );

    /// Records a compute dispatch of `x * y * z` thread groups.
    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    /// Copies bytes between buffers.
    fn copy_buffer_region(
        &mut self,
        dest: ResourceId,
        dest_offset: u64,
        src: ResourceId,
        src_offset: u64,
        size: u64,
    );

    /// Copies one subresource between a texture and a placed footprint.
    fn copy_texture_region(&mut self, dest: TextureCopyLocation, src: TextureCopyLocation);

    /// Opens a named debug region.
    fn begin_event(&mut self, name: &str);

    /// Closes the innermost debug region.
    fn end_event(&mut self);

    /// Finishes recording.
    /// ## Errors
    /// * `DeviceError::InvalidCommandList` - If the list holds commands its
    ///   queue family cannot execute, or unbalanced debug regions.
    fn close(self: Box<Self>) -> Result<CommandListId, DeviceError>;
}
