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

use std::fmt::Debug;
use std::sync::Arc;

use super::CommandList;
use crate::renderer::api::*;
use crate::renderer::error::{DeviceError, PipelineError, ResourceError};
use crate::utils::align_up;

/// The explicit GPU device contract.
///
/// Resources, heaps, pipelines, queues and fences are created through the
/// device and addressed by opaque ids. Every method is callable from any
/// thread; command recording itself goes through [`CommandList`].
pub trait GpuDevice: Send + Sync + Debug + 'static {
    /// Returns information about the adapter the device was created on.
    fn adapter_info(&self) -> AdapterInfo;

    /// Creates a committed resource in its own implicit heap.
    /// ## Arguments
    /// * `heap` - Memory the resource lives in.
    /// * `desc` - Dimensions, format and capabilities.
    /// * `initial_state` - State every subresource starts in.
    /// * `clear_value` - Optimized clear value for render and depth targets.
    /// * `label` - Debug name.
    /// ## Errors
    /// * `ResourceError::InvalidDesc` - If the description is illegal for the heap.
    fn create_committed_resource(
        &self,
        heap: HeapType,
        desc: &ResourceDesc,
        initial_state: ResourceStates,
        clear_value: Option<ClearValue>,
        label: &str,
    ) -> Result<ResourceId, ResourceError>;

    /// Releases a resource. The caller guarantees the GPU no longer uses it.
    fn destroy_resource(&self, id: ResourceId) -> Result<(), ResourceError>;

    /// Returns the description a resource was created with.
    fn resource_desc(&self, id: ResourceId) -> Result<ResourceDesc, ResourceError>;

    /// Returns the 64-bit GPU virtual address of a buffer.
    fn gpu_virtual_address(&self, id: ResourceId) -> Result<GpuVirtualAddress, ResourceError>;

    /// Writes through the persistent CPU mapping of an upload-heap buffer.
    fn write_mapped(&self, id: ResourceId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Reads through the CPU mapping of an upload- or readback-heap buffer.
    fn read_mapped(&self, id: ResourceId, offset: u64, out: &mut [u8])
        -> Result<(), ResourceError>;

    /// Reports how `count` subresources of `desc` are laid out in a linear
    /// buffer starting at `base_offset`.
    ///
    /// The default follows the placement rules of the API: 256-byte row pitch
    /// and 512-byte subresource placement.
    fn copyable_footprints(
        &self,
        desc: &ResourceDesc,
        first_subresource: u32,
        count: u32,
        base_offset: u64,
    ) -> CopyableFootprints {
        compute_copyable_footprints(desc, first_subresource, count, base_offset)
    }

    /// Creates a descriptor heap.
    fn create_descriptor_heap(
        &self,
        desc: &DescriptorHeapDesc,
    ) -> Result<DescriptorHeapInfo, DeviceError>;

    /// Writes a shader resource view into `dest`.
    fn create_shader_resource_view(
        &self,
        resource: ResourceId,
        desc: &ShaderResourceViewDesc,
        dest: CpuDescriptorHandle,
    ) -> Result<(), ResourceError>;

    /// Writes an unordered access view into `dest`.
    fn create_unordered_access_view(
        &self,
        resource: ResourceId,
        desc: &UnorderedAccessViewDesc,
        dest: CpuDescriptorHandle,
    ) -> Result<(), ResourceError>;

    /// Writes a render target view into `dest`.
    fn create_render_target_view(
        &self,
        resource: ResourceId,
        desc: &RenderTargetViewDesc,
        dest: CpuDescriptorHandle,
    ) -> Result<(), ResourceError>;

    /// Writes a depth-stencil view into `dest`.
    fn create_depth_stencil_view(
        &self,
        resource: ResourceId,
        desc: &DepthStencilViewDesc,
        dest: CpuDescriptorHandle,
    ) -> Result<(), ResourceError>;

    /// Writes a constant buffer view into `dest`.
    fn create_constant_buffer_view(
        &self,
        desc: &ConstantBufferViewDesc,
        dest: CpuDescriptorHandle,
    ) -> Result<(), ResourceError>;

    /// Copies `count` descriptors of one heap type from `src` to `dest`.
    fn copy_descriptors(
        &self,
        count: u32,
        dest: CpuDescriptorHandle,
        src: CpuDescriptorHandle,
        heap_type: DescriptorHeapType,
    ) -> Result<(), ResourceError>;

    /// Creates a root signature.
    fn create_root_signature(
        &self,
        desc: &RootSignatureDesc,
    ) -> Result<RootSignatureId, PipelineError>;

    /// Compiles a graphics pipeline state object.
    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc,
    ) -> Result<PipelineId, PipelineError>;

    /// Compiles a compute pipeline state object.
    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc,
    ) -> Result<PipelineId, PipelineError>;

    /// Creates a command queue of the given family.
    fn create_command_queue(&self, ty: QueueType) -> Result<QueueId, DeviceError>;

    /// Creates a fence holding `initial_value`.
    fn create_fence(&self, initial_value: u64) -> Result<FenceId, DeviceError>;

    /// Returns the last value the GPU wrote to `fence`.
    fn fence_completed_value(&self, fence: FenceId) -> Result<u64, DeviceError>;

    /// Blocks the calling thread until `fence` reaches `value`.
    /// ## Errors
    /// * `DeviceError::Removed` - If the device is lost while waiting.
    fn wait_for_fence(&self, fence: FenceId, value: u64) -> Result<(), DeviceError>;

    /// Schedules `fence := value` on `queue` after all prior submissions.
    fn queue_signal(&self, queue: QueueId, fence: FenceId, value: u64) -> Result<(), DeviceError>;

    /// Makes `queue` wait on the GPU until `fence` reaches `value`.
    fn queue_wait(&self, queue: QueueId, fence: FenceId, value: u64) -> Result<(), DeviceError>;

    /// Opens a command list for queues of type `ty`.
    fn create_command_list(&self, ty: QueueType) -> Result<Box<dyn CommandList>, DeviceError>;

    /// Submits closed command lists to `queue`, executed in order.
    fn execute_command_lists(
        &self,
        queue: QueueId,
        lists: &[CommandListId],
    ) -> Result<(), DeviceError>;

    /// Creates a swap chain presenting from `queue`.
    fn create_swap_chain(
        &self,
        queue: QueueId,
        desc: &SwapChainDesc,
    ) -> Result<SwapChainId, DeviceError>;

    /// Returns back buffer `index` of a swap chain.
    fn swap_chain_buffer(&self, swap_chain: SwapChainId, index: u32)
        -> Result<ResourceId, DeviceError>;

    /// Index of the back buffer the next frame renders to.
    fn current_back_buffer_index(&self, swap_chain: SwapChainId) -> Result<u32, DeviceError>;

    /// Presents the current back buffer and advances to the next one.
    fn present(&self, swap_chain: SwapChainId) -> Result<(), DeviceError>;

    /// Recreates the back buffers at a new size. The GPU must be idle.
    fn resize_swap_chain(
        &self,
        swap_chain: SwapChainId,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError>;

    /// The removal reason, once the device has been lost.
    fn device_removed_reason(&self) -> Option<String>;

    /// The last executed command-list markers, oldest first, when breadcrumbs
    /// are enabled.
    fn breadcrumbs(&self) -> Vec<String>;

    /// Drains the messages reported by the debug layer since the last call.
    fn take_debug_messages(&self) -> Vec<DebugMessage>;
}

/// A source of adapters able to create devices.
pub trait GpuBackend: Send + Sync {
    /// Lists adapters, highest performance first.
    fn enumerate_adapters(&self) -> Vec<AdapterInfo>;

    /// Creates a device on `adapter`.
    /// ## Errors
    /// * `DeviceError::CreationFailed` - If the adapter refuses device creation.
    fn create_device(
        &self,
        adapter: &AdapterInfo,
        options: DeviceOptions,
    ) -> Result<Arc<dyn GpuDevice>, DeviceError>;
}

/// Computes placed footprints with the API's pitch and placement alignment.
pub fn compute_copyable_footprints(
    desc: &ResourceDesc,
    first_subresource: u32,
    count: u32,
    base_offset: u64,
) -> CopyableFootprints {
    let mut out = CopyableFootprints::default();
    let mut offset = base_offset;

    if desc.is_buffer() {
        out.layouts.push(PlacedFootprint {
            offset,
            format: Format::Unknown,
            width: desc.width as u32,
            height: 1,
            row_pitch: desc.width as u32,
        });
        out.num_rows.push(1);
        out.row_size_in_bytes.push(desc.width);
        out.total_bytes = desc.width;
        return out;
    }

    let bpp = u64::from(desc.format.bytes_per_texel());
    for subresource in first_subresource..first_subresource + count {
        offset = align_up(offset, TEXTURE_DATA_PLACEMENT_ALIGNMENT);
        let (mip, _) = desc.subresource_location(subresource);
        let (width, height) = desc.mip_size(mip);
        let row_size = u64::from(width) * bpp;
        let row_pitch = align_up(row_size, TEXTURE_DATA_PITCH_ALIGNMENT);
        out.layouts.push(PlacedFootprint {
            offset,
            format: desc.format,
            width,
            height,
            row_pitch: row_pitch as u32,
        });
        out.num_rows.push(height);
        out.row_size_in_bytes.push(row_size);
        // The last row is not padded.
        let end = offset + row_pitch * u64::from(height - 1) + row_size;
        out.total_bytes = end - base_offset;
        offset = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footprints_align_row_pitch() {
        let desc = ResourceDesc::texture_2d(10, 4, Format::Rgba8Unorm).with_mips(2);
        let fp = compute_copyable_footprints(&desc, 0, 2, 0);
        assert_eq!(fp.layouts.len(), 2);
        assert_eq!(fp.layouts[0].row_pitch, 256);
        assert_eq!(fp.row_size_in_bytes[0], 40);
        assert_eq!(fp.num_rows, vec![4, 2]);
        assert_eq!(fp.layouts[1].offset, 1024);
        assert_eq!(fp.layouts[1].width, 5);
        assert_eq!(fp.total_bytes, 1024 + 256 + 20);
    }

    #[test]
    fn test_buffer_footprint_is_linear() {
        let fp = compute_copyable_footprints(&ResourceDesc::buffer(100), 0, 1, 0);
        assert_eq!(fp.total_bytes, 100);
        assert_eq!(fp.num_rows, vec![1]);
    }
}
