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

//! The `wgpu` implementation of [`GpuDevice`].

use std::collections::HashMap;
use std::sync::Arc;

use cortex_core::renderer::api::*;
use cortex_core::renderer::traits::{compute_copyable_footprints, CommandList, GpuDevice};
use cortex_core::renderer::{DeviceError, PipelineError, ResourceError};
use cortex_core::utils::align_up;
use parking_lot::{Mutex, RwLock};

use crate::graphics::checks::{self, ViewedResource};
use crate::graphics::descriptors::{Descriptor, DescriptorHeap};
use crate::graphics::recording::RecordingList;
use crate::graphics::swap_chain::SwapChain;

use super::context::GpuContext;
use super::conversions::storage_format;
use super::pipeline;
use super::queue::{QueueOp, QueueWorker};
use super::state::{Fence, Resource, Shared, Storage};

/// A device on a real adapter.
///
/// Buffers get a virtual address range like on the software device, so root
/// views and vertex views resolve to a `wgpu::Buffer` and an offset. All API
/// queues share the adapter's single queue and submit from their own worker
/// threads.
#[derive(Debug)]
pub struct WgpuDevice {
    adapter: AdapterInfo,
    shared: Arc<Shared>,
    queues: RwLock<HashMap<QueueId, QueueWorker>>,
    swap_chains: Mutex<HashMap<SwapChainId, SwapChain>>,
}

impl WgpuDevice {
    pub(crate) fn new(adapter: AdapterInfo, context: GpuContext, options: DeviceOptions) -> Self {
        log::debug!(
            "Creating wgpu device on '{}' (validation: {}, breadcrumbs: {})",
            adapter.name,
            options.validation,
            options.breadcrumbs
        );
        let GpuContext { device, queue } = context;
        let shared = Arc::new(Shared::new(device, queue, options));
        GpuContext::install_hooks(&shared.device, Arc::downgrade(&shared));
        Self {
            adapter,
            shared,
            queues: RwLock::new(HashMap::new()),
            swap_chains: Mutex::new(HashMap::new()),
        }
    }

    /// Marks the device removed, as a lost device would be.
    pub fn simulate_removal(&self, reason: &str) {
        self.shared.remove_device(reason.to_owned());
    }

    fn check_alive(&self) -> Result<(), DeviceError> {
        match self.shared.removed_reason() {
            Some(reason) => Err(DeviceError::Removed { reason }),
            None => Ok(()),
        }
    }

    fn resource(&self, id: ResourceId) -> Result<Arc<Resource>, ResourceError> {
        self.shared.resource(id).ok_or(ResourceError::NotFound(id))
    }

    fn fence(&self, id: FenceId) -> Result<Arc<Fence>, DeviceError> {
        self.shared
            .fence(id)
            .ok_or(DeviceError::InvalidHandle("fence"))
    }

    fn submit(&self, queue: QueueId, op: QueueOp) -> Result<(), DeviceError> {
        let queues = self.queues.read();
        let worker = queues
            .get(&queue)
            .ok_or(DeviceError::InvalidHandle("queue"))?;
        worker.submit(op)
    }

    fn view_slot(
        &self,
        dest: CpuDescriptorHandle,
        ty: DescriptorHeapType,
    ) -> Result<(Arc<DescriptorHeap>, u32), ResourceError> {
        let (heap, address) = self
            .shared
            .cpu_slot(dest)
            .ok_or_else(|| ResourceError::InvalidView(format!("bad CPU handle {:#x}", dest.ptr)))?;
        checks::check_view_slot(&heap, address.slot, ty)?;
        Ok((heap, address.slot))
    }

    fn write_view(
        &self,
        dest: CpuDescriptorHandle,
        descriptor: Descriptor,
    ) -> Result<(), ResourceError> {
        let (heap, slot) = self.view_slot(dest, descriptor.heap_type())?;
        heap.write(slot, descriptor);
        Ok(())
    }

    fn create_swap_chain_buffers(
        &self,
        desc: &SwapChainDesc,
    ) -> Result<Vec<ResourceId>, DeviceError> {
        (0..desc.buffer_count)
            .map(|i| {
                self.create_committed_resource(
                    HeapType::Default,
                    &ResourceDesc::texture_2d(desc.width, desc.height, SwapChain::FORMAT)
                        .with_flags(ResourceFlags::ALLOW_RENDER_TARGET),
                    ResourceStates::PRESENT,
                    None,
                    &format!("Back buffer {i}"),
                )
                .map_err(|e| DeviceError::CreationFailed(format!("swap chain: {e}")))
            })
            .collect()
    }

    fn create_buffer(&self, heap: HeapType, desc: &ResourceDesc, label: &str) -> (Storage, u64) {
        // Copies and mapped writes move whole words.
        let size = align_up(desc.width.max(4), wgpu::COPY_BUFFER_ALIGNMENT);
        let usage = match heap {
            HeapType::Readback => wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            HeapType::Default | HeapType::Upload => {
                wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::UNIFORM
                    | wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::INDEX
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST
            }
        };
        let buffer = self.shared.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });
        let shadow = (heap == HeapType::Upload).then(|| Mutex::new(vec![0u8; size as usize]));
        (Storage::Buffer { buffer, shadow }, size)
    }

    fn create_texture(&self, desc: &ResourceDesc, label: &str) -> Result<(Storage, u64), ResourceError> {
        let format = storage_format(desc.format, desc.flags).ok_or_else(|| {
            invalid(format!("'{label}': {:?} has no texture format", desc.format))
        })?;
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC;
        if !format.is_depth_stencil_format() {
            usage |= wgpu::TextureUsages::COPY_DST;
        }
        if desc
            .flags
            .intersects(ResourceFlags::ALLOW_RENDER_TARGET | ResourceFlags::ALLOW_DEPTH_STENCIL)
        {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        if desc.flags.contains(ResourceFlags::ALLOW_UNORDERED_ACCESS) {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        let texture = self.shared.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: desc.width as u32,
                height: desc.height,
                depth_or_array_layers: desc.array_size,
            },
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let size = compute_copyable_footprints(desc, 0, desc.subresource_count(), 0).total_bytes;
        Ok((Storage::Texture { texture, format }, size))
    }
}

fn invalid(message: impl Into<String>) -> ResourceError {
    ResourceError::InvalidDesc(message.into())
}

fn viewed(resource: &Resource) -> ViewedResource<'_> {
    ViewedResource {
        id: resource.id,
        label: &resource.label,
        desc: &resource.desc,
    }
}

fn out_of_bounds(resource: &Resource, offset: u64, len: usize) -> ResourceError {
    ResourceError::OutOfBounds {
        resource: resource.id,
        offset,
        len: len as u64,
        size: resource.desc.width,
    }
}

impl GpuDevice for WgpuDevice {
    fn adapter_info(&self) -> AdapterInfo {
        self.adapter.clone()
    }

    fn create_committed_resource(
        &self,
        heap: HeapType,
        desc: &ResourceDesc,
        initial_state: ResourceStates,
        _clear_value: Option<ClearValue>,
        label: &str,
    ) -> Result<ResourceId, ResourceError> {
        checks::validate_desc(heap, desc, initial_state)?;
        let id = ResourceId(self.shared.next_id());
        let (storage, size, address) = if desc.is_buffer() {
            let (storage, size) = self.create_buffer(heap, desc, label);
            (storage, size, self.shared.allocate_address(desc.width))
        } else {
            let (storage, size) = self.create_texture(desc, label)?;
            (storage, size, 0)
        };
        log::trace!("Created '{label}' ({size} bytes, {heap:?} heap)");
        self.shared.insert_resource(Resource {
            id,
            label: label.to_owned(),
            heap,
            desc: *desc,
            address,
            size,
            storage,
        });
        Ok(id)
    }

    fn destroy_resource(&self, id: ResourceId) -> Result<(), ResourceError> {
        self.shared
            .remove_resource(id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound(id))
    }

    fn resource_desc(&self, id: ResourceId) -> Result<ResourceDesc, ResourceError> {
        Ok(self.resource(id)?.desc)
    }

    fn gpu_virtual_address(&self, id: ResourceId) -> Result<GpuVirtualAddress, ResourceError> {
        let resource = self.resource(id)?;
        if !resource.desc.is_buffer() {
            return Err(invalid(format!("texture '{}' has no virtual address", resource.label)));
        }
        Ok(resource.address)
    }

    fn write_mapped(&self, id: ResourceId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let resource = self.resource(id)?;
        let Storage::Buffer {
            buffer,
            shadow: Some(shadow),
        } = &resource.storage
        else {
            return Err(ResourceError::NotMappable(id));
        };
        let end = offset + data.len() as u64;
        if end > resource.desc.width {
            return Err(out_of_bounds(&resource, offset, data.len()));
        }
        let mut shadow = shadow.lock();
        shadow[offset as usize..end as usize].copy_from_slice(data);
        // `write_buffer` moves whole words; widen the span to them.
        let start = offset & !(wgpu::COPY_BUFFER_ALIGNMENT - 1);
        let end = align_up(end, wgpu::COPY_BUFFER_ALIGNMENT).min(shadow.len() as u64);
        if end > start {
            self.shared
                .queue
                .write_buffer(buffer, start, &shadow[start as usize..end as usize]);
        }
        Ok(())
    }

    fn read_mapped(&self, id: ResourceId, offset: u64, out: &mut [u8]) -> Result<(), ResourceError> {
        let resource = self.resource(id)?;
        if resource.heap == HeapType::Default {
            return Err(ResourceError::NotMappable(id));
        }
        let end = offset + out.len() as u64;
        if end > resource.desc.width {
            return Err(out_of_bounds(&resource, offset, out.len()));
        }
        let Storage::Buffer { buffer, shadow } = &resource.storage else {
            return Err(ResourceError::NotMappable(id));
        };
        if let Some(shadow) = shadow {
            out.copy_from_slice(&shadow.lock()[offset as usize..end as usize]);
            return Ok(());
        }

        let slice = buffer.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        if let Err(e) = self.shared.device.poll(wgpu::PollType::wait_indefinitely()) {
            return Err(ResourceError::BackendError(format!("poll failed: {e}")));
        }
        receiver
            .recv()
            .map_err(|_| ResourceError::BackendError("map callback dropped".into()))?
            .map_err(|e| {
                ResourceError::BackendError(format!("mapping '{}' failed: {e}", resource.label))
            })?;
        {
            let mapped = slice.get_mapped_range();
            out.copy_from_slice(&mapped[offset as usize..end as usize]);
        }
        buffer.unmap();
        Ok(())
    }

    fn create_descriptor_heap(
        &self,
        desc: &DescriptorHeapDesc,
    ) -> Result<DescriptorHeapInfo, DeviceError> {
        checks::check_heap_desc(desc).map_err(DeviceError::CreationFailed)?;
        let heap = Arc::new(DescriptorHeap::new(
            DescriptorHeapId(self.shared.next_id()),
            desc,
        ));
        let info = heap.info();
        log::debug!(
            "Created {:?} descriptor heap with {} slots (shader visible: {})",
            desc.ty,
            desc.capacity,
            desc.shader_visible
        );
        self.shared.heaps.write().insert(heap.id, heap);
        Ok(info)
    }

    fn create_shader_resource_view(
        &self,
        resource: ResourceId,
        desc: &ShaderResourceViewDesc,
        dest: CpuDescriptorHandle,
    ) -> Result<(), ResourceError> {
        checks::check_srv(viewed(&*self.resource(resource)?), desc)?;
        self.write_view(dest, Descriptor::Srv { resource, desc: *desc })
    }

    fn create_unordered_access_view(
        &self,
        resource: ResourceId,
        desc: &UnorderedAccessViewDesc,
        dest: CpuDescriptorHandle,
    ) -> Result<(), ResourceError> {
        checks::check_uav(viewed(&*self.resource(resource)?), desc)?;
        self.write_view(dest, Descriptor::Uav { resource, desc: *desc })
    }

    fn create_render_target_view(
        &self,
        resource: ResourceId,
        desc: &RenderTargetViewDesc,
        dest: CpuDescriptorHandle,
    ) -> Result<(), ResourceError> {
        let desc = checks::resolve_rtv(viewed(&*self.resource(resource)?), desc)?;
        self.write_view(dest, Descriptor::Rtv { resource, desc })
    }

    fn create_depth_stencil_view(
        &self,
        resource: ResourceId,
        desc: &DepthStencilViewDesc,
        dest: CpuDescriptorHandle,
    ) -> Result<(), ResourceError> {
        let desc = checks::resolve_dsv(viewed(&*self.resource(resource)?), desc)?;
        self.write_view(dest, Descriptor::Dsv { resource, desc })
    }

    fn create_constant_buffer_view(
        &self,
        desc: &ConstantBufferViewDesc,
        dest: CpuDescriptorHandle,
    ) -> Result<(), ResourceError> {
        checks::check_cbv_alignment(desc)?;
        let (resource, offset) = self.shared.resolve_address(desc.address).ok_or_else(|| {
            ResourceError::InvalidView(format!("unmapped address {:#x}", desc.address))
        })?;
        if offset + u64::from(desc.size) > resource.desc.width {
            return Err(out_of_bounds(&resource, offset, desc.size as usize));
        }
        self.write_view(dest, Descriptor::Cbv(*desc))
    }

    fn copy_descriptors(
        &self,
        count: u32,
        dest: CpuDescriptorHandle,
        src: CpuDescriptorHandle,
        heap_type: DescriptorHeapType,
    ) -> Result<(), ResourceError> {
        let (dest_heap, dest_slot) = self.view_slot(dest, heap_type)?;
        let (src_heap, src_slot) = self.view_slot(src, heap_type)?;
        if dest_slot + count > dest_heap.capacity() || src_slot + count > src_heap.capacity() {
            return Err(ResourceError::InvalidView(format!(
                "copying {count} descriptors runs past the end of a heap"
            )));
        }
        for i in 0..count {
            if let Some(descriptor) = src_heap.read(src_slot + i) {
                dest_heap.write(dest_slot + i, descriptor);
            }
        }
        Ok(())
    }

    fn create_root_signature(
        &self,
        desc: &RootSignatureDesc,
    ) -> Result<RootSignatureId, PipelineError> {
        checks::check_root_signature(desc)?;
        let id = RootSignatureId(self.shared.next_id());
        self.shared
            .root_signatures
            .write()
            .insert(id, Arc::new(desc.clone()));
        Ok(id)
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc,
    ) -> Result<PipelineId, PipelineError> {
        let pipeline = pipeline::create_graphics(&self.shared, desc)?;
        let id = PipelineId(self.shared.next_id());
        log::debug!("Created graphics pipeline '{}'", desc.label);
        self.shared.pipelines.write().insert(id, Arc::new(pipeline));
        Ok(id)
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc,
    ) -> Result<PipelineId, PipelineError> {
        let pipeline = pipeline::create_compute(&self.shared, desc)?;
        let id = PipelineId(self.shared.next_id());
        log::debug!("Created compute pipeline '{}'", desc.label);
        self.shared.pipelines.write().insert(id, Arc::new(pipeline));
        Ok(id)
    }

    fn create_command_queue(&self, ty: QueueType) -> Result<QueueId, DeviceError> {
        let id = QueueId(self.shared.next_id());
        let worker = QueueWorker::spawn(id, ty, self.shared.clone())?;
        self.queues.write().insert(id, worker);
        Ok(id)
    }

    fn create_fence(&self, initial_value: u64) -> Result<FenceId, DeviceError> {
        let id = FenceId(self.shared.next_id());
        self.shared
            .fences
            .write()
            .insert(id, Arc::new(Fence::new(initial_value)));
        Ok(id)
    }

    fn fence_completed_value(&self, fence: FenceId) -> Result<u64, DeviceError> {
        let fence = self.fence(fence)?;
        // Runs the callbacks of finished submissions.
        if let Err(e) = self.shared.device.poll(wgpu::PollType::Poll) {
            log::warn!("Failed to poll device (non-blocking): {e:?}");
        }
        Ok(fence.completed())
    }

    fn wait_for_fence(&self, fence: FenceId, value: u64) -> Result<(), DeviceError> {
        self.fence(fence)?.wait(value, &self.shared)
    }

    fn queue_signal(&self, queue: QueueId, fence: FenceId, value: u64) -> Result<(), DeviceError> {
        let fence = self.fence(fence)?;
        self.submit(queue, QueueOp::Signal(fence, value))
    }

    fn queue_wait(&self, queue: QueueId, fence: FenceId, value: u64) -> Result<(), DeviceError> {
        let fence = self.fence(fence)?;
        self.submit(queue, QueueOp::Wait(fence, value))
    }

    fn create_command_list(&self, ty: QueueType) -> Result<Box<dyn CommandList>, DeviceError> {
        self.check_alive()?;
        Ok(Box::new(RecordingList::new(self.shared.clone(), ty)))
    }

    fn execute_command_lists(
        &self,
        queue: QueueId,
        lists: &[CommandListId],
    ) -> Result<(), DeviceError> {
        self.check_alive()?;
        let queue_type = self
            .queues
            .read()
            .get(&queue)
            .map(|worker| worker.ty)
            .ok_or(DeviceError::InvalidHandle("queue"))?;
        let recorded = {
            let mut closed = self.shared.closed_lists.lock();
            let mut recorded = Vec::with_capacity(lists.len());
            for id in lists {
                let list = closed
                    .remove(id)
                    .ok_or(DeviceError::InvalidHandle("command list"))?;
                if list.ty != queue_type {
                    return Err(DeviceError::InvalidCommandList(format!(
                        "a {:?} list cannot run on a {queue_type:?} queue",
                        list.ty
                    )));
                }
                recorded.push(list);
            }
            recorded
        };
        self.submit(queue, QueueOp::Execute(recorded))
    }

    fn create_swap_chain(
        &self,
        queue: QueueId,
        desc: &SwapChainDesc,
    ) -> Result<SwapChainId, DeviceError> {
        if desc.buffer_count < 2 {
            return Err(DeviceError::CreationFailed(
                "a swap chain needs at least two buffers".into(),
            ));
        }
        let buffers = self.create_swap_chain_buffers(desc)?;
        let id = SwapChainId(self.shared.next_id());
        self.swap_chains
            .lock()
            .insert(id, SwapChain::new(queue, *desc, buffers));
        log::info!(
            "Created {}x{} swap chain with {} buffers",
            desc.width,
            desc.height,
            desc.buffer_count
        );
        Ok(id)
    }

    fn swap_chain_buffer(
        &self,
        swap_chain: SwapChainId,
        index: u32,
    ) -> Result<ResourceId, DeviceError> {
        self.swap_chains
            .lock()
            .get(&swap_chain)
            .and_then(|chain| chain.buffer(index))
            .ok_or(DeviceError::InvalidHandle("swap chain buffer"))
    }

    fn current_back_buffer_index(&self, swap_chain: SwapChainId) -> Result<u32, DeviceError> {
        self.swap_chains
            .lock()
            .get(&swap_chain)
            .map(SwapChain::current_index)
            .ok_or(DeviceError::InvalidHandle("swap chain"))
    }

    /// Back buffers are offscreen textures; presenting flips to the next one.
    fn present(&self, swap_chain: SwapChainId) -> Result<(), DeviceError> {
        self.check_alive()?;
        let mut chains = self.swap_chains.lock();
        let chain = chains
            .get_mut(&swap_chain)
            .ok_or(DeviceError::InvalidHandle("swap chain"))?;
        let presented = chain.advance();
        log::trace!("Presented back buffer {presented:?}");
        Ok(())
    }

    fn resize_swap_chain(
        &self,
        swap_chain: SwapChainId,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError> {
        if width == 0 || height == 0 {
            return Err(DeviceError::CreationFailed("zero-sized swap chain".into()));
        }
        let desc = {
            let chains = self.swap_chains.lock();
            let chain = chains
                .get(&swap_chain)
                .ok_or(DeviceError::InvalidHandle("swap chain"))?;
            SwapChainDesc {
                width,
                height,
                ..chain.desc()
            }
        };
        let buffers = self.create_swap_chain_buffers(&desc)?;
        let old = {
            let mut chains = self.swap_chains.lock();
            let chain = chains
                .get_mut(&swap_chain)
                .ok_or(DeviceError::InvalidHandle("swap chain"))?;
            chain.replace(desc, buffers)
        };
        for id in old {
            self.shared.remove_resource(id);
        }
        log::info!("Resized swap chain to {width}x{height}");
        Ok(())
    }

    fn device_removed_reason(&self) -> Option<String> {
        self.shared.removed_reason()
    }

    fn breadcrumbs(&self) -> Vec<String> {
        self.shared.breadcrumbs()
    }

    fn take_debug_messages(&self) -> Vec<DebugMessage> {
        self.shared.debug.take()
    }
}

impl Drop for WgpuDevice {
    fn drop(&mut self) {
        // Queue workers finish their submissions before the device goes.
        self.queues.write().clear();
        if let Err(e) = self.shared.device.poll(wgpu::PollType::wait_indefinitely()) {
            log::warn!("Failed to poll device during shutdown: {e:?}");
        }
    }
}
