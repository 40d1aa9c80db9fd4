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

//! The software reference device.

use std::collections::HashMap;
use std::sync::Arc;

use cortex_core::renderer::api::*;
use cortex_core::renderer::traits::{CommandList, GpuDevice};
use cortex_core::renderer::{DeviceError, PipelineError, ResourceError};
use parking_lot::{Mutex, RwLock};

use crate::graphics::checks::{self, ViewedResource};
use crate::graphics::descriptors::{Descriptor, DescriptorHeap};
use crate::graphics::recording::RecordingList;
use crate::graphics::swap_chain::SwapChain;

use super::memory::{Resource, WriteFailure};
use super::pipeline;
use super::queue::{Fence, QueueOp, QueueWorker};
use super::state::Shared;

/// A CPU interpreter of the explicit GPU API.
///
/// Queues run on their own worker threads and execute closed command lists
/// in submission order. With validation on, misuse is reported through
/// [`GpuDevice::take_debug_messages`] and logged at `error` level.
#[derive(Debug)]
pub struct SoftwareDevice {
    adapter: AdapterInfo,
    shared: Arc<Shared>,
    queues: RwLock<HashMap<QueueId, QueueWorker>>,
    swap_chains: Mutex<HashMap<SwapChainId, SwapChain>>,
}

impl SoftwareDevice {
    /// Creates a device for `adapter`.
    pub fn new(adapter: AdapterInfo, options: DeviceOptions) -> Self {
        log::debug!(
            "Creating software device (validation: {}, breadcrumbs: {})",
            options.validation,
            options.breadcrumbs
        );
        Self {
            adapter,
            shared: Arc::new(Shared::new(options)),
            queues: RwLock::new(HashMap::new()),
            swap_chains: Mutex::new(HashMap::new()),
        }
    }

    /// Removes the device as a driver would after a hang or page fault.
    /// Pending and future fence waits fail with [`DeviceError::Removed`].
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

    /// The heap and slot behind `dest`, checked against the view kind.
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

impl GpuDevice for SoftwareDevice {
    fn adapter_info(&self) -> AdapterInfo {
        self.adapter.clone()
    }

    fn create_committed_resource(
        &self,
        heap: HeapType,
        desc: &ResourceDesc,
        initial_state: ResourceStates,
        clear_value: Option<ClearValue>,
        label: &str,
    ) -> Result<ResourceId, ResourceError> {
        checks::validate_desc(heap, desc, initial_state)?;
        let id = ResourceId(self.shared.next_id());
        let address = if desc.is_buffer() {
            self.shared.allocate_address(desc.width)
        } else {
            0
        };
        let resource = Resource::new(id, heap, *desc, initial_state, clear_value, label, address);
        log::trace!("Created '{label}' ({} bytes, {heap:?} heap)", resource.size);
        self.shared.insert_resource(resource);
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
        if resource.heap != HeapType::Upload {
            return Err(ResourceError::NotMappable(id));
        }
        resource
            .write_bytes(offset as usize, data)
            .map_err(|failure| match failure {
                WriteFailure::OutOfBounds => ResourceError::OutOfBounds {
                    resource: id,
                    offset,
                    len: data.len() as u64,
                    size: resource.size as u64,
                },
                WriteFailure::Busy => ResourceError::BackendError(format!(
                    "'{}' is being written by a queue",
                    resource.label
                )),
            })
    }

    fn read_mapped(&self, id: ResourceId, offset: u64, out: &mut [u8]) -> Result<(), ResourceError> {
        let resource = self.resource(id)?;
        if resource.heap == HeapType::Default {
            return Err(ResourceError::NotMappable(id));
        }
        let start = offset as usize;
        let end = start + out.len();
        if end > resource.size {
            return Err(ResourceError::OutOfBounds {
                resource: id,
                offset,
                len: out.len() as u64,
                size: resource.size as u64,
            });
        }
        let bytes = resource.snapshot().ok_or_else(|| {
            ResourceError::BackendError(format!("'{}' is being written by a queue", resource.label))
        })?;
        out.copy_from_slice(&bytes[start..end]);
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
        if offset + desc.size as usize > resource.size {
            return Err(ResourceError::OutOfBounds {
                resource: resource.id,
                offset: offset as u64,
                len: u64::from(desc.size),
                size: resource.size as u64,
            });
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
        Ok(self.fence(fence)?.completed())
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

    fn present(&self, swap_chain: SwapChainId) -> Result<(), DeviceError> {
        self.check_alive()?;
        let (queue, back_buffer) = {
            let mut chains = self.swap_chains.lock();
            let chain = chains
                .get_mut(&swap_chain)
                .ok_or(DeviceError::InvalidHandle("swap chain"))?;
            (chain.queue(), chain.advance())
        };
        self.submit(queue, QueueOp::Present(back_buffer))
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

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> SoftwareDevice {
        SoftwareDevice::new(
            super::super::backend::software_adapter(),
            DeviceOptions {
                validation: true,
                breadcrumbs: false,
            },
        )
    }

    #[test]
    fn test_upload_heap_requires_generic_read() {
        let device = device();
        let err = device
            .create_committed_resource(
                HeapType::Upload,
                &ResourceDesc::buffer(64),
                ResourceStates::COPY_DEST,
                None,
                "bad upload",
            )
            .unwrap_err();
        assert!(matches!(err, ResourceError::InvalidDesc(_)));
    }

    #[test]
    fn test_buffers_get_distinct_addresses() {
        let device = device();
        let a = device
            .create_committed_resource(
                HeapType::Default,
                &ResourceDesc::buffer(100),
                ResourceStates::COMMON,
                None,
                "a",
            )
            .unwrap();
        let b = device
            .create_committed_resource(
                HeapType::Default,
                &ResourceDesc::buffer(100),
                ResourceStates::COMMON,
                None,
                "b",
            )
            .unwrap();
        let va = device.gpu_virtual_address(a).unwrap();
        let vb = device.gpu_virtual_address(b).unwrap();
        assert_ne!(va, 0);
        assert_ne!(va, vb);
    }

    #[test]
    fn test_mapped_write_then_read() {
        let device = device();
        let id = device
            .create_committed_resource(
                HeapType::Upload,
                &ResourceDesc::buffer(16),
                ResourceStates::GENERIC_READ,
                None,
                "upload",
            )
            .unwrap();
        device.write_mapped(id, 4, &[1, 2, 3, 4]).unwrap();
        let mut out = [0u8; 8];
        device.read_mapped(id, 0, &mut out).unwrap();
        assert_eq!(out, [0, 0, 0, 0, 1, 2, 3, 4]);
        assert!(matches!(
            device.write_mapped(id, 14, &[0; 4]),
            Err(ResourceError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_depth_views_need_depth_formats() {
        let device = device();
        let depth = device
            .create_committed_resource(
                HeapType::Default,
                &ResourceDesc::texture_2d(8, 8, Format::R32Typeless)
                    .with_flags(ResourceFlags::ALLOW_DEPTH_STENCIL),
                ResourceStates::DEPTH_WRITE,
                None,
                "depth",
            )
            .unwrap();
        let heap = device
            .create_descriptor_heap(&DescriptorHeapDesc {
                ty: DescriptorHeapType::CbvSrvUav,
                capacity: 4,
                shader_visible: false,
            })
            .unwrap();
        // Reading depth goes through R32Float, never the typeless or depth format.
        device
            .create_shader_resource_view(
                depth,
                &ShaderResourceViewDesc::texture_2d(Format::R32Float),
                heap.cpu_start,
            )
            .unwrap();
        assert!(device
            .create_shader_resource_view(
                depth,
                &ShaderResourceViewDesc::texture_2d(Format::D32Float),
                heap.cpu_start,
            )
            .is_err());
        assert!(device
            .create_shader_resource_view(
                depth,
                &ShaderResourceViewDesc::texture_2d(Format::Unknown),
                heap.cpu_start,
            )
            .is_err());
    }

    #[test]
    fn test_shader_visible_rtv_heap_is_rejected() {
        let device = device();
        assert!(device
            .create_descriptor_heap(&DescriptorHeapDesc {
                ty: DescriptorHeapType::Rtv,
                capacity: 4,
                shader_visible: true,
            })
            .is_err());
    }

    #[test]
    fn test_root_signature_size_limit() {
        let device = device();
        let desc = RootSignatureDesc {
            label: "huge".into(),
            parameters: vec![RootParameter::Constants {
                register: 0,
                count: 65,
            }],
            static_samplers: Vec::new(),
            flags: RootSignatureFlags::EMPTY,
        };
        assert!(matches!(
            device.create_root_signature(&desc),
            Err(PipelineError::InvalidRootSignature(_))
        ));
    }

    #[test]
    fn test_simulated_removal_fails_waits() {
        let device = device();
        let fence = device.create_fence(0).unwrap();
        device.simulate_removal("test hang");
        assert_eq!(device.device_removed_reason().as_deref(), Some("test hang"));
        assert!(matches!(
            device.wait_for_fence(fence, 1),
            Err(DeviceError::Removed { .. })
        ));
        assert!(device.create_command_list(QueueType::Graphics).is_err());
    }
}
