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

//! A recording device for unit tests of the device-agnostic subsystems.
//!
//! Resources are descriptions only, fences complete as soon as they are
//! signaled, and submitted command lists are kept for inspection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::api::*;
use super::error::{DeviceError, PipelineError, ResourceError};
use super::traits::{CommandList, GpuDevice};

/// A command captured by [`MockCommandList`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MockCommand {
    Barrier(ResourceBarrier),
    CopyBuffer {
        dest: ResourceId,
        src: ResourceId,
        size: u64,
    },
    CopyTexture,
    Dispatch([u32; 3]),
    Draw,
    BeginEvent(String),
    EndEvent,
    Other,
}

#[derive(Debug, Default)]
struct MockState {
    resources: HashMap<ResourceId, (HeapType, ResourceDesc, Vec<u8>)>,
    fences: HashMap<FenceId, u64>,
    recorded: HashMap<CommandListId, Vec<MockCommand>>,
    executed: Vec<Vec<MockCommand>>,
    views: HashMap<usize, ResourceId>,
    fail_label: Option<String>,
}

#[derive(Debug)]
pub(crate) struct MockDevice {
    next_id: AtomicU64,
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            state: Arc::new(Mutex::new(MockState::default())),
        })
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Makes resource creation fail for resources with this label.
    pub(crate) fn fail_resources_named(&self, label: &str) {
        self.state.lock().fail_label = Some(label.to_owned());
    }

    pub(crate) fn live_resources(&self) -> usize {
        self.state.lock().resources.len()
    }

    pub(crate) fn executed(&self) -> Vec<Vec<MockCommand>> {
        self.state.lock().executed.clone()
    }

    pub(crate) fn executed_barriers(&self) -> Vec<ResourceBarrier> {
        self.executed()
            .into_iter()
            .flatten()
            .filter_map(|c| match c {
                MockCommand::Barrier(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn view_target(&self, cpu: CpuDescriptorHandle) -> Option<ResourceId> {
        self.state.lock().views.get(&cpu.ptr).copied()
    }
}

pub(crate) struct MockCommandList {
    ty: QueueType,
    commands: Vec<MockCommand>,
    state: Arc<Mutex<MockState>>,
    id: u64,
}

impl MockCommandList {
    fn push(&mut self, command: MockCommand) {
        self.commands.push(command);
    }
}

impl CommandList for MockCommandList {
    fn queue_type(&self) -> QueueType {
        self.ty
    }
    fn resource_barrier(&mut self, barriers: &[ResourceBarrier]) {
        for b in barriers {
            self.push(MockCommand::Barrier(*b));
        }
    }
    fn set_descriptor_heaps(&mut self, _heaps: &[DescriptorHeapId]) {}
    fn set_pipeline(&mut self, _pipeline: PipelineId) {}
    fn set_root_signature(&mut self, _bp: PipelineBindPoint, _rs: RootSignatureId) {}
    fn set_root_constants(&mut self, _bp: PipelineBindPoint, _p: u32, _v: &[u32], _o: u32) {}
    fn set_root_constant_buffer_view(&mut self, _bp: PipelineBindPoint, _p: u32, _a: u64) {}
    fn set_root_shader_resource_view(&mut self, _bp: PipelineBindPoint, _p: u32, _a: u64) {}
    fn set_root_unordered_access_view(&mut self, _bp: PipelineBindPoint, _p: u32, _a: u64) {}
    fn set_root_descriptor_table(
        &mut self,
        _bp: PipelineBindPoint,
        _p: u32,
        _b: GpuDescriptorHandle,
    ) {
    }
    fn set_viewport(&mut self, _v: Viewport) {}
    fn set_scissor_rect(&mut self, _r: ScissorRect) {}
    fn set_render_targets(&mut self, _r: &[CpuDescriptorHandle], _d: Option<CpuDescriptorHandle>) {}
    fn clear_render_target_view(&mut self, _rtv: CpuDescriptorHandle, _c: [f32; 4]) {
        self.push(MockCommand::Other);
    }
    fn clear_depth_stencil_view(&mut self, _dsv: CpuDescriptorHandle, _d: f32) {
        self.push(MockCommand::Other);
    }
    fn clear_unordered_access_view_uint(
        &mut self,
        _g: GpuDescriptorHandle,
        _c: CpuDescriptorHandle,
        _r: ResourceId,
        _v: [u32; 4],
    ) {
        self.push(MockCommand::Other);
    }
    fn set_primitive_topology(&mut self, _t: PrimitiveTopology) {}
    fn set_vertex_buffers(&mut self, _s: u32, _v: &[VertexBufferView]) {}
    fn set_index_buffer(&mut self, _v: Option<IndexBufferView>) {}
    fn draw_instanced(&mut self, _vc: u32, _ic: u32, _sv: u32, _si: u32) {
        self.push(MockCommand::Draw);
    }
    fn draw_indexed_instanced(&mut self, _ic: u32, _n: u32, _si: u32, _bv: i32, _s: u32) {
        self.push(MockCommand::Draw);
    }
    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.push(MockCommand::Dispatch([x, y, z]));
    }
    fn copy_buffer_region(&mut self, dest: ResourceId, _do: u64, src: ResourceId, _so: u64, size: u64) {
        self.push(MockCommand::CopyBuffer { dest, src, size });
    }
    fn copy_texture_region(&mut self, _dest: TextureCopyLocation, _src: TextureCopyLocation) {
        self.push(MockCommand::CopyTexture);
    }
    fn begin_event(&mut self, name: &str) {
        self.push(MockCommand::BeginEvent(name.to_owned()));
    }
    fn end_event(&mut self) {
        self.push(MockCommand::EndEvent);
    }
    fn close(self: Box<Self>) -> Result<CommandListId, DeviceError> {
        let id = CommandListId(self.id);
        self.state.lock().recorded.insert(id, self.commands);
        Ok(id)
    }
}

impl GpuDevice for MockDevice {
    fn adapter_info(&self) -> AdapterInfo {
        AdapterInfo {
            name: "Mock".into(),
            vendor_id: 0,
            dedicated_video_memory: 0,
            is_software: true,
            supports_bindless: true,
        }
    }

    fn create_committed_resource(
        &self,
        heap: HeapType,
        desc: &ResourceDesc,
        _initial_state: ResourceStates,
        _clear_value: Option<ClearValue>,
        label: &str,
    ) -> Result<ResourceId, ResourceError> {
        let mut state = self.state.lock();
        if state.fail_label.as_deref() == Some(label) {
            return Err(ResourceError::InvalidDesc(format!("refused '{label}'")));
        }
        let id = ResourceId(self.next());
        let bytes = if heap == HeapType::Default { 0 } else { desc.width as usize };
        state.resources.insert(id, (heap, *desc, vec![0; bytes]));
        Ok(id)
    }

    fn destroy_resource(&self, id: ResourceId) -> Result<(), ResourceError> {
        self.state
            .lock()
            .resources
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound(id))
    }

    fn resource_desc(&self, id: ResourceId) -> Result<ResourceDesc, ResourceError> {
        self.state
            .lock()
            .resources
            .get(&id)
            .map(|(_, d, _)| *d)
            .ok_or(ResourceError::NotFound(id))
    }

    fn gpu_virtual_address(&self, id: ResourceId) -> Result<GpuVirtualAddress, ResourceError> {
        Ok(id.0 << 32)
    }

    fn write_mapped(&self, id: ResourceId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        let (_, _, bytes) = state.resources.get_mut(&id).ok_or(ResourceError::NotFound(id))?;
        let start = offset as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_mapped(&self, id: ResourceId, offset: u64, out: &mut [u8]) -> Result<(), ResourceError> {
        let state = self.state.lock();
        let (_, _, bytes) = state.resources.get(&id).ok_or(ResourceError::NotFound(id))?;
        let start = offset as usize;
        out.copy_from_slice(&bytes[start..start + out.len()]);
        Ok(())
    }

    fn create_descriptor_heap(
        &self,
        desc: &DescriptorHeapDesc,
    ) -> Result<DescriptorHeapInfo, DeviceError> {
        let id = self.next();
        Ok(DescriptorHeapInfo {
            id: DescriptorHeapId(id),
            cpu_start: CpuDescriptorHandle {
                ptr: (id as usize) << 24,
            },
            gpu_start: if desc.shader_visible {
                GpuDescriptorHandle { ptr: id << 40 }
            } else {
                GpuDescriptorHandle::NULL
            },
            increment: 32,
        })
    }

    fn create_shader_resource_view(
        &self,
        resource: ResourceId,
        _desc: &ShaderResourceViewDesc,
        dest: CpuDescriptorHandle,
    ) -> Result<(), ResourceError> {
        self.state.lock().views.insert(dest.ptr, resource);
        Ok(())
    }

    fn create_unordered_access_view(
        &self,
        resource: ResourceId,
        _desc: &UnorderedAccessViewDesc,
        dest: CpuDescriptorHandle,
    ) -> Result<(), ResourceError> {
        self.state.lock().views.insert(dest.ptr, resource);
        Ok(())
    }

    fn create_render_target_view(
        &self,
        resource: ResourceId,
        _desc: &RenderTargetViewDesc,
        dest: CpuDescriptorHandle,
    ) -> Result<(), ResourceError> {
        self.state.lock().views.insert(dest.ptr, resource);
        Ok(())
    }

    fn create_depth_stencil_view(
        &self,
        resource: ResourceId,
        _desc: &DepthStencilViewDesc,
        dest: CpuDescriptorHandle,
    ) -> Result<(), ResourceError> {
        self.state.lock().views.insert(dest.ptr, resource);
        Ok(())
    }

    fn create_constant_buffer_view(
        &self,
        _desc: &ConstantBufferViewDesc,
        _dest: CpuDescriptorHandle,
    ) -> Result<(), ResourceError> {
        Ok(())
    }

    fn copy_descriptors(
        &self,
        _count: u32,
        _dest: CpuDescriptorHandle,
        _src: CpuDescriptorHandle,
        _heap_type: DescriptorHeapType,
    ) -> Result<(), ResourceError> {
        Ok(())
    }

    fn create_root_signature(&self, _d: &RootSignatureDesc) -> Result<RootSignatureId, PipelineError> {
        Ok(RootSignatureId(self.next()))
    }

    fn create_graphics_pipeline(
        &self,
        _d: &GraphicsPipelineDesc,
    ) -> Result<PipelineId, PipelineError> {
        Ok(PipelineId(self.next()))
    }

    fn create_compute_pipeline(&self, _d: &ComputePipelineDesc) -> Result<PipelineId, PipelineError> {
        Ok(PipelineId(self.next()))
    }

    fn create_command_queue(&self, _ty: QueueType) -> Result<QueueId, DeviceError> {
        Ok(QueueId(self.next()))
    }

    fn create_fence(&self, initial_value: u64) -> Result<FenceId, DeviceError> {
        let id = FenceId(self.next());
        self.state.lock().fences.insert(id, initial_value);
        Ok(id)
    }

    fn fence_completed_value(&self, fence: FenceId) -> Result<u64, DeviceError> {
        self.state
            .lock()
            .fences
            .get(&fence)
            .copied()
            .ok_or(DeviceError::InvalidHandle("fence"))
    }

    fn wait_for_fence(&self, fence: FenceId, value: u64) -> Result<(), DeviceError> {
        if self.fence_completed_value(fence)? >= value {
            Ok(())
        } else {
            Err(DeviceError::InvalidHandle("fence never signaled"))
        }
    }

    fn queue_signal(&self, _queue: QueueId, fence: FenceId, value: u64) -> Result<(), DeviceError> {
        self.state.lock().fences.insert(fence, value);
        Ok(())
    }

    fn queue_wait(&self, _queue: QueueId, _fence: FenceId, _value: u64) -> Result<(), DeviceError> {
        Ok(())
    }

    fn create_command_list(&self, ty: QueueType) -> Result<Box<dyn CommandList>, DeviceError> {
        Ok(Box::new(MockCommandList {
            ty,
            commands: Vec::new(),
            state: self.state.clone(),
            id: self.next(),
        }))
    }

    fn execute_command_lists(
        &self,
        _queue: QueueId,
        lists: &[CommandListId],
    ) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        for id in lists {
            let commands = state
                .recorded
                .remove(id)
                .ok_or(DeviceError::InvalidHandle("command list"))?;
            state.executed.push(commands);
        }
        Ok(())
    }

    fn create_swap_chain(&self, _q: QueueId, _d: &SwapChainDesc) -> Result<SwapChainId, DeviceError> {
        Ok(SwapChainId(self.next()))
    }

    fn swap_chain_buffer(&self, _s: SwapChainId, _i: u32) -> Result<ResourceId, DeviceError> {
        Err(DeviceError::InvalidHandle("swap chain"))
    }

    fn current_back_buffer_index(&self, _s: SwapChainId) -> Result<u32, DeviceError> {
        Ok(0)
    }

    fn present(&self, _s: SwapChainId) -> Result<(), DeviceError> {
        Ok(())
    }

    fn resize_swap_chain(&self, _s: SwapChainId, _w: u32, _h: u32) -> Result<(), DeviceError> {
        Ok(())
    }

    fn device_removed_reason(&self) -> Option<String> {
        None
    }

    fn breadcrumbs(&self) -> Vec<String> {
        Vec::new()
    }

    fn take_debug_messages(&self) -> Vec<DebugMessage> {
        Vec::new()
    }
}
