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

//! Command recording shared by every device.
//!
//! Recording never fails. CPU descriptor handles are resolved when recorded,
//! as the hardware copies them into the list, and everything else is checked
//! when the list is closed or executed. Devices differ only in what they do
//! with a closed list.

use std::sync::Arc;

use cortex_core::renderer::api::*;
use cortex_core::renderer::{CommandList, DeviceError};

use super::debug::DebugLayer;
use super::descriptors::Descriptor;

/// The device side of a [`RecordingList`].
pub(crate) trait ListSink: Send + Sync + 'static {
    /// The descriptor written at a CPU handle.
    fn descriptor_at(&self, handle: CpuDescriptorHandle) -> Option<Descriptor>;

    fn debug_layer(&self) -> &DebugLayer;

    /// Keeps a closed list until it is submitted.
    fn store_list(&self, ty: QueueType, commands: Vec<Command>) -> CommandListId;
}

/// A CPU descriptor handle and the view it held at record time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordedView {
    pub handle: CpuDescriptorHandle,
    pub descriptor: Option<Descriptor>,
}

/// Which root view a `SetRootView` binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RootViewKind {
    Cbv,
    Srv,
    Uav,
}

#[derive(Debug, Clone)]
pub(crate) enum Command {
    Barrier(Vec<ResourceBarrier>),
    SetDescriptorHeaps(Vec<DescriptorHeapId>),
    SetPipeline(PipelineId),
    SetRootSignature(PipelineBindPoint, RootSignatureId),
    SetRootConstants {
        bind_point: PipelineBindPoint,
        parameter: u32,
        values: Vec<u32>,
        dest_offset: u32,
    },
    SetRootView {
        bind_point: PipelineBindPoint,
        parameter: u32,
        kind: RootViewKind,
        address: GpuVirtualAddress,
    },
    SetRootTable {
        bind_point: PipelineBindPoint,
        parameter: u32,
        base: GpuDescriptorHandle,
    },
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    SetRenderTargets {
        render_targets: Vec<RecordedView>,
        depth_stencil: Option<RecordedView>,
    },
    ClearRenderTarget {
        view: RecordedView,
        color: [f32; 4],
    },
    ClearDepth {
        view: RecordedView,
        depth: f32,
    },
    ClearUavUint {
        gpu: GpuDescriptorHandle,
        cpu: RecordedView,
        resource: ResourceId,
        values: [u32; 4],
    },
    SetTopology(PrimitiveTopology),
    SetVertexBuffers {
        start_slot: u32,
        views: Vec<VertexBufferView>,
    },
    SetIndexBuffer(Option<IndexBufferView>),
    Draw(DrawCall),
    Dispatch([u32; 3]),
    CopyBuffer {
        dest: ResourceId,
        dest_offset: u64,
        src: ResourceId,
        src_offset: u64,
        size: u64,
    },
    CopyTexture {
        dest: TextureCopyLocation,
        src: TextureCopyLocation,
    },
    BeginEvent(String),
    EndEvent,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Barrier(_) => "ResourceBarrier",
            Command::SetDescriptorHeaps(_) => "SetDescriptorHeaps",
            Command::SetPipeline(_) => "SetPipelineState",
            Command::SetRootSignature(..) => "SetRootSignature",
            Command::SetRootConstants { .. } => "SetRoot32BitConstants",
            Command::SetRootView { .. } => "SetRootView",
            Command::SetRootTable { .. } => "SetRootDescriptorTable",
            Command::SetViewport(_) => "RSSetViewports",
            Command::SetScissor(_) => "RSSetScissorRects",
            Command::SetRenderTargets { .. } => "OMSetRenderTargets",
            Command::ClearRenderTarget { .. } => "ClearRenderTargetView",
            Command::ClearDepth { .. } => "ClearDepthStencilView",
            Command::ClearUavUint { .. } => "ClearUnorderedAccessViewUint",
            Command::SetTopology(_) => "IASetPrimitiveTopology",
            Command::SetVertexBuffers { .. } => "IASetVertexBuffers",
            Command::SetIndexBuffer(_) => "IASetIndexBuffer",
            Command::Draw(_) => "Draw",
            Command::Dispatch(_) => "Dispatch",
            Command::CopyBuffer { .. } => "CopyBufferRegion",
            Command::CopyTexture { .. } => "CopyTextureRegion",
            Command::BeginEvent(_) => "BeginEvent",
            Command::EndEvent => "EndEvent",
        }
    }

    /// Whether a list of family `ty` may hold this command.
    fn allowed_on(&self, ty: QueueType) -> bool {
        let graphics_only = matches!(
            self,
            Command::SetViewport(_)
                | Command::SetScissor(_)
                | Command::SetRenderTargets { .. }
                | Command::ClearRenderTarget { .. }
                | Command::ClearDepth { .. }
                | Command::SetTopology(_)
                | Command::SetVertexBuffers { .. }
                | Command::SetIndexBuffer(_)
                | Command::Draw(_)
        ) || matches!(
            self,
            Command::SetRootSignature(PipelineBindPoint::Graphics, _)
                | Command::SetRootConstants {
                    bind_point: PipelineBindPoint::Graphics,
                    ..
                }
                | Command::SetRootView {
                    bind_point: PipelineBindPoint::Graphics,
                    ..
                }
                | Command::SetRootTable {
                    bind_point: PipelineBindPoint::Graphics,
                    ..
                }
        );
        let copy_ok = matches!(
            self,
            Command::Barrier(_)
                | Command::CopyBuffer { .. }
                | Command::CopyTexture { .. }
                | Command::BeginEvent(_)
                | Command::EndEvent
        );
        match ty {
            QueueType::Graphics => true,
            QueueType::Compute => !graphics_only,
            QueueType::Copy => copy_ok,
        }
    }
}

/// Copy queues only see the copy states; every other transition belongs on
/// a graphics or compute list.
fn check_copy_states(barriers: &[ResourceBarrier]) -> Result<(), String> {
    let copy_states = ResourceStates::COPY_DEST | ResourceStates::COPY_SOURCE;
    for barrier in barriers {
        if let ResourceBarrier::Transition { before, after, .. } = *barrier {
            for state in [before, after] {
                if !copy_states.contains(state) {
                    return Err(format!(
                        "transition involving {state:?} is not allowed on a Copy command list"
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Arguments of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DrawCall {
    Instanced {
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    },
    Indexed {
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    },
}

/// A closed list waiting for submission.
#[derive(Debug, Clone)]
pub(crate) struct RecordedList {
    pub id: CommandListId,
    pub ty: QueueType,
    pub commands: Vec<Command>,
}

/// A [`CommandList`] that buffers commands until its device submits them.
pub(crate) struct RecordingList<S: ListSink> {
    sink: Arc<S>,
    ty: QueueType,
    commands: Vec<Command>,
}

impl<S: ListSink> RecordingList<S> {
    pub fn new(sink: Arc<S>, ty: QueueType) -> Self {
        Self {
            sink,
            ty,
            commands: Vec::new(),
        }
    }

    fn record(&self, handle: CpuDescriptorHandle) -> RecordedView {
        RecordedView {
            handle,
            descriptor: self.sink.descriptor_at(handle),
        }
    }

    fn validate(&self) -> Result<(), String> {
        let mut depth = 0i32;
        for command in &self.commands {
            if !command.allowed_on(self.ty) {
                return Err(format!(
                    "{} is not allowed on a {:?} command list",
                    command.name(),
                    self.ty
                ));
            }
            if self.ty == QueueType::Copy {
                if let Command::Barrier(barriers) = command {
                    check_copy_states(barriers)?;
                }
            }
            match command {
                Command::BeginEvent(_) => depth += 1,
                Command::EndEvent => {
                    depth -= 1;
                    if depth < 0 {
                        return Err("EndEvent without a matching BeginEvent".into());
                    }
                }
                _ => {}
            }
        }
        if depth != 0 {
            return Err(format!("{depth} debug region(s) left open"));
        }
        Ok(())
    }
}

impl<S: ListSink> CommandList for RecordingList<S> {
    fn queue_type(&self) -> QueueType {
        self.ty
    }

    fn resource_barrier(&mut self, barriers: &[ResourceBarrier]) {
        if !barriers.is_empty() {
            self.commands.push(Command::Barrier(barriers.to_vec()));
        }
    }

    fn set_descriptor_heaps(&mut self, heaps: &[DescriptorHeapId]) {
        self.commands.push(Command::SetDescriptorHeaps(heaps.to_vec()));
    }

    fn set_pipeline(&mut self, pipeline: PipelineId) {
        self.commands.push(Command::SetPipeline(pipeline));
    }

    fn set_root_signature(&mut self, bind_point: PipelineBindPoint, root_signature: RootSignatureId) {
        self.commands
            .push(Command::SetRootSignature(bind_point, root_signature));
    }

    fn set_root_constants(
        &mut self,
        bind_point: PipelineBindPoint,
        parameter: u32,
        values: &[u32],
        dest_offset: u32,
    ) {
        self.commands.push(Command::SetRootConstants {
            bind_point,
            parameter,
            values: values.to_vec(),
            dest_offset,
        });
    }

    fn set_root_constant_buffer_view(
        &mut self,
        bind_point: PipelineBindPoint,
        parameter: u32,
        address: GpuVirtualAddress,
    ) {
        self.commands.push(Command::SetRootView {
            bind_point,
            parameter,
            kind: RootViewKind::Cbv,
            address,
        });
    }

    fn set_root_shader_resource_view(
        &mut self,
        bind_point: PipelineBindPoint,
        parameter: u32,
        address: GpuVirtualAddress,
    ) {
        self.commands.push(Command::SetRootView {
            bind_point,
            parameter,
            kind: RootViewKind::Srv,
            address,
        });
    }

    fn set_root_unordered_access_view(
        &mut self,
        bind_point: PipelineBindPoint,
        parameter: u32,
        address: GpuVirtualAddress,
    ) {
        self.commands.push(Command::SetRootView {
            bind_point,
            parameter,
            kind: RootViewKind::Uav,
            address,
        });
    }

    fn set_root_descriptor_table(
        &mut self,
        bind_point: PipelineBindPoint,
        parameter: u32,
        base: GpuDescriptorHandle,
    ) {
        self.commands.push(Command::SetRootTable {
            bind_point,
            parameter,
            base,
        });
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(Command::SetViewport(viewport));
    }

    fn set_scissor_rect(&mut self, rect: ScissorRect) {
        self.commands.push(Command::SetScissor(rect));
    }

    fn set_render_targets(
        &mut self,
        render_targets: &[CpuDescriptorHandle],
        depth_stencil: Option<CpuDescriptorHandle>,
    ) {
        let render_targets = render_targets.iter().map(|h| self.record(*h)).collect();
        let depth_stencil = depth_stencil.map(|h| self.record(h));
        self.commands.push(Command::SetRenderTargets {
            render_targets,
            depth_stencil,
        });
    }

    fn clear_render_target_view(&mut self, rtv: CpuDescriptorHandle, color: [f32; 4]) {
        let view = self.record(rtv);
        self.commands.push(Command::ClearRenderTarget { view, color });
    }

    fn clear_depth_stencil_view(&mut self, dsv: CpuDescriptorHandle, depth: f32) {
        let view = self.record(dsv);
        self.commands.push(Command::ClearDepth { view, depth });
    }

    fn clear_unordered_access_view_uint(
        &mut self,
        gpu: GpuDescriptorHandle,
        cpu: CpuDescriptorHandle,
        resource: ResourceId,
        values: [u32; 4],
    ) {
        let cpu = self.record(cpu);
        self.commands.push(Command::ClearUavUint {
            gpu,
            cpu,
            resource,
            values,
        });
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.commands.push(Command::SetTopology(topology));
    }

    fn set_vertex_buffers(&mut self, start_slot: u32, views: &[VertexBufferView]) {
        self.commands.push(Command::SetVertexBuffers {
            start_slot,
            views: views.to_vec(),
        });
    }

    fn set_index_buffer(&mut self, view: Option<IndexBufferView>) {
        self.commands.push(Command::SetIndexBuffer(view));
    }

    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) {
        self.commands.push(Command::Draw(DrawCall::Instanced {
            vertex_count,
            instance_count,
            start_vertex,
            start_instance,
        }));
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) {
        self.commands.push(Command::Draw(DrawCall::Indexed {
            index_count,
            instance_count,
            start_index,
            base_vertex,
            start_instance,
        }));
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(Command::Dispatch([x, y, z]));
    }

    fn copy_buffer_region(
        &mut self,
        dest: ResourceId,
        dest_offset: u64,
        src: ResourceId,
        src_offset: u64,
        size: u64,
    ) {
        self.commands.push(Command::CopyBuffer {
            dest,
            dest_offset,
            src,
            src_offset,
            size,
        });
    }

    fn copy_texture_region(&mut self, dest: TextureCopyLocation, src: TextureCopyLocation) {
        self.commands.push(Command::CopyTexture { dest, src });
    }

    fn begin_event(&mut self, name: &str) {
        self.commands.push(Command::BeginEvent(name.to_owned()));
    }

    fn end_event(&mut self) {
        self.commands.push(Command::EndEvent);
    }

    fn close(self: Box<Self>) -> Result<CommandListId, DeviceError> {
        if let Err(message) = self.validate() {
            self.sink.debug_layer().error(format!("Close: {message}"));
            return Err(DeviceError::InvalidCommandList(message));
        }
        let Self { sink, ty, commands } = *self;
        Ok(sink.store_list(ty, commands))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Closed {
        debug: DebugLayer,
        lists: Mutex<Vec<(QueueType, Vec<Command>)>>,
    }

    impl Closed {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                debug: DebugLayer::new(true),
                lists: Mutex::new(Vec::new()),
            })
        }
    }

    impl ListSink for Closed {
        fn descriptor_at(&self, _: CpuDescriptorHandle) -> Option<Descriptor> {
            None
        }

        fn debug_layer(&self) -> &DebugLayer {
            &self.debug
        }

        fn store_list(&self, ty: QueueType, commands: Vec<Command>) -> CommandListId {
            let mut lists = self.lists.lock();
            lists.push((ty, commands));
            CommandListId(lists.len() as u64)
        }
    }

    #[test]
    fn test_close_hands_commands_to_the_sink() {
        let sink = Closed::new();
        let mut list = Box::new(RecordingList::new(sink.clone(), QueueType::Compute));
        list.begin_event("Cull");
        list.dispatch(4, 1, 1);
        list.resource_barrier(&[]);
        list.end_event();
        assert_eq!(list.close().unwrap(), CommandListId(1));
        let lists = sink.lists.lock();
        assert_eq!(lists[0].0, QueueType::Compute);
        assert_eq!(lists[0].1.len(), 3);
        assert!(matches!(lists[0].1[1], Command::Dispatch([4, 1, 1])));
    }

    #[test]
    fn test_close_rejects_commands_of_another_family() {
        let sink = Closed::new();
        let mut list = Box::new(RecordingList::new(sink.clone(), QueueType::Copy));
        list.dispatch(1, 1, 1);
        assert!(matches!(list.close(), Err(DeviceError::InvalidCommandList(_))));
        assert!(sink.lists.lock().is_empty());
        let messages = sink.debug.take();
        assert!(messages[0].text.starts_with("Close: Dispatch"));
    }

    #[test]
    fn test_close_rejects_open_debug_regions() {
        let sink = Closed::new();
        let mut list = Box::new(RecordingList::new(sink, QueueType::Graphics));
        list.begin_event("Frame");
        assert!(list.close().is_err());
    }
}
