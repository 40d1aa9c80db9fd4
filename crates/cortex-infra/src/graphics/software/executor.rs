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

//! Executes recorded command lists on a queue worker.
//!
//! This is where the debug layer does most of its work: every barrier is
//! checked against the tracked state of the subresources it names, and every
//! clear, copy, draw and dispatch against the states its operands must be in.
//! Accesses the hardware would fault on are returned as [`Fault`]s.

use std::ops::Range;
use std::sync::Arc;

use cortex_core::renderer::api::{
    DescriptorHeapType, Format, GpuDescriptorHandle, HeapType, IndexBufferView,
    PipelineBindPoint, PrimitiveTopology, ResourceBarrier, ResourceFlags, ResourceId,
    ResourceStates, RootParameter, RootSignatureDesc, RootSignatureId, ScissorRect,
    TextureCopyLocation, UnorderedAccessViewDesc, VertexBufferView, Viewport,
};

use crate::graphics::descriptors::{Descriptor, DescriptorHeap};
use crate::graphics::recording::{Command, DrawCall, RecordedList, RecordedView, RootViewKind};

use super::bindings::{Bindings, RootArg, RwTexture};
use super::kernels::{DispatchContext, DrawContext, IndexStream, VertexStream};
use super::memory::{Resource, SubresourceLayout};
use super::pipeline::Pipeline;
use super::queue::present_state_ok;
use super::raster::RasterState;
use super::state::Shared;
use super::validation::Fault;

#[derive(Debug, Default)]
struct RootState {
    signature: Option<(RootSignatureId, Arc<RootSignatureDesc>)>,
    args: Vec<RootArg>,
}

/// Pipeline state set by a list. Every list starts from scratch.
#[derive(Debug, Default)]
struct BindState {
    heap: Option<Arc<DescriptorHeap>>,
    pipeline: Option<Arc<Pipeline>>,
    graphics: RootState,
    compute: RootState,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    render_targets: Vec<RecordedView>,
    depth_stencil: Option<RecordedView>,
    vertex_buffer: Option<VertexBufferView>,
    index_buffer: Option<IndexBufferView>,
    events: Vec<String>,
}

impl BindState {
    fn root(&mut self, bind_point: PipelineBindPoint) -> &mut RootState {
        match bind_point {
            PipelineBindPoint::Graphics => &mut self.graphics,
            PipelineBindPoint::Compute => &mut self.compute,
        }
    }
}

/// A linear run of rows inside a resource, for copies.
#[derive(Debug, Clone, Copy)]
struct Region {
    offset: usize,
    row_pitch: usize,
    row_bytes: usize,
    rows: usize,
}

impl Region {
    fn of_layout(layout: &SubresourceLayout) -> Self {
        Self {
            offset: layout.offset,
            row_pitch: layout.row_bytes,
            row_bytes: layout.row_bytes,
            rows: layout.height as usize,
        }
    }
}

pub(crate) struct Executor {
    shared: Arc<Shared>,
    queue: String,
}

impl Executor {
    pub fn new(shared: Arc<Shared>, queue: String) -> Self {
        Self { shared, queue }
    }

    fn error(&self, text: String) {
        self.shared.debug.error(format!("[{}] {text}", self.queue));
    }

    pub fn execute(&mut self, list: RecordedList) -> Result<(), Fault> {
        let mut state = BindState::default();
        for command in list.commands {
            self.command(&mut state, command)?;
        }
        Ok(())
    }

    /// Validates the back buffer state at present time.
    pub fn check_present(&self, back_buffer: ResourceId) {
        let Some(resource) = self.shared.resource(back_buffer) else {
            self.error(format!("presenting destroyed back buffer {back_buffer:?}"));
            return;
        };
        let states = resource.states();
        if !present_state_ok(&states) {
            self.error(format!(
                "'{}' is presented in state {:?} instead of PRESENT",
                resource.label, states[0]
            ));
        }
    }

    fn command(&self, state: &mut BindState, command: Command) -> Result<(), Fault> {
        match command {
            Command::Barrier(barriers) => {
                for barrier in &barriers {
                    self.barrier(barrier);
                }
            }
            Command::SetDescriptorHeaps(ids) => {
                state.heap = None;
                for id in ids {
                    match self.shared.heap(id) {
                        Some(heap) if !heap.shader_visible => {
                            self.error(format!("SetDescriptorHeaps with non shader-visible {id:?}"));
                        }
                        Some(heap) if heap.ty == DescriptorHeapType::CbvSrvUav => {
                            state.heap = Some(heap);
                        }
                        Some(_) => {}
                        None => return Err(Fault::new(format!("unknown descriptor heap {id:?}"))),
                    }
                }
            }
            Command::SetPipeline(id) => {
                state.pipeline = Some(
                    self.shared
                        .pipeline(id)
                        .ok_or_else(|| Fault::new(format!("unknown pipeline {id:?}")))?,
                );
            }
            Command::SetRootSignature(bind_point, id) => {
                let desc = self
                    .shared
                    .root_signature(id)
                    .ok_or_else(|| Fault::new(format!("unknown root signature {id:?}")))?;
                let root = state.root(bind_point);
                root.args = vec![RootArg::Unset; desc.parameters.len()];
                root.signature = Some((id, desc));
            }
            Command::SetRootConstants {
                bind_point,
                parameter,
                values,
                dest_offset,
            } => self.set_constants(state.root(bind_point), parameter, &values, dest_offset),
            Command::SetRootView {
                bind_point,
                parameter,
                kind,
                address,
            } => {
                let root = state.root(bind_point);
                let expected = match root_parameter(root, parameter) {
                    Some(RootParameter::Cbv { .. }) => Some(RootViewKind::Cbv),
                    Some(RootParameter::Srv { .. }) => Some(RootViewKind::Srv),
                    Some(RootParameter::Uav { .. }) => Some(RootViewKind::Uav),
                    _ => None,
                };
                if expected != Some(kind) {
                    self.error(format!(
                        "root {kind:?} bound to parameter {parameter}, which is {expected:?}"
                    ));
                } else if self.shared.resolve_address(address).is_none() {
                    self.error(format!(
                        "root {kind:?} at unmapped address {address:#x} (parameter {parameter})"
                    ));
                }
                set_arg(root, parameter, RootArg::View(kind, address));
            }
            Command::SetRootTable {
                bind_point,
                parameter,
                base,
            } => {
                let root = state.root(bind_point);
                if !matches!(
                    root_parameter(root, parameter),
                    Some(RootParameter::DescriptorTable { .. })
                ) {
                    self.error(format!("descriptor table bound to parameter {parameter}"));
                }
                set_arg(root, parameter, RootArg::Table(base));
            }
            Command::SetViewport(viewport) => state.viewport = Some(viewport),
            Command::SetScissor(rect) => state.scissor = Some(rect),
            Command::SetRenderTargets {
                render_targets,
                depth_stencil,
            } => {
                state.render_targets = render_targets;
                state.depth_stencil = depth_stencil;
            }
            Command::ClearRenderTarget { view, color } => {
                if let Some(mut target) = self.render_target(&view, ResourceStates::RENDER_TARGET)? {
                    target.fill(color);
                }
            }
            Command::ClearDepth { view, depth } => {
                if let Some(mut target) = self.depth_target(&view, true)? {
                    target.fill([depth, 0.0, 0.0, 0.0]);
                }
            }
            Command::ClearUavUint {
                gpu,
                cpu,
                resource,
                values,
            } => self.clear_uav(state, gpu, &cpu, resource, values)?,
            Command::SetTopology(topology) => {
                if topology != PrimitiveTopology::TriangleList {
                    self.error(format!("unsupported topology {topology:?}"));
                }
            }
            Command::SetVertexBuffers { start_slot, views } => {
                if start_slot != 0 || views.len() > 1 {
                    self.error("only vertex buffer slot 0 is supported".into());
                }
                state.vertex_buffer = views.first().copied();
            }
            Command::SetIndexBuffer(view) => state.index_buffer = view,
            Command::Draw(call) => self.draw(state, call)?,
            Command::Dispatch(groups) => self.dispatch(state, groups)?,
            Command::CopyBuffer {
                dest,
                dest_offset,
                src,
                src_offset,
                size,
            } => self.copy_buffer(dest, dest_offset as usize, src, src_offset as usize, size as usize)?,
            Command::CopyTexture { dest, src } => self.copy_texture(&dest, &src)?,
            Command::BeginEvent(name) => {
                self.shared.push_breadcrumb(format!("{}: {name}", self.queue));
                state.events.push(name);
            }
            Command::EndEvent => {
                state.events.pop();
            }
        }
        Ok(())
    }

    fn barrier(&self, barrier: &ResourceBarrier) {
        match *barrier {
            ResourceBarrier::Transition {
                resource,
                subresource,
                before,
                after,
            } => {
                let Some(resource) = self.shared.resource(resource) else {
                    self.error(format!("transition of destroyed resource {resource:?}"));
                    return;
                };
                if resource.heap != HeapType::Default {
                    self.error(format!(
                        "'{}' lives in a {:?} heap and cannot be transitioned",
                        resource.label, resource.heap
                    ));
                    return;
                }
                if before == after {
                    self.error(format!(
                        "transition of '{}' from {before:?} to itself",
                        resource.label
                    ));
                }
                if !after.is_valid_combination() {
                    self.error(format!(
                        "'{}' transitioned to invalid state combination {after:?}",
                        resource.label
                    ));
                }
                let range = resource.subresources(subresource);
                let mut states = resource.states();
                for sub in range {
                    let Some(current) = states.get_mut(sub as usize) else {
                        self.error(format!(
                            "transition of '{}' subresource {sub}, past its {} subresources",
                            resource.label,
                            resource.desc.subresource_count()
                        ));
                        return;
                    };
                    if *current != before {
                        self.error(format!(
                            "'{}' subresource {sub} transitioned from {before:?} but is in {current:?}",
                            resource.label
                        ));
                    }
                    *current = after;
                }
            }
            ResourceBarrier::Uav { resource } => {
                if let Some(id) = resource {
                    match self.shared.resource(id) {
                        Some(r) if !r.desc.flags.contains(ResourceFlags::ALLOW_UNORDERED_ACCESS) => {
                            self.error(format!("UAV barrier on '{}', which has no UAV access", r.label));
                        }
                        Some(_) => {}
                        None => self.error(format!("UAV barrier on destroyed resource {id:?}")),
                    }
                }
            }
            ResourceBarrier::Aliasing { .. } => {}
        }
    }

    fn set_constants(
        &self,
        root: &mut RootState,
        parameter: u32,
        values: &[u32],
        dest_offset: u32,
    ) {
        let Some(RootParameter::Constants { count, .. }) = root_parameter(root, parameter).cloned()
        else {
            self.error(format!("root constants bound to parameter {parameter}"));
            return;
        };
        let end = dest_offset as usize + values.len();
        if end > count as usize {
            self.error(format!(
                "{} root constants at offset {dest_offset} overflow the {count} of parameter {parameter}",
                values.len()
            ));
            return;
        }
        let mut current = match root.args.get(parameter as usize) {
            Some(RootArg::Constants(existing)) => existing.clone(),
            _ => vec![0; count as usize],
        };
        current[dest_offset as usize..end].copy_from_slice(values);
        set_arg(root, parameter, RootArg::Constants(current));
    }

    fn expect_state(
        &self,
        resource: &Resource,
        subresources: Range<u32>,
        required: ResourceStates,
        what: &str,
    ) -> bool {
        let states = resource.states();
        for sub in subresources {
            let state = states.get(sub as usize).copied().unwrap_or(ResourceStates::COMMON);
            if !state.contains(required) {
                self.error(format!(
                    "'{}' subresource {sub} used as {what} in state {state:?}, which lacks {required:?}",
                    resource.label
                ));
                return false;
            }
        }
        true
    }

    fn view_resource(
        &self,
        view: &RecordedView,
        what: &str,
    ) -> Result<Option<(Arc<Resource>, Descriptor)>, Fault> {
        let Some(descriptor) = view.descriptor else {
            self.error(format!("{what} handle {:#x} holds no descriptor", view.handle.ptr));
            return Ok(None);
        };
        let id = match descriptor {
            Descriptor::Rtv { resource, .. }
            | Descriptor::Dsv { resource, .. }
            | Descriptor::Uav { resource, .. }
            | Descriptor::Srv { resource, .. } => resource,
            Descriptor::Cbv(_) => {
                self.error(format!("{what} handle holds a CBV"));
                return Ok(None);
            }
        };
        let resource = self
            .shared
            .resource(id)
            .ok_or_else(|| Fault::new(format!("{what} references destroyed resource {id:?}")))?;
        Ok(Some((resource, descriptor)))
    }

    fn checkout(
        &self,
        resource: &Arc<Resource>,
        subresource: u32,
        format: Format,
    ) -> Result<RwTexture, Fault> {
        let layout = *resource.layouts.get(subresource as usize).ok_or_else(|| {
            Fault::new(format!("'{}' has no subresource {subresource}", resource.label))
        })?;
        let checkout = resource.checkout().ok_or_else(|| {
            Fault::new(format!("'{}' is written by two queues at once", resource.label))
        })?;
        let format = if format == Format::Unknown { resource.desc.format } else { format };
        Ok(RwTexture::new(checkout, layout, format))
    }

    fn render_target(
        &self,
        view: &RecordedView,
        required: ResourceStates,
    ) -> Result<Option<RwTexture>, Fault> {
        let Some((resource, descriptor)) = self.view_resource(view, "RTV")? else {
            return Ok(None);
        };
        let Descriptor::Rtv { desc, .. } = descriptor else {
            self.error(format!("'{}' bound as a render target through a non-RTV descriptor", resource.label));
            return Ok(None);
        };
        let sub = resource.desc.subresource_index(desc.mip_slice, desc.array_slice);
        if !self.expect_state(&resource, sub..sub + 1, required, "render target") {
            return Ok(None);
        }
        self.checkout(&resource, sub, desc.format).map(Some)
    }

    fn depth_target(
        &self,
        view: &RecordedView,
        write: bool,
    ) -> Result<Option<RwTexture>, Fault> {
        let Some((resource, descriptor)) = self.view_resource(view, "DSV")? else {
            return Ok(None);
        };
        let Descriptor::Dsv { desc, .. } = descriptor else {
            self.error(format!("'{}' bound as depth through a non-DSV descriptor", resource.label));
            return Ok(None);
        };
        let sub = resource.desc.subresource_index(desc.mip_slice, desc.array_slice);
        let required = if write { ResourceStates::DEPTH_WRITE } else { ResourceStates::DEPTH_READ };
        let ok = {
            let states = resource.states();
            let state = states.get(sub as usize).copied().unwrap_or(ResourceStates::COMMON);
            state.contains(required) || (!write && state.contains(ResourceStates::DEPTH_WRITE))
        };
        if !ok {
            self.error(format!("'{}' used as depth target without {required:?}", resource.label));
            return Ok(None);
        }
        self.checkout(&resource, sub, desc.format).map(Some)
    }

    fn clear_uav(
        &self,
        state: &BindState,
        gpu: GpuDescriptorHandle,
        cpu: &RecordedView,
        resource_id: ResourceId,
        values: [u32; 4],
    ) -> Result<(), Fault> {
        match self.shared.cpu_slot(cpu.handle) {
            Some((heap, _)) if heap.shader_visible => {
                self.error("ClearUnorderedAccessViewUint needs a CPU handle from a non shader-visible heap".into());
            }
            Some(_) => {}
            None => return Err(Fault::new("ClearUnorderedAccessViewUint with an invalid CPU handle")),
        }
        let gpu_ok = match (self.shared.gpu_slot(gpu), &state.heap) {
            (Some(slot), Some(heap)) => slot.heap == heap.id,
            _ => false,
        };
        if !gpu_ok {
            self.error("ClearUnorderedAccessViewUint GPU handle is outside the bound heap".into());
        }
        let Some((resource, descriptor)) = self.view_resource(cpu, "UAV")? else {
            return Ok(());
        };
        if resource.id != resource_id {
            self.error(format!("UAV clear of {resource_id:?} through a view of '{}'", resource.label));
            return Ok(());
        }
        match descriptor {
            Descriptor::Uav {
                desc: UnorderedAccessViewDesc::Texture2D { format, mip_slice },
                ..
            } => {
                let sub = resource.desc.subresource_index(mip_slice, 0);
                if self.expect_state(&resource, sub..sub + 1, ResourceStates::UNORDERED_ACCESS, "cleared UAV") {
                    self.checkout(&resource, sub, format)?.fill_uint(values);
                }
            }
            Descriptor::Uav {
                desc: UnorderedAccessViewDesc::Buffer { first_element, num_elements, stride },
                ..
            } => {
                if self.expect_state(&resource, 0..1, ResourceStates::UNORDERED_ACCESS, "cleared UAV") {
                    let element = if stride == 0 { 4 } else { stride as usize };
                    let start = first_element as usize * element;
                    let end = (start + num_elements as usize * element).min(resource.size);
                    let mut checkout = resource.checkout().ok_or_else(|| {
                        Fault::new(format!("'{}' is written by two queues at once", resource.label))
                    })?;
                    for word in checkout.bytes_mut()[start..end].chunks_exact_mut(4) {
                        word.copy_from_slice(&values[0].to_le_bytes());
                    }
                }
            }
            _ => self.error(format!("UAV clear of '{}' through a non-UAV descriptor", resource.label)),
        }
        Ok(())
    }

    fn bindings<'a>(
        &'a self,
        state: &'a BindState,
        bind_point: PipelineBindPoint,
        pipeline: &'a Pipeline,
    ) -> Option<Bindings<'a>> {
        let root = match bind_point {
            PipelineBindPoint::Graphics => &state.graphics,
            PipelineBindPoint::Compute => &state.compute,
        };
        let Some((id, signature)) = &root.signature else {
            self.error(format!("'{}' used without a root signature", pipeline.label()));
            return None;
        };
        if *id != pipeline.root_signature() {
            self.error(format!(
                "'{}' was created with {:?} but {id:?} is bound",
                pipeline.label(),
                pipeline.root_signature()
            ));
            return None;
        }
        Some(Bindings {
            shared: &self.shared,
            signature,
            args: &root.args,
            heap: state.heap.clone(),
            read_state: match bind_point {
                PipelineBindPoint::Graphics => ResourceStates::PIXEL_SHADER_RESOURCE,
                PipelineBindPoint::Compute => ResourceStates::NON_PIXEL_SHADER_RESOURCE,
            },
            label: pipeline.label(),
        })
    }

    fn dispatch(&self, state: &BindState, groups: [u32; 3]) -> Result<(), Fault> {
        let Some(pipeline) = state.pipeline.clone() else {
            self.error("Dispatch without a pipeline".into());
            return Ok(());
        };
        let Pipeline::Compute(compute) = pipeline.as_ref() else {
            self.error(format!("Dispatch with graphics pipeline '{}'", pipeline.label()));
            return Ok(());
        };
        if groups.contains(&0) {
            return Ok(());
        }
        let Some(bindings) = self.bindings(state, PipelineBindPoint::Compute, &pipeline) else {
            return Ok(());
        };
        (compute.kernel.run)(&DispatchContext { bindings, groups })
    }

    fn draw(&self, state: &BindState, call: DrawCall) -> Result<(), Fault> {
        let Some(pipeline) = state.pipeline.clone() else {
            self.error("Draw without a pipeline".into());
            return Ok(());
        };
        let Pipeline::Graphics(graphics) = pipeline.as_ref() else {
            self.error(format!("Draw with compute pipeline '{}'", pipeline.label()));
            return Ok(());
        };
        let Some(viewport) = state.viewport else {
            self.error(format!("'{}' drawn without a viewport", graphics.label));
            return Ok(());
        };
        if state.render_targets.len() != graphics.render_target_formats.len() {
            self.error(format!(
                "'{}' expects {} render targets, {} are bound",
                graphics.label,
                graphics.render_target_formats.len(),
                state.render_targets.len()
            ));
            return Ok(());
        }
        let Some(bindings) = self.bindings(state, PipelineBindPoint::Graphics, &pipeline) else {
            return Ok(());
        };

        let mut bounds = [
            viewport.x.floor() as i32,
            viewport.y.floor() as i32,
            (viewport.x + viewport.width).ceil() as i32,
            (viewport.y + viewport.height).ceil() as i32,
        ];
        if let Some(s) = state.scissor {
            bounds = [
                bounds[0].max(s.left),
                bounds[1].max(s.top),
                bounds[2].min(s.right),
                bounds[3].min(s.bottom),
            ];
        }

        let mut targets = Vec::with_capacity(state.render_targets.len());
        for (view, format) in state.render_targets.iter().zip(&graphics.render_target_formats) {
            if let Some(Descriptor::Rtv { desc, .. }) = view.descriptor {
                if desc.format != *format {
                    self.error(format!(
                        "'{}' writes {format:?} but the bound RTV is {:?}",
                        graphics.label, desc.format
                    ));
                    return Ok(());
                }
            }
            let Some(target) = self.render_target(view, ResourceStates::RENDER_TARGET)? else {
                return Ok(());
            };
            targets.push(target);
        }
        let depth = match (graphics.depth_format, &state.depth_stencil) {
            (Some(_), Some(view)) => {
                let Some(depth) = self.depth_target(view, graphics.depth.write)? else {
                    return Ok(());
                };
                Some(depth)
            }
            (Some(format), None) => {
                self.error(format!("'{}' expects a {format:?} depth target", graphics.label));
                return Ok(());
            }
            (None, _) => None,
        };
        for target in targets.iter().map(RwTexture::size).chain(depth.iter().map(RwTexture::size)) {
            bounds[2] = bounds[2].min(target.0 as i32);
            bounds[3] = bounds[3].min(target.1 as i32);
        }

        let vertices = match state.vertex_buffer {
            Some(view) => {
                let (resource, offset) = self.shared.resolve_address(view.address).ok_or_else(|| {
                    Fault::new(format!("vertex buffer at unmapped address {:#x}", view.address))
                })?;
                self.expect_state(&resource, 0..1, ResourceStates::VERTEX_AND_CONSTANT_BUFFER, "vertex buffer");
                let len = (view.size_in_bytes as usize).min(resource.size - offset);
                let data = resource.snapshot().ok_or_else(|| {
                    Fault::new(format!("'{}' is read while being written", resource.label))
                })?;
                Some(VertexStream::new(data, offset, len, view.stride))
            }
            None => None,
        };
        let indices = match (call, state.index_buffer) {
            (DrawCall::Indexed { .. }, Some(view)) => {
                let (resource, offset) = self.shared.resolve_address(view.address).ok_or_else(|| {
                    Fault::new(format!("index buffer at unmapped address {:#x}", view.address))
                })?;
                self.expect_state(&resource, 0..1, ResourceStates::INDEX_BUFFER, "index buffer");
                let len = (view.size_in_bytes as usize).min(resource.size - offset);
                let data = resource.snapshot().ok_or_else(|| {
                    Fault::new(format!("'{}' is read while being written", resource.label))
                })?;
                Some(IndexStream::new(data, offset, len, view.format))
            }
            _ => None,
        };

        let mut ctx = DrawContext {
            bindings,
            pipeline: graphics,
            raster: RasterState {
                viewport,
                bounds,
                cull: graphics.cull_mode,
            },
            targets,
            depth,
            vertices,
            indices,
            call,
        };
        graphics.program.draw(&mut ctx)
    }

    fn copy_buffer(
        &self,
        dest: ResourceId,
        dest_offset: usize,
        src: ResourceId,
        src_offset: usize,
        size: usize,
    ) -> Result<(), Fault> {
        let (dest, src) = self.copy_operands(dest, src)?;
        if !self.copy_states(&dest, 0..1, &src, 0..1) {
            return Ok(());
        }
        if src_offset + size > src.size || dest_offset + size > dest.size {
            self.error(format!(
                "copy of {size} bytes from '{}'+{src_offset} to '{}'+{dest_offset} is out of bounds",
                src.label, dest.label
            ));
            return Ok(());
        }
        let data = src.snapshot().ok_or_else(|| Fault::new(format!("'{}' is read while being written", src.label)))?;
        let mut out = dest.checkout().ok_or_else(|| Fault::new(format!("'{}' is written by two queues at once", dest.label)))?;
        out.bytes_mut()[dest_offset..dest_offset + size].copy_from_slice(&data[src_offset..src_offset + size]);
        Ok(())
    }

    fn copy_operands(
        &self,
        dest: ResourceId,
        src: ResourceId,
    ) -> Result<(Arc<Resource>, Arc<Resource>), Fault> {
        if dest == src {
            return Err(Fault::new(format!("copy from {src:?} onto itself")));
        }
        let find = |id: ResourceId| {
            self.shared
                .resource(id)
                .ok_or_else(|| Fault::new(format!("copy references destroyed resource {id:?}")))
        };
        Ok((find(dest)?, find(src)?))
    }

    fn copy_states(
        &self,
        dest: &Resource,
        dest_subs: Range<u32>,
        src: &Resource,
        src_subs: Range<u32>,
    ) -> bool {
        // Readback memory sits in COPY_DEST for its whole life.
        let dest_ok = dest.heap == HeapType::Readback
            || self.expect_state(dest, dest_subs, ResourceStates::COPY_DEST, "copy destination");
        let src_ok = self.expect_state(src, src_subs, ResourceStates::COPY_SOURCE, "copy source");
        dest_ok && src_ok
    }

    fn region(&self, location: &TextureCopyLocation) -> Result<(ResourceId, u32, Region), Fault> {
        match *location {
            TextureCopyLocation::Subresource { resource, index } => {
                let r = self.shared.resource(resource).ok_or_else(|| {
                    Fault::new(format!("copy references destroyed resource {resource:?}"))
                })?;
                let layout = r.layouts.get(index as usize).ok_or_else(|| {
                    Fault::new(format!("'{}' has no subresource {index}", r.label))
                })?;
                Ok((resource, index, Region::of_layout(layout)))
            }
            TextureCopyLocation::Footprint { resource, footprint } => {
                let bpp = footprint.format.bytes_per_texel() as usize;
                Ok((
                    resource,
                    0,
                    Region {
                        offset: footprint.offset as usize,
                        row_pitch: footprint.row_pitch as usize,
                        row_bytes: footprint.width as usize * bpp,
                        rows: footprint.height as usize,
                    },
                ))
            }
        }
    }

    fn copy_texture(
        &self,
        dest: &TextureCopyLocation,
        src: &TextureCopyLocation,
    ) -> Result<(), Fault> {
        let (dest_id, dest_sub, dest_region) = self.region(dest)?;
        let (src_id, src_sub, src_region) = self.region(src)?;
        let (dest, src) = self.copy_operands(dest_id, src_id)?;
        if !self.copy_states(&dest, dest_sub..dest_sub + 1, &src, src_sub..src_sub + 1) {
            return Ok(());
        }
        if dest_region.row_bytes != src_region.row_bytes || dest_region.rows != src_region.rows {
            self.error(format!(
                "texture copy from '{}' to '{}' with mismatched footprints",
                src.label, dest.label
            ));
            return Ok(());
        }
        let last = |r: &Region| r.offset + r.row_pitch * r.rows.saturating_sub(1) + r.row_bytes;
        if last(&src_region) > src.size || last(&dest_region) > dest.size {
            return Err(Fault::new(format!(
                "texture copy from '{}' to '{}' runs past the end of a resource",
                src.label, dest.label
            )));
        }
        let data = src.snapshot().ok_or_else(|| Fault::new(format!("'{}' is read while being written", src.label)))?;
        let mut out = dest.checkout().ok_or_else(|| Fault::new(format!("'{}' is written by two queues at once", dest.label)))?;
        let bytes = out.bytes_mut();
        for row in 0..src_region.rows {
            let s = src_region.offset + row * src_region.row_pitch;
            let d = dest_region.offset + row * dest_region.row_pitch;
            bytes[d..d + dest_region.row_bytes].copy_from_slice(&data[s..s + src_region.row_bytes]);
        }
        Ok(())
    }
}

fn root_parameter(root: &RootState, parameter: u32) -> Option<&RootParameter> {
    root.signature
        .as_ref()
        .and_then(|(_, desc)| desc.parameters.get(parameter as usize))
}

fn set_arg(root: &mut RootState, parameter: u32, arg: RootArg) {
    if let Some(slot) = root.args.get_mut(parameter as usize) {
        *slot = arg;
    }
}
