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

//! Translates recorded command lists into `wgpu` command buffers.
//!
//! Each draw and clear becomes its own render pass that loads and stores its
//! attachments, and each dispatch its own compute pass. Barriers are left to
//! `wgpu`, which tracks resource usage itself. Misuse is reported to the
//! debug layer and the offending call skipped; accesses that would fault on
//! hardware fail the list and remove the device.

use std::num::NonZeroU64;
use std::ops::Range;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use cortex_core::renderer::api::{
    DescriptorHeapType, Format, GpuDescriptorHandle, GpuVirtualAddress, IndexBufferView,
    PipelineBindPoint, PrimitiveTopology, ResourceId, RootParameter, RootSignatureDesc,
    RootSignatureId, ScissorRect, TextureCopyLocation, UnorderedAccessViewDesc,
    VertexBufferView, Viewport,
};
use cortex_core::utils::align_up;
use wgpu::util::DeviceExt;

use crate::graphics::descriptors::{decode_gpu, Descriptor, DescriptorHeap, DESCRIPTOR_INCREMENT};
use crate::graphics::recording::{Command, DrawCall, RecordedList, RecordedView, RootViewKind};
use crate::graphics::texel;

use super::conversions::IntoWgpu;
use super::pipeline::{Pipeline, ProgramLayout};
use super::shaders::{BindingSource, ROOT_BLOCK_SIZE, ROOT_BLOCK_STRIDE};
use super::state::{Resource, Shared};
use super::views;

/// Largest constant buffer a root CBV exposes.
const MAX_CBV_BYTES: u64 = 64 * 1024;

/// Word layout of the root block (see `common.wgsl`).
const BIAS_WORD: usize = 0;
const DRAW_WORD: usize = 16;
const CONSTANT_WORD: usize = 20;
const ROOT_BLOCK_WORDS: usize = (ROOT_BLOCK_SIZE / 4) as usize;

#[derive(Debug, Clone)]
enum RootArg {
    Unset,
    Constants(Vec<u32>),
    View(RootViewKind, GpuVirtualAddress),
    Table(GpuDescriptorHandle),
}

#[derive(Debug, Default)]
struct RootState {
    signature: Option<(RootSignatureId, Arc<RootSignatureDesc>)>,
    args: Vec<RootArg>,
}

impl RootState {
    fn parameter(&self, parameter: u32) -> Option<&RootParameter> {
        let (_, desc) = self.signature.as_ref()?;
        desc.parameters.get(parameter as usize)
    }

    fn set(&mut self, parameter: u32, arg: RootArg) {
        if let Some(slot) = self.args.get_mut(parameter as usize) {
            *slot = arg;
        }
    }
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
}

impl BindState {
    fn root(&mut self, bind_point: PipelineBindPoint) -> &mut RootState {
        match bind_point {
            PipelineBindPoint::Graphics => &mut self.graphics,
            PipelineBindPoint::Compute => &mut self.compute,
        }
    }
}

/// The root blocks of one submission, uploaded before it runs.
struct RootArena {
    buffer: wgpu::Buffer,
    bytes: Vec<u8>,
    used: u64,
}

impl RootArena {
    fn new(device: &wgpu::Device, calls: usize) -> Self {
        let size = ROOT_BLOCK_STRIDE * calls.max(1) as u64;
        Self {
            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Root arguments"),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            bytes: vec![0; size as usize],
            used: 0,
        }
    }

    fn push(&mut self, words: &[u32; ROOT_BLOCK_WORDS]) -> Result<u64> {
        let offset = self.used;
        let end = offset as usize + ROOT_BLOCK_SIZE as usize;
        let block = self
            .bytes
            .get_mut(offset as usize..end)
            .ok_or_else(|| anyhow!("root argument arena exhausted"))?;
        block.copy_from_slice(bytemuck::cast_slice(words));
        self.used += ROOT_BLOCK_STRIDE;
        Ok(offset)
    }
}

/// What a group 0 binding resolved to.
enum Bound<'a> {
    RootBlock,
    Buffer {
        resource: Arc<Resource>,
        offset: u64,
        size: Option<NonZeroU64>,
    },
    View(wgpu::TextureView),
    Sampler(&'a wgpu::Sampler),
}

/// Rows of `width` texels holding `values`, padded to the copy pitch, and
/// that pitch.
pub(crate) fn clear_pattern(format: Format, values: [u32; 4], width: u32, height: u32) -> (Vec<u8>, u32) {
    let bpp = format.bytes_per_texel() as usize;
    let mut texel = vec![0u8; bpp];
    texel::encode_uint(format, values, &mut texel);
    let row_pitch = align_up(
        (width as usize * bpp) as u64,
        u64::from(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT),
    ) as usize;
    let mut data = vec![0u8; row_pitch * height as usize];
    if bpp > 0 {
        for row in data.chunks_exact_mut(row_pitch) {
            for chunk in row[..width as usize * bpp].chunks_exact_mut(bpp) {
                chunk.copy_from_slice(&texel);
            }
        }
    }
    (data, row_pitch as u32)
}

/// The part of `rect` inside a `width` x `height` target, as `(x, y, w, h)`.
fn clamp_scissor(rect: ScissorRect, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let left = rect.left.clamp(0, width as i32) as u32;
    let top = rect.top.clamp(0, height as i32) as u32;
    let right = rect.right.clamp(0, width as i32) as u32;
    let bottom = rect.bottom.clamp(0, height as i32) as u32;
    (right > left && bottom > top).then_some((left, top, right - left, bottom - top))
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

    pub fn execute(&self, list: RecordedList) -> Result<()> {
        let calls = list
            .commands
            .iter()
            .filter(|c| matches!(c, Command::Draw(_) | Command::Dispatch(_)))
            .count();
        let mut arena = RootArena::new(&self.shared.device, calls);
        let mut encoder = self
            .shared
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&format!("{} list {}", self.queue, list.id.0)),
            });
        let mut state = BindState::default();
        for command in list.commands {
            self.command(&mut state, &mut encoder, &mut arena, command)?;
        }
        if arena.used > 0 {
            self.shared
                .queue
                .write_buffer(&arena.buffer, 0, &arena.bytes[..arena.used as usize]);
        }
        self.shared.queue.submit(Some(encoder.finish()));
        let errors = self.shared.take_uncaptured();
        if !errors.is_empty() {
            bail!("{}", errors.join("; "));
        }
        Ok(())
    }

    fn command(
        &self,
        state: &mut BindState,
        encoder: &mut wgpu::CommandEncoder,
        arena: &mut RootArena,
        command: Command,
    ) -> Result<()> {
        match command {
            // Usage transitions are tracked by wgpu.
            Command::Barrier(_) => {}
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
                        None => bail!("unknown descriptor heap {id:?}"),
                    }
                }
            }
            Command::SetPipeline(id) => {
                state.pipeline = Some(
                    self.shared
                        .pipeline(id)
                        .ok_or_else(|| anyhow!("unknown pipeline {id:?}"))?,
                );
            }
            Command::SetRootSignature(bind_point, id) => {
                let desc = self
                    .shared
                    .root_signature(id)
                    .ok_or_else(|| anyhow!("unknown root signature {id:?}"))?;
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
                let expected = match root.parameter(parameter) {
                    Some(RootParameter::Cbv { .. }) => Some(RootViewKind::Cbv),
                    Some(RootParameter::Srv { .. }) => Some(RootViewKind::Srv),
                    Some(RootParameter::Uav { .. }) => Some(RootViewKind::Uav),
                    _ => None,
                };
                if expected != Some(kind) {
                    self.error(format!(
                        "root {kind:?} bound to parameter {parameter}, which is {expected:?}"
                    ));
                }
                root.set(parameter, RootArg::View(kind, address));
            }
            Command::SetRootTable {
                bind_point,
                parameter,
                base,
            } => {
                let root = state.root(bind_point);
                if !matches!(
                    root.parameter(parameter),
                    Some(RootParameter::DescriptorTable { .. })
                ) {
                    self.error(format!("descriptor table bound to parameter {parameter}"));
                }
                root.set(parameter, RootArg::Table(base));
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
                if let Some((target, _)) = self.render_target(&view)? {
                    let attachment = wgpu::RenderPassColorAttachment {
                        view: &target,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color {
                                r: f64::from(color[0]),
                                g: f64::from(color[1]),
                                b: f64::from(color[2]),
                                a: f64::from(color[3]),
                            }),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    };
                    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("ClearRenderTargetView"),
                        color_attachments: &[Some(attachment)],
                        depth_stencil_attachment: None,
                        timestamp_writes: None,
                        occlusion_query_set: None,
                        multiview_mask: None,
                    });
                }
            }
            Command::ClearDepth { view, depth } => {
                if let Some((target, _)) = self.depth_target(&view)? {
                    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("ClearDepthStencilView"),
                        color_attachments: &[],
                        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                            view: &target,
                            depth_ops: Some(wgpu::Operations {
                                load: wgpu::LoadOp::Clear(depth),
                                store: wgpu::StoreOp::Store,
                            }),
                            stencil_ops: None,
                        }),
                        timestamp_writes: None,
                        occlusion_query_set: None,
                        multiview_mask: None,
                    });
                }
            }
            Command::ClearUavUint {
                cpu,
                resource,
                values,
                ..
            } => self.clear_uav(encoder, &cpu, resource, values)?,
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
            Command::Draw(call) => self.draw(state, encoder, arena, call)?,
            Command::Dispatch(groups) => self.dispatch(state, encoder, arena, groups)?,
            Command::CopyBuffer {
                dest,
                dest_offset,
                src,
                src_offset,
                size,
            } => self.copy_buffer(encoder, dest, dest_offset, src, src_offset, size)?,
            Command::CopyTexture { dest, src } => self.copy_texture(encoder, &dest, &src)?,
            Command::BeginEvent(name) => {
                self.shared.push_breadcrumb(format!("{}: {name}", self.queue));
                encoder.push_debug_group(&name);
            }
            Command::EndEvent => encoder.pop_debug_group(),
        }
        Ok(())
    }

    fn set_constants(&self, root: &mut RootState, parameter: u32, values: &[u32], dest_offset: u32) {
        let Some(RootParameter::Constants { count, .. }) = root.parameter(parameter).cloned() else {
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
        root.set(parameter, RootArg::Constants(current));
    }

    fn view_resource(
        &self,
        view: &RecordedView,
        what: &str,
    ) -> Result<Option<(Arc<Resource>, Descriptor)>> {
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
            .ok_or_else(|| anyhow!("{what} references destroyed resource {id:?}"))?;
        Ok(Some((resource, descriptor)))
    }

    /// The view of a bound render target and the size of its mip.
    fn render_target(&self, view: &RecordedView) -> Result<Option<(wgpu::TextureView, (u32, u32))>> {
        let Some((resource, descriptor)) = self.view_resource(view, "RTV")? else {
            return Ok(None);
        };
        let Descriptor::Rtv { desc, .. } = descriptor else {
            self.error(format!(
                "'{}' bound as a render target through a non-RTV descriptor",
                resource.label
            ));
            return Ok(None);
        };
        let target = views::rtv_view(&resource, &desc).map_err(|e| anyhow!(e))?;
        Ok(Some((target, resource.desc.mip_size(desc.mip_slice))))
    }

    fn depth_target(&self, view: &RecordedView) -> Result<Option<(wgpu::TextureView, (u32, u32))>> {
        let Some((resource, descriptor)) = self.view_resource(view, "DSV")? else {
            return Ok(None);
        };
        let Descriptor::Dsv { desc, .. } = descriptor else {
            self.error(format!(
                "'{}' bound as depth through a non-DSV descriptor",
                resource.label
            ));
            return Ok(None);
        };
        let target = views::dsv_view(&resource, &desc).map_err(|e| anyhow!(e))?;
        Ok(Some((target, resource.desc.mip_size(desc.mip_slice))))
    }

    fn buffer_of<'r>(&self, resource: &'r Resource) -> Result<&'r wgpu::Buffer> {
        resource
            .buffer()
            .ok_or_else(|| anyhow!("'{}' is a texture where a buffer was expected", resource.label))
    }

    fn clear_uav(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        cpu: &RecordedView,
        resource_id: ResourceId,
        values: [u32; 4],
    ) -> Result<()> {
        let Some((resource, descriptor)) = self.view_resource(cpu, "UAV")? else {
            return Ok(());
        };
        if resource.id != resource_id {
            self.error(format!(
                "UAV clear of {resource_id:?} through a view of '{}'",
                resource.label
            ));
            return Ok(());
        }
        match descriptor {
            Descriptor::Uav {
                desc: UnorderedAccessViewDesc::Texture2D { format, mip_slice },
                ..
            } => {
                let (texture, _) = resource
                    .texture()
                    .ok_or_else(|| anyhow!("'{}' is not a texture", resource.label))?;
                let format = if format == Format::Unknown {
                    resource.desc.format
                } else {
                    format
                };
                let (width, height) = resource.desc.mip_size(mip_slice);
                let (data, row_pitch) = clear_pattern(format, values, width, height);
                let pattern = self
                    .shared
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("UAV clear pattern"),
                        contents: &data,
                        usage: wgpu::BufferUsages::COPY_SRC,
                    });
                encoder.copy_buffer_to_texture(
                    wgpu::TexelCopyBufferInfo {
                        buffer: &pattern,
                        layout: wgpu::TexelCopyBufferLayout {
                            offset: 0,
                            bytes_per_row: Some(row_pitch),
                            rows_per_image: Some(height),
                        },
                    },
                    wgpu::TexelCopyTextureInfo {
                        texture,
                        mip_level: mip_slice,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                );
            }
            Descriptor::Uav {
                desc:
                    UnorderedAccessViewDesc::Buffer {
                        first_element,
                        num_elements,
                        stride,
                    },
                ..
            } => {
                let element = if stride == 0 { 4 } else { u64::from(stride) };
                let start = first_element * element;
                let len = (u64::from(num_elements) * element).min(resource.size.saturating_sub(start));
                let buffer = self.buffer_of(&resource)?;
                if values[0] == 0 {
                    encoder.clear_buffer(buffer, start, Some(len));
                } else {
                    let words = vec![values[0]; (len / 4) as usize];
                    let pattern = self
                        .shared
                        .device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("UAV clear pattern"),
                            contents: bytemuck::cast_slice(&words),
                            usage: wgpu::BufferUsages::COPY_SRC,
                        });
                    encoder.copy_buffer_to_buffer(&pattern, 0, buffer, start, len);
                }
            }
            _ => self.error(format!(
                "UAV clear of '{}' through a non-UAV descriptor",
                resource.label
            )),
        }
        Ok(())
    }

    /// The root state for `pipeline`, if it was created for the bound root
    /// signature.
    fn root_for<'s>(
        &self,
        state: &'s BindState,
        bind_point: PipelineBindPoint,
        pipeline: &Pipeline,
    ) -> Option<&'s RootState> {
        let root = match bind_point {
            PipelineBindPoint::Graphics => &state.graphics,
            PipelineBindPoint::Compute => &state.compute,
        };
        let Some((id, _)) = &root.signature else {
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
        Some(root)
    }

    fn table_descriptor(
        &self,
        label: &str,
        heap: Option<&Arc<DescriptorHeap>>,
        root: &RootState,
        parameter: u32,
        index: u32,
    ) -> Result<Descriptor> {
        let Some(RootArg::Table(base)) = root.args.get(parameter as usize) else {
            bail!("'{label}': root parameter {parameter} is not bound to a descriptor table");
        };
        let heap = heap.ok_or_else(|| anyhow!("'{label}': no shader-visible descriptor heap is bound"))?;
        let address = decode_gpu(base.offset(index, DESCRIPTOR_INCREMENT))
            .ok_or_else(|| anyhow!("'{label}': invalid GPU descriptor handle"))?;
        if address.heap != heap.id {
            bail!("'{label}': descriptor points outside the bound heap");
        }
        heap.read(address.slot)
            .ok_or_else(|| anyhow!("'{label}': descriptor {} is empty or out of range", address.slot))
    }

    /// Resolves the root arguments into group 0 and appends the root block
    /// of the call to the arena.
    fn bind_group(
        &self,
        label: &str,
        heap: Option<&Arc<DescriptorHeap>>,
        root: &RootState,
        layout: &ProgramLayout,
        arena: &mut RootArena,
        first_instance: u32,
    ) -> Result<wgpu::BindGroup> {
        let mut words = [0u32; ROOT_BLOCK_WORDS];
        words[DRAW_WORD] = first_instance;
        for (parameter, offset) in layout.constant_offsets.iter().enumerate() {
            if let (Some(offset), Some(RootArg::Constants(values))) = (offset, root.args.get(parameter)) {
                let start = CONSTANT_WORD + *offset as usize;
                words[start..start + values.len()].copy_from_slice(values);
            }
        }

        let mut bound = Vec::with_capacity(layout.bindings.len());
        for binding in &layout.bindings {
            bound.push(match binding.source {
                BindingSource::RootBlock => Bound::RootBlock,
                BindingSource::RootView { parameter, kind } => {
                    let address = match root.args.get(parameter as usize) {
                        Some(RootArg::View(bound_kind, address)) if *bound_kind == kind => *address,
                        _ => bail!("'{label}': root {kind:?} parameter {parameter} is not bound"),
                    };
                    let (resource, offset) = self.shared.resolve_address(address).ok_or_else(|| {
                        anyhow!("'{label}': root {kind:?} at unmapped address {address:#x}")
                    })?;
                    if kind == RootViewKind::Cbv {
                        let size = (resource.size - offset).min(MAX_CBV_BYTES);
                        Bound::Buffer {
                            resource,
                            offset,
                            size: NonZeroU64::new(size),
                        }
                    } else {
                        words[BIAS_WORD + parameter as usize] = (offset / 4) as u32;
                        Bound::Buffer {
                            resource,
                            offset: 0,
                            size: None,
                        }
                    }
                }
                BindingSource::TableEntry { parameter, index, .. } => {
                    let descriptor = self.table_descriptor(label, heap, root, parameter, index)?;
                    let (id, view) = match descriptor {
                        Descriptor::Srv { resource, desc } => (resource, Ok(desc)),
                        Descriptor::Uav { resource, desc } => (resource, Err(desc)),
                        _ => bail!("'{label}': table {parameter} entry {index} is not an SRV or UAV"),
                    };
                    let resource = self
                        .shared
                        .resource(id)
                        .ok_or_else(|| anyhow!("'{label}': table references destroyed resource {id:?}"))?;
                    let view = match view {
                        Ok(desc) => views::srv_view(&resource, &desc),
                        Err(desc) => views::uav_view(&resource, &desc),
                    };
                    Bound::View(view.map_err(|e| anyhow!("'{label}': {e}"))?)
                }
                BindingSource::Sampler { register } => Bound::Sampler(
                    layout
                        .samplers
                        .get(&register)
                        .ok_or_else(|| anyhow!("'{label}': no static sampler s{register}"))?,
                ),
            });
        }

        let root_offset = arena.push(&words)?;
        let mut entries = Vec::with_capacity(bound.len());
        for (binding, bound) in layout.bindings.iter().zip(&bound) {
            let resource = match bound {
                Bound::RootBlock => wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &arena.buffer,
                    offset: root_offset,
                    size: NonZeroU64::new(ROOT_BLOCK_SIZE),
                }),
                Bound::Buffer {
                    resource,
                    offset,
                    size,
                } => wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: self.buffer_of(resource)?,
                    offset: *offset,
                    size: *size,
                }),
                Bound::View(view) => wgpu::BindingResource::TextureView(view),
                Bound::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding.binding,
                resource,
            });
        }
        Ok(self.shared.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &layout.group,
            entries: &entries,
        }))
    }

    fn heap_group(
        &self,
        label: &str,
        state: &BindState,
        layout: &ProgramLayout,
    ) -> Result<Option<Arc<wgpu::BindGroup>>> {
        if !layout.program.bindless {
            return Ok(None);
        }
        let heap = state
            .heap
            .as_ref()
            .ok_or_else(|| anyhow!("'{label}': no shader-visible descriptor heap is bound"))?;
        self.shared
            .bindless
            .group(&self.shared, heap)
            .map(Some)
            .map_err(|e| anyhow!("'{label}': {e}"))
    }

    /// The buffer and byte range behind a vertex or index view.
    fn buffer_range(
        &self,
        address: GpuVirtualAddress,
        size: u32,
        what: &str,
    ) -> Result<(Arc<Resource>, Range<u64>)> {
        let (resource, offset) = self
            .shared
            .resolve_address(address)
            .ok_or_else(|| anyhow!("{what} at unmapped address {address:#x}"))?;
        let end = offset + u64::from(size);
        if end > resource.size {
            bail!("{what} runs past the end of '{}'", resource.label);
        }
        Ok((resource, offset..end))
    }

    fn dispatch(
        &self,
        state: &BindState,
        encoder: &mut wgpu::CommandEncoder,
        arena: &mut RootArena,
        groups: [u32; 3],
    ) -> Result<()> {
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
        let Some(root) = self.root_for(state, PipelineBindPoint::Compute, &pipeline) else {
            return Ok(());
        };
        let group = self.bind_group(
            &compute.label,
            state.heap.as_ref(),
            root,
            &compute.layout,
            arena,
            0,
        )?;
        let heap_group = self.heap_group(&compute.label, state, &compute.layout)?;

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(&compute.label),
            timestamp_writes: None,
        });
        pass.set_pipeline(&compute.pipeline);
        pass.set_bind_group(0, &group, &[]);
        if let Some(heap_group) = &heap_group {
            pass.set_bind_group(1, heap_group.as_ref(), &[]);
        }
        pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        Ok(())
    }

    fn draw(
        &self,
        state: &BindState,
        encoder: &mut wgpu::CommandEncoder,
        arena: &mut RootArena,
        call: DrawCall,
    ) -> Result<()> {
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
        if state.render_targets.len() != graphics.desc.render_target_formats.len() {
            self.error(format!(
                "'{}' expects {} render targets, {} are bound",
                graphics.label,
                graphics.desc.render_target_formats.len(),
                state.render_targets.len()
            ));
            return Ok(());
        }
        if graphics.desc.depth_format.is_some() != state.depth_stencil.is_some() {
            self.error(format!(
                "'{}' depth target does not match its pipeline",
                graphics.label
            ));
            return Ok(());
        }
        let Some(root) = self.root_for(state, PipelineBindPoint::Graphics, &pipeline) else {
            return Ok(());
        };

        let mut extent = None;
        let mut targets = Vec::with_capacity(state.render_targets.len());
        for view in &state.render_targets {
            let Some((target, size)) = self.render_target(view)? else {
                return Ok(());
            };
            extent.get_or_insert(size);
            targets.push(target);
        }
        let depth = match &state.depth_stencil {
            Some(view) => match self.depth_target(view)? {
                Some((target, size)) => {
                    extent.get_or_insert(size);
                    Some(target)
                }
                None => return Ok(()),
            },
            None => None,
        };
        let Some((width, height)) = extent else {
            self.error(format!("'{}' drawn without any target", graphics.label));
            return Ok(());
        };

        let vertices = if graphics.desc.input_layout.is_empty() {
            None
        } else {
            let Some(view) = state.vertex_buffer else {
                self.error(format!("'{}' drawn without a vertex buffer", graphics.label));
                return Ok(());
            };
            let (resource, range) = self.buffer_range(view.address, view.size_in_bytes, "vertex buffer")?;
            Some((resource, range, u64::from(view.stride)))
        };
        let indices = match call {
            DrawCall::Indexed { .. } => {
                let Some(view) = state.index_buffer else {
                    self.error(format!("indexed draw of '{}' without an index buffer", graphics.label));
                    return Ok(());
                };
                let (resource, range) = self.buffer_range(view.address, view.size_in_bytes, "index buffer")?;
                Some((resource, range, view.format))
            }
            DrawCall::Instanced { .. } => None,
        };
        let scissor = match state.scissor {
            Some(rect) => match clamp_scissor(rect, width, height) {
                Some(rect) => Some(rect),
                None => return Ok(()),
            },
            None => None,
        };

        let first_instance = match call {
            DrawCall::Instanced { start_instance, .. } | DrawCall::Indexed { start_instance, .. } => {
                start_instance
            }
        };
        let group = self.bind_group(
            &graphics.label,
            state.heap.as_ref(),
            root,
            &graphics.layout,
            arena,
            first_instance,
        )?;
        let heap_group = self.heap_group(&graphics.label, state, &graphics.layout)?;
        let stride = vertices.as_ref().map_or(0, |(_, _, stride)| *stride);
        let render_pipeline = graphics.variant(&self.shared, stride);

        let color_attachments: Vec<_> = targets
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&graphics.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth.as_ref().map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(&render_pipeline);
        pass.set_bind_group(0, &group, &[]);
        if let Some(heap_group) = &heap_group {
            pass.set_bind_group(1, heap_group.as_ref(), &[]);
        }
        let x = viewport.x.clamp(0.0, width as f32);
        let y = viewport.y.clamp(0.0, height as f32);
        pass.set_viewport(
            x,
            y,
            viewport.width.min(width as f32 - x),
            viewport.height.min(height as f32 - y),
            viewport.min_depth,
            viewport.max_depth,
        );
        if let Some((x, y, w, h)) = scissor {
            pass.set_scissor_rect(x, y, w, h);
        }
        if let Some((resource, range, _)) = &vertices {
            pass.set_vertex_buffer(0, self.buffer_of(resource)?.slice(range.clone()));
        }
        match call {
            DrawCall::Instanced {
                vertex_count,
                instance_count,
                start_vertex,
                start_instance,
            } => pass.draw(
                start_vertex..start_vertex + vertex_count,
                start_instance..start_instance + instance_count,
            ),
            DrawCall::Indexed {
                index_count,
                instance_count,
                start_index,
                base_vertex,
                start_instance,
            } => {
                if let Some((resource, range, format)) = &indices {
                    pass.set_index_buffer(
                        self.buffer_of(resource)?.slice(range.clone()),
                        (*format).into_wgpu(),
                    );
                    pass.draw_indexed(
                        start_index..start_index + index_count,
                        base_vertex,
                        start_instance..start_instance + instance_count,
                    );
                }
            }
        }
        Ok(())
    }

    fn copy_buffer(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        dest: ResourceId,
        dest_offset: u64,
        src: ResourceId,
        src_offset: u64,
        size: u64,
    ) -> Result<()> {
        let dest = self
            .shared
            .resource(dest)
            .ok_or_else(|| anyhow!("copy into destroyed resource {dest:?}"))?;
        let src = self
            .shared
            .resource(src)
            .ok_or_else(|| anyhow!("copy from destroyed resource {src:?}"))?;
        if dest_offset + size > dest.size || src_offset + size > src.size {
            bail!(
                "copy of {size} bytes from '{}' to '{}' runs past the end of a buffer",
                src.label,
                dest.label
            );
        }
        encoder.copy_buffer_to_buffer(
            self.buffer_of(&src)?,
            src_offset,
            self.buffer_of(&dest)?,
            dest_offset,
            size,
        );
        Ok(())
    }

    fn texture_location(&self, id: ResourceId, index: u32) -> Result<(Arc<Resource>, u32, u32)> {
        let resource = self
            .shared
            .resource(id)
            .ok_or_else(|| anyhow!("texture copy of destroyed resource {id:?}"))?;
        if index >= resource.desc.subresource_count() {
            bail!("'{}' has no subresource {index}", resource.label);
        }
        let (mip, slice) = resource.desc.subresource_location(index);
        Ok((resource, mip, slice))
    }

    fn copy_texture(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        dest: &TextureCopyLocation,
        src: &TextureCopyLocation,
    ) -> Result<()> {
        match (*dest, *src) {
            (
                TextureCopyLocation::Subresource { resource, index },
                TextureCopyLocation::Footprint {
                    resource: buffer,
                    footprint,
                },
            ) => {
                let (texture, mip, slice) = self.texture_location(resource, index)?;
                let buffer = self
                    .shared
                    .resource(buffer)
                    .ok_or_else(|| anyhow!("texture upload from destroyed resource {buffer:?}"))?;
                let (wgpu_texture, format) = texture
                    .texture()
                    .ok_or_else(|| anyhow!("'{}' is not a texture", texture.label))?;
                encoder.copy_buffer_to_texture(
                    wgpu::TexelCopyBufferInfo {
                        buffer: self.buffer_of(&buffer)?,
                        layout: wgpu::TexelCopyBufferLayout {
                            offset: footprint.offset,
                            bytes_per_row: Some(footprint.row_pitch),
                            rows_per_image: Some(footprint.height),
                        },
                    },
                    wgpu::TexelCopyTextureInfo {
                        texture: wgpu_texture,
                        mip_level: mip,
                        origin: wgpu::Origin3d { x: 0, y: 0, z: slice },
                        aspect: views::aspect(format),
                    },
                    wgpu::Extent3d {
                        width: footprint.width,
                        height: footprint.height,
                        depth_or_array_layers: 1,
                    },
                );
            }
            (
                TextureCopyLocation::Footprint {
                    resource: buffer,
                    footprint,
                },
                TextureCopyLocation::Subresource { resource, index },
            ) => {
                let (texture, mip, slice) = self.texture_location(resource, index)?;
                let buffer = self
                    .shared
                    .resource(buffer)
                    .ok_or_else(|| anyhow!("texture readback into destroyed resource {buffer:?}"))?;
                let (wgpu_texture, format) = texture
                    .texture()
                    .ok_or_else(|| anyhow!("'{}' is not a texture", texture.label))?;
                encoder.copy_texture_to_buffer(
                    wgpu::TexelCopyTextureInfo {
                        texture: wgpu_texture,
                        mip_level: mip,
                        origin: wgpu::Origin3d { x: 0, y: 0, z: slice },
                        aspect: views::aspect(format),
                    },
                    wgpu::TexelCopyBufferInfo {
                        buffer: self.buffer_of(&buffer)?,
                        layout: wgpu::TexelCopyBufferLayout {
                            offset: footprint.offset,
                            bytes_per_row: Some(footprint.row_pitch),
                            rows_per_image: Some(footprint.height),
                        },
                    },
                    wgpu::Extent3d {
                        width: footprint.width,
                        height: footprint.height,
                        depth_or_array_layers: 1,
                    },
                );
            }
            (
                TextureCopyLocation::Subresource {
                    resource: dest,
                    index: dest_index,
                },
                TextureCopyLocation::Subresource {
                    resource: src,
                    index: src_index,
                },
            ) => {
                let (dest, dest_mip, dest_slice) = self.texture_location(dest, dest_index)?;
                let (src, src_mip, src_slice) = self.texture_location(src, src_index)?;
                let (width, height) = src.desc.mip_size(src_mip);
                if dest.desc.mip_size(dest_mip) != (width, height) {
                    bail!("copy between subresources of different sizes ('{}' to '{}')", src.label, dest.label);
                }
                let (src_texture, src_format) = src
                    .texture()
                    .ok_or_else(|| anyhow!("'{}' is not a texture", src.label))?;
                let (dest_texture, dest_format) = dest
                    .texture()
                    .ok_or_else(|| anyhow!("'{}' is not a texture", dest.label))?;
                encoder.copy_texture_to_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: src_texture,
                        mip_level: src_mip,
                        origin: wgpu::Origin3d { x: 0, y: 0, z: src_slice },
                        aspect: views::aspect(src_format),
                    },
                    wgpu::TexelCopyTextureInfo {
                        texture: dest_texture,
                        mip_level: dest_mip,
                        origin: wgpu::Origin3d { x: 0, y: 0, z: dest_slice },
                        aspect: views::aspect(dest_format),
                    },
                    wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                );
            }
            (TextureCopyLocation::Footprint { .. }, TextureCopyLocation::Footprint { .. }) => {
                self.error("CopyTextureRegion between two buffer footprints".into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_pattern_repeats_the_texel_and_pads_rows() {
        let (data, pitch) = clear_pattern(Format::Rg32Uint, [7, 9, 0, 0], 3, 2);
        assert_eq!(pitch, 256);
        assert_eq!(data.len(), 512);
        let words: &[u32] = bytemuck::cast_slice(&data[..24]);
        assert_eq!(words, &[7, 9, 7, 9, 7, 9]);
        assert!(data[24..256].iter().all(|b| *b == 0));
        assert_eq!(&data[256..264], &data[..8]);
    }

    #[test]
    fn test_clear_pattern_of_a_float_target() {
        let (data, _) = clear_pattern(Format::R32Float, [1, 0, 0, 0], 1, 1);
        assert_eq!(&data[..4], &1.0f32.to_le_bytes());
    }

    #[test]
    fn test_scissor_is_clamped_to_the_target() {
        let rect = ScissorRect {
            left: -4,
            top: 2,
            right: 100,
            bottom: 6,
        };
        assert_eq!(clamp_scissor(rect, 64, 32), Some((0, 2, 64, 4)));
        assert_eq!(clamp_scissor(ScissorRect::from_size(0, 8), 64, 32), None);
    }

    #[test]
    fn test_root_block_words_fit_the_uniform() {
        assert_eq!(CONSTANT_WORD + 64, ROOT_BLOCK_WORDS);
        assert!(ROOT_BLOCK_SIZE <= ROOT_BLOCK_STRIDE);
    }
}
