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

//! Built-in implementations of the renderer's shader programs.
//!
//! Each program named by a pipeline maps to a kernel here that reads its
//! root arguments through [`Bindings`] with the same parameter indices the
//! HLSL declares.

use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

use bytemuck::{pod_read_unaligned, Pod};
use cortex_core::renderer::api::{IndexFormat, ShaderSource};
use cortex_core::renderer::scene::bindings::{entry_points, programs};

use crate::graphics::recording::DrawCall;

use super::bindings::{Bindings, RwTexture};
use super::pipeline::GraphicsPipeline;
use super::raster::{Fragment, RasterState};
use super::validation::Fault;

mod brdf_lut;
mod cluster_cull;
mod deferred_lighting;
mod geometry;
mod material_resolve;
mod motion_vectors;
mod visibility;

/// Arguments of one `Dispatch`.
pub(crate) struct DispatchContext<'a> {
    pub bindings: Bindings<'a>,
    pub groups: [u32; 3],
}

impl DispatchContext<'_> {
    /// Threads launched along x and y for square groups of `group_size`.
    pub fn threads_2d(&self, group_size: u32) -> (u32, u32) {
        (self.groups[0] * group_size, self.groups[1] * group_size)
    }
}

type KernelFn = fn(&DispatchContext<'_>) -> Result<(), Fault>;

/// A compute program.
#[derive(Clone, Copy)]
pub(crate) struct ComputeKernel {
    pub name: &'static str,
    pub run: KernelFn,
}

impl fmt::Debug for ComputeKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeKernel")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Pixel stage of the visibility program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VisibilityPixel {
    Opaque,
    AlphaTest,
}

/// A vertex + pixel program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GraphicsProgram {
    /// `None` is a depth-only pipeline.
    Visibility(Option<VisibilityPixel>),
    DeferredLighting,
}

impl GraphicsProgram {
    pub fn draw(self, ctx: &mut DrawContext<'_>) -> Result<(), Fault> {
        match self {
            GraphicsProgram::Visibility(pixel) => visibility::draw(ctx, pixel),
            GraphicsProgram::DeferredLighting => deferred_lighting::draw(ctx),
        }
    }
}

/// The compute kernel compiled from `program`'s `entry` point.
pub(crate) fn compute_kernel(program: &str, entry: &str) -> Option<ComputeKernel> {
    if entry != entry_points::CS_MAIN {
        return None;
    }
    let (name, run): (&'static str, KernelFn) = match program {
        programs::MATERIAL_RESOLVE => (programs::MATERIAL_RESOLVE, material_resolve::run),
        programs::CLUSTER_CULL => (programs::CLUSTER_CULL, cluster_cull::run),
        programs::MOTION_VECTORS => (programs::MOTION_VECTORS, motion_vectors::run),
        programs::BRDF_LUT => (programs::BRDF_LUT, brdf_lut::run),
        _ => return None,
    };
    Some(ComputeKernel { name, run })
}

/// The graphics program built from a vertex and optional pixel entry point.
pub(crate) fn graphics_program(
    vertex: &ShaderSource,
    pixel: Option<&ShaderSource>,
) -> Option<GraphicsProgram> {
    if vertex.entry_point != entry_points::VS_MAIN {
        return None;
    }
    let pixel_entry = pixel.map(|p| p.entry_point.as_str());
    match (vertex.program_name(), pixel_entry) {
        (programs::VISIBILITY, None) => Some(GraphicsProgram::Visibility(None)),
        (programs::VISIBILITY, Some(entry_points::PS_MAIN)) => {
            Some(GraphicsProgram::Visibility(Some(VisibilityPixel::Opaque)))
        }
        (programs::VISIBILITY, Some(entry_points::PS_MAIN_ALPHA_TEST)) => {
            Some(GraphicsProgram::Visibility(Some(VisibilityPixel::AlphaTest)))
        }
        (programs::DEFERRED_LIGHTING, Some(entry_points::PS_MAIN)) => {
            Some(GraphicsProgram::DeferredLighting)
        }
        _ => None,
    }
}

/// Vertex buffer slot 0 as bound by `IASetVertexBuffers`.
pub(crate) struct VertexStream {
    data: Arc<Vec<u8>>,
    offset: usize,
    len: usize,
    stride: usize,
}

impl VertexStream {
    pub fn new(data: Arc<Vec<u8>>, offset: usize, len: usize, stride: u32) -> Self {
        Self {
            data,
            offset,
            len,
            stride: stride as usize,
        }
    }

    /// The attribute at `attribute_offset` of vertex `vertex`; `None` past
    /// the end of the view.
    pub fn read<T: Pod>(&self, vertex: u32, attribute_offset: u32) -> Option<T> {
        let start = (vertex as usize)
            .checked_mul(self.stride)?
            .checked_add(attribute_offset as usize)?;
        let end = start.checked_add(size_of::<T>())?;
        if end > self.len {
            return None;
        }
        let start = self.offset + start;
        Some(pod_read_unaligned(&self.data[start..start + size_of::<T>()]))
    }
}

/// The index buffer as bound by `IASetIndexBuffer`.
pub(crate) struct IndexStream {
    data: Arc<Vec<u8>>,
    offset: usize,
    len: usize,
    format: IndexFormat,
}

impl IndexStream {
    pub fn new(data: Arc<Vec<u8>>, offset: usize, len: usize, format: IndexFormat) -> Self {
        Self {
            data,
            offset,
            len,
            format,
        }
    }

    pub fn get(&self, index: u32) -> Option<u32> {
        let size = self.format.size() as usize;
        let start = (index as usize).checked_mul(size)?;
        if start + size > self.len {
            return None;
        }
        let bytes = &self.data[self.offset + start..self.offset + start + size];
        Some(match self.format {
            IndexFormat::U16 => u32::from(pod_read_unaligned::<u16>(bytes)),
            IndexFormat::U32 => pod_read_unaligned::<u32>(bytes),
        })
    }
}

/// Everything a draw call sees.
pub(crate) struct DrawContext<'a> {
    pub bindings: Bindings<'a>,
    pub pipeline: &'a GraphicsPipeline,
    pub raster: RasterState,
    pub targets: Vec<RwTexture>,
    pub depth: Option<RwTexture>,
    pub vertices: Option<VertexStream>,
    pub indices: Option<IndexStream>,
    pub call: DrawCall,
}

impl DrawContext<'_> {
    /// Byte offset of the input element with `semantic`.
    pub fn attribute(&self, semantic: &str) -> Option<u32> {
        self.pipeline
            .input_layout
            .iter()
            .find(|e| e.semantic == semantic)
            .map(|e| e.offset)
    }

    /// Whether the fragment passes the depth test.
    pub fn depth_passes(&self, fragment: &Fragment) -> bool {
        let state = self.pipeline.depth;
        match &self.depth {
            Some(depth) if state.test => {
                let stored = depth.load(fragment.x, fragment.y)[0];
                state.compare.passes(fragment.depth, stored)
            }
            _ => true,
        }
    }

    /// Writes the fragment's depth when depth writes are on.
    pub fn write_depth(&mut self, fragment: &Fragment) {
        if !self.pipeline.depth.write {
            return;
        }
        if let Some(depth) = &mut self.depth {
            depth.store(fragment.x, fragment.y, [fragment.depth, 0.0, 0.0, 0.0]);
        }
    }

    /// The render target in slot `slot`.
    pub fn target(&mut self, slot: usize) -> Result<&mut RwTexture, Fault> {
        let label = self.pipeline.label.clone();
        self.targets
            .get_mut(slot)
            .ok_or_else(|| {
                Fault::new(format!(
                    "'{label}' writes render target {slot}, which is not bound"
                ))
            })
    }
}
