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

//! Queues, fences, command lists and the small structs recorded into them.

use super::resource::{GpuVirtualAddress, PlacedFootprint, ResourceId};

/// The three hardware queue families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    /// Direct queue: graphics, compute and copy.
    Graphics,
    /// Async compute queue: compute and copy.
    Compute,
    /// Copy queue.
    Copy,
}

/// An opaque handle to a command queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(pub u64);

/// An opaque handle to a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceId(pub u64);

/// A closed command list ready for submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandListId(pub u64);

/// An opaque handle to a swap chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapChainId(pub u64);

/// Which pipeline root arguments apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineBindPoint {
    /// Draw calls.
    Graphics,
    /// Dispatches.
    Compute,
}

/// The rasterizer viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge in pixels.
    pub x: f32,
    /// Top edge in pixels.
    pub y: f32,
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
    /// Depth mapped from NDC 0.
    pub min_depth: f32,
    /// Depth mapped from NDC 1.
    pub max_depth: f32,
}

impl Viewport {
    /// A full-depth viewport covering `width` x `height`.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// A scissor rectangle in pixels (`right`/`bottom` exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    /// Left edge.
    pub left: i32,
    /// Top edge.
    pub top: i32,
    /// Right edge.
    pub right: i32,
    /// Bottom edge.
    pub bottom: i32,
}

impl ScissorRect {
    /// A rectangle covering `width` x `height`.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width as i32,
            bottom: height as i32,
        }
    }
}

/// Primitive assembly mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveTopology {
    /// Independent triangles.
    #[default]
    TriangleList,
}

/// Index element size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    /// 16-bit indices.
    U16,
    /// 32-bit indices.
    U32,
}

impl IndexFormat {
    /// Size of one index.
    pub const fn size(self) -> u32 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

/// A vertex buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferView {
    /// Address of the first vertex.
    pub address: GpuVirtualAddress,
    /// Bytes visible through the view.
    pub size_in_bytes: u32,
    /// Bytes between consecutive vertices.
    pub stride: u32,
}

/// An index buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBufferView {
    /// Address of the first index.
    pub address: GpuVirtualAddress,
    /// Bytes visible through the view.
    pub size_in_bytes: u32,
    /// Index width.
    pub format: IndexFormat,
}

/// One side of a texture copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureCopyLocation {
    /// A subresource of a texture.
    Subresource {
        /// Texture.
        resource: ResourceId,
        /// Subresource index.
        index: u32,
    },
    /// A placed footprint inside a buffer.
    Footprint {
        /// Buffer.
        resource: ResourceId,
        /// Placement.
        footprint: PlacedFootprint,
    },
}

/// Parameters of a swap chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainDesc {
    /// Width of the back buffers.
    pub width: u32,
    /// Height of the back buffers.
    pub height: u32,
    /// Number of back buffers.
    pub buffer_count: u32,
}
