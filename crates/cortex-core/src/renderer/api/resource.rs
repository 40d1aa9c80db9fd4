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

//! Committed resources: descriptions, heaps, states, and copy footprints.

use super::format::Format;

/// A GPU virtual address.
pub type GpuVirtualAddress = u64;

/// Selects every subresource of a resource in a barrier or declaration.
pub const ALL_SUBRESOURCES: u32 = 0xFFFF_FFFF;

/// Row pitch alignment of texture data placed in buffers.
pub const TEXTURE_DATA_PITCH_ALIGNMENT: u64 = 256;

/// Offset alignment of each subresource placed in a buffer.
pub const TEXTURE_DATA_PLACEMENT_ALIGNMENT: u64 = 512;

/// An opaque handle to a committed resource owned by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

/// Where a resource's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeapType {
    /// Device-local memory; not CPU accessible.
    #[default]
    Default,
    /// CPU-writable memory read by the GPU. Persistently mappable and never
    /// transitioned out of `GENERIC_READ`.
    Upload,
    /// GPU-writable memory read back by the CPU. Stays in `COPY_DEST`.
    Readback,
}

/// Shape of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceDimension {
    /// A linear byte buffer.
    Buffer,
    /// A 2D texture, optionally an array with a mip chain.
    Texture2D,
}

crate::cortex_bitflags! {
    /// Capabilities requested at resource creation.
    pub struct ResourceFlags: u32 {
        /// Can be bound as a render target.
        const ALLOW_RENDER_TARGET = 1 << 0;
        /// Can be bound as a depth-stencil target.
        const ALLOW_DEPTH_STENCIL = 1 << 1;
        /// Can be bound for unordered (UAV) access.
        const ALLOW_UNORDERED_ACCESS = 1 << 2;
        /// Cannot be read through an SRV.
        const DENY_SHADER_RESOURCE = 1 << 3;
    }
}

crate::cortex_bitflags! {
    /// The access state a subresource is in, as seen by the GPU.
    ///
    /// `COMMON` and `PRESENT` are both the empty set. Read states combine
    /// bitwise; write states are exclusive.
    pub struct ResourceStates: u32 {
        /// Every read state; the permanent state of upload heaps.
        const GENERIC_READ = 0x1 | 0x2 | 0x40 | 0x80 | 0x200 | 0x800;
        /// Readable from every shader stage.
        const ALL_SHADER_RESOURCE = 0x40 | 0x80;
        /// Vertex buffer or constant buffer.
        const VERTEX_AND_CONSTANT_BUFFER = 0x1;
        /// Index buffer.
        const INDEX_BUFFER = 0x2;
        /// Render target (write).
        const RENDER_TARGET = 0x4;
        /// Unordered access (write).
        const UNORDERED_ACCESS = 0x8;
        /// Depth-stencil write.
        const DEPTH_WRITE = 0x10;
        /// Depth-stencil read-only.
        const DEPTH_READ = 0x20;
        /// SRV outside the pixel stage.
        const NON_PIXEL_SHADER_RESOURCE = 0x40;
        /// SRV in the pixel stage.
        const PIXEL_SHADER_RESOURCE = 0x80;
        /// Indirect draw/dispatch arguments.
        const INDIRECT_ARGUMENT = 0x200;
        /// Copy destination (write).
        const COPY_DEST = 0x400;
        /// Copy source.
        const COPY_SOURCE = 0x800;
    }
}

impl ResourceStates {
    /// The common state (no access).
    pub const COMMON: Self = Self::EMPTY;
    /// The state a back buffer must be in to be presented.
    pub const PRESENT: Self = Self::EMPTY;

    const WRITE_MASK: Self = Self::from_bits_retain(0x4 | 0x8 | 0x10 | 0x400);

    /// `true` when the state includes a write access.
    pub const fn is_write(self) -> bool {
        self.intersects(Self::WRITE_MASK)
    }

    /// `true` when the state is a legal combination: either a single write
    /// state, or any set of read states.
    pub fn is_valid_combination(self) -> bool {
        let writes = self.intersection(Self::WRITE_MASK);
        writes.is_empty() || self == writes && writes.count() == 1
    }
}

/// A clear value optimized at resource creation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// Color clear.
    Color {
        /// Format the clear applies to.
        format: Format,
        /// RGBA color.
        color: [f32; 4],
    },
    /// Depth-stencil clear.
    DepthStencil {
        /// Depth format.
        format: Format,
        /// Depth value.
        depth: f32,
        /// Stencil value.
        stencil: u8,
    },
}

/// Description of a committed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceDesc {
    /// Buffer or texture.
    pub dimension: ResourceDimension,
    /// Width in texels, or size in bytes for buffers.
    pub width: u64,
    /// Height in texels (1 for buffers).
    pub height: u32,
    /// Array size (1 for buffers and plain textures).
    pub array_size: u32,
    /// Mip levels (1 for buffers).
    pub mip_levels: u32,
    /// Storage format ([`Format::Unknown`] for buffers).
    pub format: Format,
    /// Creation capabilities.
    pub flags: ResourceFlags,
}

impl ResourceDesc {
    /// A buffer of `size` bytes.
    pub const fn buffer(size: u64) -> Self {
        Self {
            dimension: ResourceDimension::Buffer,
            width: size,
            height: 1,
            array_size: 1,
            mip_levels: 1,
            format: Format::Unknown,
            flags: ResourceFlags::EMPTY,
        }
    }

    /// A single-mip 2D texture.
    pub const fn texture_2d(width: u32, height: u32, format: Format) -> Self {
        Self {
            dimension: ResourceDimension::Texture2D,
            width: width as u64,
            height,
            array_size: 1,
            mip_levels: 1,
            format,
            flags: ResourceFlags::EMPTY,
        }
    }

    /// Replaces the creation flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: ResourceFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Replaces the mip count.
    #[must_use]
    pub const fn with_mips(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Replaces the array size.
    #[must_use]
    pub const fn with_array_size(mut self, array_size: u32) -> Self {
        self.array_size = array_size;
        self
    }

    /// `true` for buffers.
    pub const fn is_buffer(&self) -> bool {
        matches!(self.dimension, ResourceDimension::Buffer)
    }

    /// Number of independently transitioned subresources.
    pub const fn subresource_count(&self) -> u32 {
        match self.dimension {
            ResourceDimension::Buffer => 1,
            ResourceDimension::Texture2D => self.mip_levels * self.array_size,
        }
    }

    /// Index of `(mip, slice)`.
    pub const fn subresource_index(&self, mip: u32, slice: u32) -> u32 {
        mip + slice * self.mip_levels
    }

    /// `(mip, slice)` of a subresource index.
    pub const fn subresource_location(&self, subresource: u32) -> (u32, u32) {
        (subresource % self.mip_levels, subresource / self.mip_levels)
    }

    /// Size of mip level `mip` as `(width, height)`, never below 1.
    pub fn mip_size(&self, mip: u32) -> (u32, u32) {
        let w = ((self.width as u32) >> mip).max(1);
        let h = (self.height >> mip).max(1);
        (w, h)
    }

    /// Largest mip count for a `width` x `height` texture.
    pub fn full_mip_count(width: u32, height: u32) -> u32 {
        32 - width.max(height).max(1).leading_zeros()
    }
}

/// Placement of one subresource inside a linear buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedFootprint {
    /// Byte offset from the start of the buffer.
    pub offset: u64,
    /// Texel format.
    pub format: Format,
    /// Width in texels.
    pub width: u32,
    /// Height in rows.
    pub height: u32,
    /// Aligned bytes between rows.
    pub row_pitch: u32,
}

/// Layout of a range of subresources in a linear buffer, as reported by the
/// device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CopyableFootprints {
    /// One placement per subresource.
    pub layouts: Vec<PlacedFootprint>,
    /// Rows per subresource.
    pub num_rows: Vec<u32>,
    /// Unpadded bytes per row per subresource.
    pub row_size_in_bytes: Vec<u64>,
    /// Bytes the whole range occupies.
    pub total_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_combinations() {
        let srv = ResourceStates::PIXEL_SHADER_RESOURCE | ResourceStates::NON_PIXEL_SHADER_RESOURCE;
        assert_eq!(srv, ResourceStates::ALL_SHADER_RESOURCE);
        assert!(srv.is_valid_combination());
        assert!(!srv.is_write());
        assert!(ResourceStates::UNORDERED_ACCESS.is_valid_combination());
        assert!(!(ResourceStates::RENDER_TARGET | ResourceStates::PIXEL_SHADER_RESOURCE)
            .is_valid_combination());
        assert!(ResourceStates::GENERIC_READ.contains(ResourceStates::COPY_SOURCE));
        assert_eq!(ResourceStates::PRESENT, ResourceStates::COMMON);
    }

    #[test]
    fn test_subresource_indexing() {
        let desc = ResourceDesc::texture_2d(256, 128, Format::Rgba8Unorm)
            .with_mips(4)
            .with_array_size(3);
        assert_eq!(desc.subresource_count(), 12);
        assert_eq!(desc.subresource_index(2, 1), 6);
        assert_eq!(desc.subresource_location(6), (2, 1));
        assert_eq!(desc.mip_size(3), (32, 16));
        assert_eq!(desc.mip_size(9), (1, 1));
        assert_eq!(ResourceDesc::full_mip_count(256, 128), 9);
        assert_eq!(ResourceDesc::buffer(64).subresource_count(), 1);
    }
}
