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

//! Descriptor heaps, descriptor handles, and typed view descriptions.

use super::format::Format;
use super::resource::GpuVirtualAddress;

/// Kind of descriptors a heap stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapType {
    /// Constant buffer, shader resource and unordered access views.
    CbvSrvUav,
    /// Render-target views.
    Rtv,
    /// Depth-stencil views.
    Dsv,
}

/// Parameters of a descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeapDesc {
    /// Descriptor kind.
    pub ty: DescriptorHeapType,
    /// Number of descriptors.
    pub capacity: u32,
    /// Whether shaders can address the heap (CBV/SRV/UAV only).
    pub shader_visible: bool,
}

/// An opaque handle to a descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHeapId(pub u64);

/// What the device reports about a freshly created heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeapInfo {
    /// Heap handle.
    pub id: DescriptorHeapId,
    /// CPU handle of slot 0.
    pub cpu_start: CpuDescriptorHandle,
    /// GPU handle of slot 0 (null when not shader visible).
    pub gpu_start: GpuDescriptorHandle,
    /// Byte stride between consecutive descriptors.
    pub increment: u32,
}

/// CPU address of a descriptor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct CpuDescriptorHandle {
    /// Address of the slot.
    pub ptr: usize,
}

impl CpuDescriptorHandle {
    /// The handle `count` slots further.
    #[inline]
    pub const fn offset(self, count: u32, increment: u32) -> Self {
        Self {
            ptr: self.ptr + count as usize * increment as usize,
        }
    }
}

/// GPU address of a descriptor slot in a shader-visible heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct GpuDescriptorHandle {
    /// Address of the slot (0 means null).
    pub ptr: u64,
}

impl GpuDescriptorHandle {
    /// The null handle of non-shader-visible heaps.
    pub const NULL: Self = Self { ptr: 0 };

    /// The handle `count` slots further; the null handle stays null.
    #[inline]
    pub const fn offset(self, count: u32, increment: u32) -> Self {
        if self.ptr == 0 {
            return self;
        }
        Self {
            ptr: self.ptr + count as u64 * increment as u64,
        }
    }

    /// `true` for the null handle.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.ptr == 0
    }
}

/// A descriptor slot handed out by the descriptor manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHandle {
    /// CPU address.
    pub cpu: CpuDescriptorHandle,
    /// GPU address (null for CPU-only heaps).
    pub gpu: GpuDescriptorHandle,
    /// Slot index within the heap.
    pub index: u32,
    /// Byte stride of the owning heap.
    pub increment: u32,
}

impl DescriptorHandle {
    /// The handle `i` slots into a contiguous range starting at `self`.
    #[inline]
    pub const fn at(self, i: u32) -> Self {
        Self {
            cpu: self.cpu.offset(i, self.increment),
            gpu: self.gpu.offset(i, self.increment),
            index: self.index + i,
            increment: self.increment,
        }
    }
}

/// Description of a shader resource view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShaderResourceViewDesc {
    /// A 2D texture.
    Texture2D {
        /// View format (may reinterpret a typeless resource).
        format: Format,
        /// First mip visible through the view.
        most_detailed_mip: u32,
        /// Mip count, `u32::MAX` for "all remaining".
        mip_levels: u32,
    },
    /// A slice range of a 2D texture array.
    Texture2DArray {
        /// View format.
        format: Format,
        /// First mip visible through the view.
        most_detailed_mip: u32,
        /// Mip count, `u32::MAX` for "all remaining".
        mip_levels: u32,
        /// First array slice.
        first_slice: u32,
        /// Number of slices.
        array_size: u32,
    },
    /// A structured buffer (`stride > 0`) or raw `ByteAddressBuffer` (`stride == 0`).
    Buffer {
        /// First element (bytes / 4 for raw views).
        first_element: u64,
        /// Element count (32-bit words for raw views).
        num_elements: u32,
        /// Structure stride, 0 for raw.
        stride: u32,
    },
}

impl ShaderResourceViewDesc {
    /// A view of every mip of a 2D texture.
    pub const fn texture_2d(format: Format) -> Self {
        Self::Texture2D {
            format,
            most_detailed_mip: 0,
            mip_levels: u32::MAX,
        }
    }

    /// A raw view over `size_bytes` bytes.
    pub const fn raw_buffer(size_bytes: u64) -> Self {
        Self::Buffer {
            first_element: 0,
            num_elements: (size_bytes / 4) as u32,
            stride: 0,
        }
    }

    /// A structured view of `count` elements of `stride` bytes.
    pub const fn structured_buffer(count: u32, stride: u32) -> Self {
        Self::Buffer {
            first_element: 0,
            num_elements: count,
            stride,
        }
    }
}

/// Description of an unordered access view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnorderedAccessViewDesc {
    /// One mip of a 2D texture.
    Texture2D {
        /// View format.
        format: Format,
        /// Mip written through the view.
        mip_slice: u32,
    },
    /// A structured or raw buffer, as for SRVs.
    Buffer {
        /// First element.
        first_element: u64,
        /// Element count.
        num_elements: u32,
        /// Structure stride, 0 for raw.
        stride: u32,
    },
}

/// Description of a render-target view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTargetViewDesc {
    /// View format.
    pub format: Format,
    /// Mip rendered to.
    pub mip_slice: u32,
    /// Array slice rendered to.
    pub array_slice: u32,
}

/// Description of a depth-stencil view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilViewDesc {
    /// View format.
    pub format: Format,
    /// Mip bound.
    pub mip_slice: u32,
    /// Array slice bound.
    pub array_slice: u32,
}

/// Description of a constant buffer view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBufferViewDesc {
    /// Address of the constants (256-byte aligned).
    pub address: GpuVirtualAddress,
    /// Size in bytes (256-byte multiple).
    pub size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_offsets_are_strided() {
        let base = DescriptorHandle {
            cpu: CpuDescriptorHandle { ptr: 0x1000 },
            gpu: GpuDescriptorHandle { ptr: 0x8000 },
            index: 10,
            increment: 32,
        };
        let third = base.at(3);
        assert_eq!(third.cpu.ptr - base.cpu.ptr, 3 * 32);
        assert_eq!(third.gpu.ptr - base.gpu.ptr, 3 * 32);
        assert_eq!(third.index, 13);
        assert!(GpuDescriptorHandle::NULL.offset(5, 32).is_null());
    }
}
