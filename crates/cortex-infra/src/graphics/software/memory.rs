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

//! Host-memory backing of committed resources.
//!
//! Resource bytes sit behind an `Arc` so kernels can read a snapshot while the
//! CPU keeps working. A kernel writing a resource checks the bytes out for the
//! length of the dispatch; readers that arrive meanwhile see nothing, which
//! the executor reports as a read/write hazard.

use std::sync::Arc;

use cortex_core::renderer::api::{
    ClearValue, GpuVirtualAddress, HeapType, ResourceDesc, ResourceId, ResourceStates,
};
use parking_lot::{Mutex, MutexGuard};

/// Where one subresource lives inside the resource bytes. Rows are tightly
/// packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SubresourceLayout {
    pub offset: usize,
    pub width: u32,
    pub height: u32,
    pub row_bytes: usize,
}

impl SubresourceLayout {
    /// Byte offset of texel `(x, y)`.
    pub fn texel_offset(&self, x: u32, y: u32, bytes_per_texel: usize) -> usize {
        self.offset + y as usize * self.row_bytes + x as usize * bytes_per_texel
    }

    /// Bytes covered by the subresource.
    pub fn len(&self) -> usize {
        self.row_bytes * self.height as usize
    }
}

/// Lays the subresources of `desc` out back to back, in subresource order.
pub(crate) fn subresource_layouts(desc: &ResourceDesc) -> Vec<SubresourceLayout> {
    if desc.is_buffer() {
        return vec![SubresourceLayout {
            offset: 0,
            width: desc.width as u32,
            height: 1,
            row_bytes: desc.width as usize,
        }];
    }
    let bpp = desc.format.bytes_per_texel() as usize;
    let mut offset = 0;
    (0..desc.subresource_count())
        .map(|sub| {
            let (mip, _) = desc.subresource_location(sub);
            let (width, height) = desc.mip_size(mip);
            let layout = SubresourceLayout {
                offset,
                width,
                height,
                row_bytes: width as usize * bpp,
            };
            offset += layout.len();
            layout
        })
        .collect()
}

/// A committed resource.
#[derive(Debug)]
pub(crate) struct Resource {
    pub id: ResourceId,
    pub desc: ResourceDesc,
    pub heap: HeapType,
    pub label: String,
    pub address: GpuVirtualAddress,
    pub layouts: Vec<SubresourceLayout>,
    pub size: usize,
    data: Mutex<Option<Arc<Vec<u8>>>>,
    states: Mutex<Vec<ResourceStates>>,
}

impl Resource {
    pub fn new(
        id: ResourceId,
        heap: HeapType,
        desc: ResourceDesc,
        initial_state: ResourceStates,
        clear_value: Option<ClearValue>,
        label: &str,
        address: GpuVirtualAddress,
    ) -> Self {
        let layouts = subresource_layouts(&desc);
        let size = layouts.last().map_or(0, |l| l.offset + l.len());
        let mut bytes = vec![0u8; size];
        // A fresh target holds its optimized clear value.
        if let Some(clear) = clear_value {
            let value = match clear {
                ClearValue::Color { color, .. } => color,
                ClearValue::DepthStencil { depth, .. } => [depth, 0.0, 0.0, 0.0],
            };
            let bpp = desc.format.bytes_per_texel() as usize;
            if bpp > 0 {
                for texel in bytes.chunks_exact_mut(bpp) {
                    crate::graphics::texel::encode(desc.format, value, texel);
                }
            }
        }
        Self {
            id,
            desc,
            heap,
            label: label.to_owned(),
            address,
            size,
            layouts,
            data: Mutex::new(Some(Arc::new(bytes))),
            states: Mutex::new(vec![initial_state; desc.subresource_count() as usize]),
        }
    }

    /// The current bytes, or `None` while a kernel writes them.
    pub fn snapshot(&self) -> Option<Arc<Vec<u8>>> {
        self.data.lock().clone()
    }

    /// Takes the bytes for writing until the returned guard drops.
    pub fn checkout(self: &Arc<Self>) -> Option<Checkout> {
        let bytes = self.data.lock().take()?;
        Some(Checkout {
            resource: self.clone(),
            bytes,
        })
    }

    /// Writes `data` at `offset`. Fails when the range is out of bounds or the
    /// bytes are checked out.
    pub fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<(), WriteFailure> {
        let end = offset
            .checked_add(data.len())
            .filter(|end| *end <= self.size)
            .ok_or(WriteFailure::OutOfBounds)?;
        let mut guard = self.data.lock();
        let bytes = guard.as_mut().ok_or(WriteFailure::Busy)?;
        Arc::make_mut(bytes)[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Tracked state of every subresource.
    pub fn states(&self) -> MutexGuard<'_, Vec<ResourceStates>> {
        self.states.lock()
    }

    /// Indices covered by a subresource argument, `ALL_SUBRESOURCES` included.
    pub fn subresources(&self, subresource: u32) -> std::ops::Range<u32> {
        if subresource == cortex_core::renderer::api::ALL_SUBRESOURCES {
            0..self.desc.subresource_count()
        } else {
            subresource..subresource + 1
        }
    }
}

/// Why a CPU-side write was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteFailure {
    OutOfBounds,
    Busy,
}

/// Exclusive write access to a resource's bytes.
#[derive(Debug)]
pub(crate) struct Checkout {
    resource: Arc<Resource>,
    bytes: Arc<Vec<u8>>,
}

impl Checkout {
    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Copies on write when a reader still holds a snapshot.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.bytes).as_mut_slice()
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        *self.resource.data.lock() = Some(std::mem::take(&mut self.bytes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::renderer::api::Format;

    fn texture() -> Arc<Resource> {
        let desc = ResourceDesc::texture_2d(4, 2, Format::Rgba8Unorm).with_mips(2);
        Arc::new(Resource::new(
            ResourceId(1),
            HeapType::Default,
            desc,
            ResourceStates::COMMON,
            None,
            "t",
            0,
        ))
    }

    #[test]
    fn test_subresources_are_packed_in_order() {
        let res = texture();
        assert_eq!(res.layouts[0].len(), 32);
        assert_eq!(res.layouts[1].offset, 32);
        assert_eq!((res.layouts[1].width, res.layouts[1].height), (2, 1));
        assert_eq!(res.size, 40);
    }

    #[test]
    fn test_checkout_hides_bytes_until_dropped() {
        let res = texture();
        let snapshot = res.snapshot().unwrap();
        let mut writer = res.checkout().unwrap();
        assert!(res.snapshot().is_none());
        assert!(res.checkout().is_none());
        writer.bytes_mut()[0] = 7;
        drop(writer);
        assert_eq!(snapshot[0], 0);
        assert_eq!(res.snapshot().unwrap()[0], 7);
    }

    #[test]
    fn test_clear_value_initializes_targets() {
        let desc = ResourceDesc::texture_2d(2, 2, Format::D32Float);
        let res = Resource::new(
            ResourceId(2),
            HeapType::Default,
            desc,
            ResourceStates::DEPTH_WRITE,
            Some(ClearValue::DepthStencil {
                format: Format::D32Float,
                depth: 1.0,
                stencil: 0,
            }),
            "depth",
            0,
        );
        let bytes = res.snapshot().unwrap();
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(res.write_bytes(14, &[0; 4]), Err(WriteFailure::OutOfBounds));
    }
}
