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

//! Descriptor heaps shared by every device.
//!
//! A handle encodes its heap id in the upper 32 bits and the byte offset of
//! its slot in the lower 32 bits. GPU handles additionally carry
//! [`GPU_HANDLE_TAG`] so a CPU handle is never mistaken for a GPU one.

use cortex_core::renderer::api::{
    ConstantBufferViewDesc, CpuDescriptorHandle, DepthStencilViewDesc, DescriptorHeapDesc,
    DescriptorHeapId, DescriptorHeapInfo, DescriptorHeapType, GpuDescriptorHandle,
    RenderTargetViewDesc, ResourceId, ShaderResourceViewDesc, UnorderedAccessViewDesc,
};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// Size of one descriptor slot in bytes.
pub(crate) const DESCRIPTOR_INCREMENT: u32 = 32;

const GPU_HANDLE_TAG: u64 = 1 << 62;
const HEAP_SHIFT: u32 = 32;
const OFFSET_MASK: u64 = 0xFFFF_FFFF;

/// A typed view written into a heap slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Descriptor {
    Srv {
        resource: ResourceId,
        desc: ShaderResourceViewDesc,
    },
    Uav {
        resource: ResourceId,
        desc: UnorderedAccessViewDesc,
    },
    Rtv {
        resource: ResourceId,
        desc: RenderTargetViewDesc,
    },
    Dsv {
        resource: ResourceId,
        desc: DepthStencilViewDesc,
    },
    Cbv(ConstantBufferViewDesc),
}

impl Descriptor {
    /// The heap type a descriptor of this kind lives in.
    pub fn heap_type(&self) -> DescriptorHeapType {
        match self {
            Descriptor::Rtv { .. } => DescriptorHeapType::Rtv,
            Descriptor::Dsv { .. } => DescriptorHeapType::Dsv,
            _ => DescriptorHeapType::CbvSrvUav,
        }
    }
}

/// One heap and its slots.
#[derive(Debug)]
pub(crate) struct DescriptorHeap {
    pub id: DescriptorHeapId,
    pub ty: DescriptorHeapType,
    pub shader_visible: bool,
    slots: RwLock<Vec<Option<Descriptor>>>,
    generation: AtomicU64,
}

impl DescriptorHeap {
    pub fn new(id: DescriptorHeapId, desc: &DescriptorHeapDesc) -> Self {
        Self {
            id,
            ty: desc.ty,
            shader_visible: desc.shader_visible,
            slots: RwLock::new(vec![None; desc.capacity as usize]),
            generation: AtomicU64::new(0),
        }
    }

    pub fn info(&self) -> DescriptorHeapInfo {
        let cpu_start = CpuDescriptorHandle {
            ptr: (self.id.0 << HEAP_SHIFT) as usize,
        };
        let gpu_start = if self.shader_visible {
            GpuDescriptorHandle {
                ptr: GPU_HANDLE_TAG | (self.id.0 << HEAP_SHIFT),
            }
        } else {
            GpuDescriptorHandle::NULL
        };
        DescriptorHeapInfo {
            id: self.id,
            cpu_start,
            gpu_start,
            increment: DESCRIPTOR_INCREMENT,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.slots.read().len() as u32
    }

    /// Stores `descriptor` at `slot`. Returns `false` when out of range.
    pub fn write(&self, slot: u32, descriptor: Descriptor) -> bool {
        match self.slots.write().get_mut(slot as usize) {
            Some(entry) => {
                *entry = Some(descriptor);
                self.generation.fetch_add(1, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Bumped by every successful write.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Every slot, in order.
    pub fn snapshot(&self) -> Vec<Option<Descriptor>> {
        self.slots.read().clone()
    }

    /// The descriptor at `slot`, `None` when empty or out of range.
    pub fn read(&self, slot: u32) -> Option<Descriptor> {
        self.slots.read().get(slot as usize).copied().flatten()
    }
}

/// A decoded handle: heap id and slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotAddress {
    pub heap: DescriptorHeapId,
    pub slot: u32,
}

fn split(ptr: u64) -> Option<SlotAddress> {
    let offset = ptr & OFFSET_MASK;
    if offset % u64::from(DESCRIPTOR_INCREMENT) != 0 {
        return None;
    }
    Some(SlotAddress {
        heap: DescriptorHeapId(ptr >> HEAP_SHIFT),
        slot: (offset / u64::from(DESCRIPTOR_INCREMENT)) as u32,
    })
}

/// Decodes a CPU handle.
pub(crate) fn decode_cpu(handle: CpuDescriptorHandle) -> Option<SlotAddress> {
    let ptr = handle.ptr as u64;
    if ptr == 0 || ptr & GPU_HANDLE_TAG != 0 {
        return None;
    }
    split(ptr)
}

/// Decodes a GPU handle.
pub(crate) fn decode_gpu(handle: GpuDescriptorHandle) -> Option<SlotAddress> {
    if handle.ptr & GPU_HANDLE_TAG == 0 {
        return None;
    }
    split(handle.ptr & !GPU_HANDLE_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_round_trip_through_slots() {
        let heap = DescriptorHeap::new(
            DescriptorHeapId(3),
            &DescriptorHeapDesc {
                ty: DescriptorHeapType::CbvSrvUav,
                capacity: 16,
                shader_visible: true,
            },
        );
        let info = heap.info();
        let cpu = info.cpu_start.offset(5, info.increment);
        let gpu = info.gpu_start.offset(5, info.increment);
        let expected = SlotAddress {
            heap: DescriptorHeapId(3),
            slot: 5,
        };
        assert_eq!(decode_cpu(cpu), Some(expected));
        assert_eq!(decode_gpu(gpu), Some(expected));
        assert_eq!(decode_gpu(GpuDescriptorHandle { ptr: cpu.ptr as u64 }), None);
    }

    #[test]
    fn test_cpu_only_heaps_have_no_gpu_start() {
        let heap = DescriptorHeap::new(
            DescriptorHeapId(1),
            &DescriptorHeapDesc {
                ty: DescriptorHeapType::Rtv,
                capacity: 4,
                shader_visible: false,
            },
        );
        assert!(heap.info().gpu_start.is_null());
        assert!(!heap.write(4, Descriptor::Cbv(ConstantBufferViewDesc { address: 0, size: 0 })));
        assert_eq!(heap.read(0), None);
        assert_eq!(heap.generation(), 0);
    }

    #[test]
    fn test_writes_bump_the_generation() {
        let heap = DescriptorHeap::new(
            DescriptorHeapId(2),
            &DescriptorHeapDesc {
                ty: DescriptorHeapType::CbvSrvUav,
                capacity: 2,
                shader_visible: true,
            },
        );
        let cbv = Descriptor::Cbv(ConstantBufferViewDesc { address: 256, size: 256 });
        assert!(heap.write(1, cbv));
        assert_eq!(heap.generation(), 1);
        assert_eq!(heap.snapshot(), vec![None, Some(cbv)]);
    }
}
