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

//! CPU/GPU descriptor allocation.
//!
//! Each heap is split into `[persistent | transient ring]`. The CBV/SRV/UAV
//! heap is the single shader-visible heap of the renderer; its leading slots
//! are lent to the bindless registry:
//!
//! ```text
//! CBV/SRV/UAV: [ bindless textures | bindless buffers | persistent | transient ring ]
//! RTV / DSV:   [ persistent | transient ring ]
//! ```
//!
//! The transient ring is divided into one segment per frame in flight, and
//! [`DescriptorHeapManager::begin_frame`] only rewinds the segment of the frame
//! being recorded.

use std::sync::Arc;

use parking_lot::Mutex;

use super::api::{
    DescriptorHandle, DescriptorHeapDesc, DescriptorHeapId, DescriptorHeapInfo, DescriptorHeapType,
};
use super::error::DescriptorError;
use super::traits::GpuDevice;
use crate::config::RendererConfig;

/// Free-list state of a persistent region.
#[derive(Debug, Default)]
struct PersistentRegion {
    next: u32,
    free: Vec<u32>,
    live: Vec<bool>,
    high_water: u32,
}

/// Bump state of a transient ring.
#[derive(Debug)]
struct TransientRing {
    segment_len: u32,
    segment: u32,
    cursor: u32,
}

/// One descriptor heap and its two regions.
#[derive(Debug)]
struct ManagedHeap {
    ty: DescriptorHeapType,
    info: DescriptorHeapInfo,
    persistent_base: u32,
    persistent_len: u32,
    transient_base: u32,
    persistent: Mutex<PersistentRegion>,
    ring: TransientRing,
}

impl ManagedHeap {
    fn create(
        device: &dyn GpuDevice,
        ty: DescriptorHeapType,
        reserved: u32,
        persistent_len: u32,
        transient_len: u32,
        segments: u32,
    ) -> Result<Self, DescriptorError> {
        let capacity = reserved + persistent_len + transient_len;
        let info = device
            .create_descriptor_heap(&DescriptorHeapDesc {
                ty,
                capacity,
                shader_visible: ty == DescriptorHeapType::CbvSrvUav,
            })
            .map_err(|e| DescriptorError::HeapCreationFailed(e.to_string()))?;
        log::info!(
            "Created {ty:?} descriptor heap: {capacity} slots ({reserved} bindless, {persistent_len} persistent, {transient_len} transient)"
        );
        Ok(Self {
            ty,
            info,
            persistent_base: reserved,
            persistent_len,
            transient_base: reserved + persistent_len,
            persistent: Mutex::new(PersistentRegion {
                live: vec![false; persistent_len as usize],
                ..Default::default()
            }),
            ring: TransientRing {
                segment_len: transient_len / segments.max(1),
                segment: 0,
                cursor: 0,
            },
        })
    }

    fn handle(&self, index: u32) -> DescriptorHandle {
        DescriptorHandle {
            cpu: self.info.cpu_start.offset(index, self.info.increment),
            gpu: self.info.gpu_start.offset(index, self.info.increment),
            index,
            increment: self.info.increment,
        }
    }

    fn allocate_persistent(&self) -> Result<DescriptorHandle, DescriptorError> {
        let mut region = self.persistent.lock();
        let local = match region.free.pop() {
            Some(local) => local,
            None if region.next < self.persistent_len => {
                region.next += 1;
                region.next - 1
            }
            None => return Err(DescriptorError::PersistentExhausted { heap: self.ty }),
        };
        region.live[local as usize] = true;
        let live = region.live.iter().filter(|l| **l).count() as u32;
        region.high_water = region.high_water.max(live);
        Ok(self.handle(self.persistent_base + local))
    }

    fn release(&self, handle: DescriptorHandle) -> Result<(), DescriptorError> {
        let invalid = DescriptorError::InvalidRelease {
            heap: self.ty,
            index: handle.index,
        };
        let Some(local) = handle.index.checked_sub(self.persistent_base) else {
            return Err(invalid);
        };
        let mut region = self.persistent.lock();
        match region.live.get_mut(local as usize) {
            Some(live) if *live => {
                *live = false;
                region.free.push(local);
                Ok(())
            }
            _ => Err(invalid),
        }
    }

    fn allocate_transient(&mut self, count: u32) -> Result<DescriptorHandle, DescriptorError> {
        if count == 0 {
            return Err(DescriptorError::EmptyRange);
        }
        let available = self.ring.segment_len - self.ring.cursor;
        if count > available {
            return Err(DescriptorError::TransientRingExhausted {
                heap: self.ty,
                requested: count,
                available,
            });
        }
        let index =
            self.transient_base + self.ring.segment * self.ring.segment_len + self.ring.cursor;
        self.ring.cursor += count;
        Ok(self.handle(index))
    }
}

/// Descriptor usage reported once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DescriptorStats {
    /// Transient CBV/SRV/UAV descriptors handed out this frame.
    pub transient_used: u32,
    /// Transient RTVs handed out this frame.
    pub transient_rtv_used: u32,
    /// Transient DSVs handed out this frame.
    pub transient_dsv_used: u32,
    /// Live persistent CBV/SRV/UAV slots.
    pub persistent_live: u32,
    /// Highest number of simultaneously live persistent CBV/SRV/UAV slots.
    pub persistent_high_water: u32,
}

/// The slots of the shader-visible heap lent to the bindless registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindlessRegion {
    /// The shader-visible heap.
    pub heap: DescriptorHeapInfo,
    /// Texture slots `[0, texture_capacity)`, placeholders included.
    pub texture_capacity: u32,
    /// Buffer and UAV slots following the texture slots.
    pub buffer_capacity: u32,
}

/// Allocator for the CBV/SRV/UAV, RTV and DSV heaps.
///
/// Persistent allocation and release take `&self` and are guarded by a mutex;
/// the transient rings are owned by the recording thread and take `&mut self`.
#[derive(Debug)]
pub struct DescriptorHeapManager {
    cbv_srv_uav: ManagedHeap,
    rtv: ManagedHeap,
    dsv: ManagedHeap,
    bindless: BindlessRegion,
    frames_in_flight: u32,
}

impl DescriptorHeapManager {
    /// Creates the three heaps sized from `config`.
    pub fn new(device: &Arc<dyn GpuDevice>, config: &RendererConfig) -> Result<Self, DescriptorError> {
        let frames = config.frames_in_flight.max(1);
        let lent = config.bindless.max_textures + config.bindless.max_buffers;
        let d = &config.descriptors;
        let cbv_srv_uav = ManagedHeap::create(
            device.as_ref(),
            DescriptorHeapType::CbvSrvUav,
            lent,
            d.persistent,
            d.transient,
            frames,
        )?;
        let rtv = ManagedHeap::create(
            device.as_ref(),
            DescriptorHeapType::Rtv,
            0,
            d.rtv / 2,
            d.rtv - d.rtv / 2,
            frames,
        )?;
        let dsv = ManagedHeap::create(
            device.as_ref(),
            DescriptorHeapType::Dsv,
            0,
            d.dsv / 2,
            d.dsv - d.dsv / 2,
            frames,
        )?;
        let bindless = BindlessRegion {
            heap: cbv_srv_uav.info,
            texture_capacity: config.bindless.max_textures,
            buffer_capacity: config.bindless.max_buffers,
        };
        Ok(Self {
            cbv_srv_uav,
            rtv,
            dsv,
            bindless,
            frames_in_flight: frames,
        })
    }

    fn heap(&self, ty: DescriptorHeapType) -> &ManagedHeap {
        match ty {
            DescriptorHeapType::CbvSrvUav => &self.cbv_srv_uav,
            DescriptorHeapType::Rtv => &self.rtv,
            DescriptorHeapType::Dsv => &self.dsv,
        }
    }

    fn heap_mut(&mut self, ty: DescriptorHeapType) -> &mut ManagedHeap {
        match ty {
            DescriptorHeapType::CbvSrvUav => &mut self.cbv_srv_uav,
            DescriptorHeapType::Rtv => &mut self.rtv,
            DescriptorHeapType::Dsv => &mut self.dsv,
        }
    }

    /// Rewinds the transient segment of `frame_index` on every heap.
    ///
    /// The caller must have waited for the frame that last used this segment.
    pub fn begin_frame(&mut self, frame_index: u32) {
        let segment = frame_index % self.frames_in_flight;
        for heap in [&mut self.cbv_srv_uav, &mut self.rtv, &mut self.dsv] {
            heap.ring.segment = segment;
            heap.ring.cursor = 0;
        }
    }

    /// Allocates one slot that lives until [`DescriptorHeapManager::release`].
    pub fn allocate_persistent(
        &self,
        ty: DescriptorHeapType,
    ) -> Result<DescriptorHandle, DescriptorError> {
        self.heap(ty).allocate_persistent()
    }

    /// Allocates `count` contiguous slots valid until this frame's segment is
    /// rewound. Returns the handle of the first slot.
    pub fn allocate_transient_range(
        &mut self,
        ty: DescriptorHeapType,
        count: u32,
    ) -> Result<DescriptorHandle, DescriptorError> {
        self.heap_mut(ty).allocate_transient(count)
    }

    /// Returns a persistent slot to its free list.
    ///
    /// Transient, bindless and already released slots are rejected.
    pub fn release(
        &self,
        ty: DescriptorHeapType,
        handle: DescriptorHandle,
    ) -> Result<(), DescriptorError> {
        self.heap(ty).release(handle)
    }

    /// The shader-visible CBV/SRV/UAV heap.
    pub fn shader_visible_heap(&self) -> DescriptorHeapId {
        self.cbv_srv_uav.info.id
    }

    /// Heap information of one heap type.
    pub fn heap_info(&self, ty: DescriptorHeapType) -> DescriptorHeapInfo {
        self.heap(ty).info
    }

    /// The slots lent to the bindless registry.
    pub fn bindless_region(&self) -> BindlessRegion {
        self.bindless
    }

    /// Descriptors in each transient segment of one heap type.
    pub fn transient_segment_len(&self, ty: DescriptorHeapType) -> u32 {
        self.heap(ty).ring.segment_len
    }

    /// Usage of the current frame.
    pub fn frame_stats(&self) -> DescriptorStats {
        let region = self.cbv_srv_uav.persistent.lock();
        DescriptorStats {
            transient_used: self.cbv_srv_uav.ring.cursor,
            transient_rtv_used: self.rtv.ring.cursor,
            transient_dsv_used: self.dsv.ring.cursor,
            persistent_live: region.live.iter().filter(|l| **l).count() as u32,
            persistent_high_water: region.high_water,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::mock::MockDevice;

    fn manager(frames: u32) -> DescriptorHeapManager {
        let device: Arc<dyn GpuDevice> = MockDevice::new();
        let mut config = RendererConfig::default();
        config.frames_in_flight = frames;
        config.bindless.max_textures = 8;
        config.bindless.max_buffers = 8;
        config.descriptors.persistent = 4;
        config.descriptors.transient = 16;
        DescriptorHeapManager::new(&device, &config).unwrap()
    }

    #[test]
    fn test_transient_range_is_contiguous() {
        let mut m = manager(1);
        m.begin_frame(0);
        let first = m
            .allocate_transient_range(DescriptorHeapType::CbvSrvUav, 5)
            .unwrap();
        for i in 0..5u32 {
            let h = first.at(i);
            assert_eq!(h.cpu.ptr - first.cpu.ptr, (i * first.increment) as usize);
            assert_eq!(h.gpu.ptr - first.gpu.ptr, u64::from(i * first.increment));
        }
        // The ring follows the bindless and persistent regions.
        assert_eq!(first.index, 8 + 8 + 4);
    }

    #[test]
    fn test_transient_ring_exhaustion_does_not_wrap() {
        let mut m = manager(1);
        m.begin_frame(0);
        m.allocate_transient_range(DescriptorHeapType::CbvSrvUav, 12)
            .unwrap();
        let err = m
            .allocate_transient_range(DescriptorHeapType::CbvSrvUav, 5)
            .unwrap_err();
        assert_eq!(
            err,
            DescriptorError::TransientRingExhausted {
                heap: DescriptorHeapType::CbvSrvUav,
                requested: 5,
                available: 4,
            }
        );
        m.begin_frame(1);
        assert!(m
            .allocate_transient_range(DescriptorHeapType::CbvSrvUav, 16)
            .is_ok());
    }

    #[test]
    fn test_ring_segments_per_frame_in_flight() {
        let mut m = manager(2);
        assert_eq!(m.transient_segment_len(DescriptorHeapType::CbvSrvUav), 8);
        m.begin_frame(0);
        let a = m
            .allocate_transient_range(DescriptorHeapType::CbvSrvUav, 3)
            .unwrap();
        m.begin_frame(1);
        let b = m
            .allocate_transient_range(DescriptorHeapType::CbvSrvUav, 3)
            .unwrap();
        assert_eq!(b.index - a.index, 8);
        assert_eq!(m.frame_stats().transient_used, 3);
        m.begin_frame(2);
        let c = m
            .allocate_transient_range(DescriptorHeapType::CbvSrvUav, 1)
            .unwrap();
        assert_eq!(c.index, a.index);
    }

    #[test]
    fn test_persistent_free_list_and_release_rules() {
        let mut m = manager(1);
        let a = m.allocate_persistent(DescriptorHeapType::CbvSrvUav).unwrap();
        let b = m.allocate_persistent(DescriptorHeapType::CbvSrvUav).unwrap();
        assert_eq!(a.index, 16);
        assert_eq!(b.index, 17);
        m.release(DescriptorHeapType::CbvSrvUav, a).unwrap();
        assert!(m.release(DescriptorHeapType::CbvSrvUav, a).is_err());
        let c = m.allocate_persistent(DescriptorHeapType::CbvSrvUav).unwrap();
        assert_eq!(c.index, a.index);

        m.begin_frame(0);
        let t = m
            .allocate_transient_range(DescriptorHeapType::CbvSrvUav, 1)
            .unwrap();
        assert!(m.release(DescriptorHeapType::CbvSrvUav, t).is_err());

        for _ in 0..2 {
            m.allocate_persistent(DescriptorHeapType::CbvSrvUav).unwrap();
        }
        assert_eq!(
            m.allocate_persistent(DescriptorHeapType::CbvSrvUav),
            Err(DescriptorError::PersistentExhausted {
                heap: DescriptorHeapType::CbvSrvUav
            })
        );
        assert_eq!(m.frame_stats().persistent_high_water, 4);
    }

    #[test]
    fn test_rtv_heap_is_cpu_only() {
        let m = manager(2);
        let rtv = m.allocate_persistent(DescriptorHeapType::Rtv).unwrap();
        assert!(rtv.gpu.is_null());
        assert_eq!(m.bindless_region().texture_capacity, 8);
    }
}
