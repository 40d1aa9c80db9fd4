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

//! The bindless resource registry.
//!
//! Shaders index `ResourceDescriptorHeap[i]` with integers handed out here.
//! Texture SRVs live in `[0, T)`, buffer SRVs and all UAVs in `[T, T + B)`.
//! The first [`RESERVED_SLOT_COUNT`] texture slots hold placeholder textures
//! and are never recycled.
//!
//! Releases are deferred: a released slot is stamped with the frame fence
//! current at release time and only returns to its free list once
//! [`BindlessRegistry::retire`] sees that fence complete, or after a flush.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::api::{
    CpuDescriptorHandle, DescriptorHeapInfo, Format, ResourceDesc, ResourceId, ResourceStates,
    ShaderResourceViewDesc, UnorderedAccessViewDesc,
};
use super::descriptors::BindlessRegion;
use super::error::{BindlessError, BindlessKind, DeviceError, UploadError};
use super::traits::GpuDevice;
use super::upload::Uploader;

/// Number of placeholder slots at the start of the texture region.
pub const RESERVED_SLOT_COUNT: u32 = 4;

/// The index shaders treat as "no resource".
pub const INVALID_BINDLESS_INDEX: u32 = 0xFFFF_FFFF;

/// The placeholder textures, by slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Placeholder {
    /// Opaque white albedo.
    White = 0,
    /// Tangent-space flat normal `(0.5, 0.5, 1)`.
    FlatNormal = 1,
    /// Metallic 0.
    ZeroMetallic = 2,
    /// Metallic-roughness texel with roughness 0.5 and metallic 0.
    HalfRoughness = 3,
}

impl Placeholder {
    /// All placeholders in slot order.
    pub const ALL: [Placeholder; RESERVED_SLOT_COUNT as usize] = [
        Placeholder::White,
        Placeholder::FlatNormal,
        Placeholder::ZeroMetallic,
        Placeholder::HalfRoughness,
    ];

    /// The bindless index of this placeholder.
    pub const fn index(self) -> u32 {
        self as u32
    }

    /// The RGBA8 texel of this placeholder.
    pub const fn texel(self) -> [u8; 4] {
        match self {
            Placeholder::White => [255, 255, 255, 255],
            Placeholder::FlatNormal => [128, 128, 255, 255],
            Placeholder::ZeroMetallic => [0, 0, 0, 255],
            // glTF packing: roughness in G, metallic in B.
            Placeholder::HalfRoughness => [0, 128, 0, 255],
        }
    }
}

/// Called before pending slots are recycled early. Must wait for the GPU.
pub type FlushCallback = Arc<dyn Fn() -> Result<(), DeviceError> + Send + Sync>;

#[derive(Debug)]
struct Region {
    base: u32,
    capacity: u32,
    next: u32,
    free: Vec<u32>,
    live: Vec<bool>,
}

impl Region {
    fn new(base: u32, first: u32, capacity: u32) -> Self {
        Self {
            base,
            capacity,
            next: first,
            free: Vec::new(),
            live: vec![false; capacity as usize],
        }
    }

    fn try_allocate(&mut self) -> Option<u32> {
        let local = match self.free.pop() {
            Some(local) => local,
            None if self.next < self.capacity => {
                self.next += 1;
                self.next - 1
            }
            None => return None,
        };
        self.live[local as usize] = true;
        Some(self.base + local)
    }

    fn contains(&self, index: u32) -> bool {
        index >= self.base && index < self.base + self.capacity
    }

    fn live_count(&self) -> u32 {
        self.live.iter().filter(|l| **l).count() as u32
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingRelease {
    index: u32,
    kind: BindlessKind,
    fence: u64,
}

#[derive(Debug)]
struct RegistryState {
    textures: Region,
    buffers: Region,
    pending: VecDeque<PendingRelease>,
    release_fence: u64,
}

impl RegistryState {
    fn region(&mut self, kind: BindlessKind) -> &mut Region {
        match kind {
            BindlessKind::Texture => &mut self.textures,
            BindlessKind::Buffer => &mut self.buffers,
        }
    }

    fn retire(&mut self, completed: u64) -> usize {
        let mut retired = 0;
        let mut keep = VecDeque::with_capacity(self.pending.len());
        while let Some(p) = self.pending.pop_front() {
            if p.fence <= completed {
                let region = self.region(p.kind);
                let local = p.index - region.base;
                region.live[local as usize] = false;
                region.free.push(local);
                retired += 1;
            } else {
                keep.push_back(p);
            }
        }
        self.pending = keep;
        retired
    }
}

/// Occupancy of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindlessStats {
    /// Live texture slots, placeholders excluded.
    pub live_textures: u32,
    /// Live buffer and UAV slots.
    pub live_buffers: u32,
    /// Released slots waiting for their fence.
    pub pending_releases: u32,
    /// Recycled texture slots ready for reuse.
    pub free_textures: u32,
    /// Recycled buffer slots ready for reuse.
    pub free_buffers: u32,
}

/// Hands out stable indices into the shader-visible heap.
///
/// Fully mutex-guarded; the registry never owns the resources it indexes.
pub struct BindlessRegistry {
    device: Arc<dyn GpuDevice>,
    heap: DescriptorHeapInfo,
    state: Mutex<RegistryState>,
    flush: RwLock<Option<FlushCallback>>,
}

impl fmt::Debug for BindlessRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindlessRegistry")
            .field("heap", &self.heap.id)
            .field("stats", &self.stats())
            .finish()
    }
}

impl BindlessRegistry {
    /// Creates a registry over the slots lent by the descriptor manager.
    pub fn new(device: Arc<dyn GpuDevice>, region: BindlessRegion) -> Arc<Self> {
        log::info!(
            "Bindless registry: {} texture slots ({} reserved), {} buffer slots",
            region.texture_capacity,
            RESERVED_SLOT_COUNT,
            region.buffer_capacity
        );
        Arc::new(Self {
            device,
            heap: region.heap,
            state: Mutex::new(RegistryState {
                textures: Region::new(0, RESERVED_SLOT_COUNT, region.texture_capacity),
                buffers: Region::new(region.texture_capacity, 0, region.buffer_capacity),
                pending: VecDeque::new(),
                release_fence: 0,
            }),
            flush: RwLock::new(None),
        })
    }

    /// Installs the callback used to drain the GPU before pending slots are
    /// recycled early.
    pub fn set_flush_callback(&self, callback: FlushCallback) {
        *self.flush.write() = Some(callback);
    }

    /// Sets the fence value stamped on subsequent releases: the value the
    /// frame being recorded will signal.
    pub fn set_release_fence(&self, value: u64) {
        self.state.lock().release_fence = value;
    }

    /// CPU handle of a slot of the shader-visible heap.
    pub fn cpu_handle(&self, index: u32) -> CpuDescriptorHandle {
        self.heap.cpu_start.offset(index, self.heap.increment)
    }

    fn allocate(&self, kind: BindlessKind) -> Result<u32, BindlessError> {
        let has_pending = {
            let mut state = self.state.lock();
            if let Some(index) = state.region(kind).try_allocate() {
                return Ok(index);
            }
            state.pending.iter().any(|p| p.kind == kind)
        };

        if has_pending && self.flush_and_retire() > 0 {
            if let Some(index) = self.state.lock().region(kind).try_allocate() {
                return Ok(index);
            }
        }

        let capacity = self.state.lock().region(kind).capacity;
        log::error!("Bindless {kind:?} slots exhausted (capacity {capacity})");
        Err(BindlessError::Exhausted { kind, capacity })
    }

    /// Invokes the flush callback outside the registry lock, then recycles
    /// every pending slot. Returns the number of slots recycled.
    pub fn flush_and_retire(&self) -> usize {
        let callback = self.flush.read().clone();
        let Some(callback) = callback else {
            return 0;
        };
        if let Err(err) = callback() {
            log::error!("Bindless flush failed: {err}");
            return 0;
        }
        self.state.lock().retire(u64::MAX)
    }

    fn undo(&self, kind: BindlessKind, index: u32) {
        let mut state = self.state.lock();
        let region = state.region(kind);
        let local = index - region.base;
        region.live[local as usize] = false;
        region.free.push(local);
    }

    /// Registers a texture SRV and returns its slot.
    pub fn register_texture(
        self: &Arc<Self>,
        resource: ResourceId,
        desc: &ShaderResourceViewDesc,
    ) -> Result<BindlessSlot, BindlessError> {
        self.register_srv(BindlessKind::Texture, resource, desc)
    }

    /// Registers a raw or structured buffer SRV and returns its slot.
    pub fn register_buffer(
        self: &Arc<Self>,
        resource: ResourceId,
        desc: &ShaderResourceViewDesc,
    ) -> Result<BindlessSlot, BindlessError> {
        self.register_srv(BindlessKind::Buffer, resource, desc)
    }

    /// Registers a UAV in the buffer/UAV region and returns its slot.
    pub fn register_uav(
        self: &Arc<Self>,
        resource: ResourceId,
        desc: &UnorderedAccessViewDesc,
    ) -> Result<BindlessSlot, BindlessError> {
        let index = self.allocate(BindlessKind::Buffer)?;
        if let Err(err) =
            self.device
                .create_unordered_access_view(resource, desc, self.cpu_handle(index))
        {
            self.undo(BindlessKind::Buffer, index);
            return Err(err.into());
        }
        Ok(BindlessSlot::new(self, index))
    }

    fn register_srv(
        self: &Arc<Self>,
        kind: BindlessKind,
        resource: ResourceId,
        desc: &ShaderResourceViewDesc,
    ) -> Result<BindlessSlot, BindlessError> {
        let index = self.allocate(kind)?;
        if let Err(err) = self
            .device
            .create_shader_resource_view(resource, desc, self.cpu_handle(index))
        {
            self.undo(kind, index);
            return Err(err.into());
        }
        Ok(BindlessSlot::new(self, index))
    }

    /// Writes the SRVs of the placeholder textures into the reserved slots.
    pub fn install_placeholders(&self, placeholders: &PlaceholderTextures) -> Result<(), BindlessError> {
        for (placeholder, resource) in Placeholder::ALL.iter().zip(placeholders.resources) {
            self.device.create_shader_resource_view(
                resource,
                &ShaderResourceViewDesc::texture_2d(Format::Rgba8Unorm),
                self.cpu_handle(placeholder.index()),
            )?;
        }
        Ok(())
    }

    /// Queues a slot for recycling once the current release fence completes.
    ///
    /// Placeholder slots are never released.
    pub fn release(&self, index: u32) {
        if index < RESERVED_SLOT_COUNT {
            log::warn!("Ignoring release of reserved bindless slot {index}");
            return;
        }
        let mut state = self.state.lock();
        let kind = if state.textures.contains(index) {
            BindlessKind::Texture
        } else if state.buffers.contains(index) {
            BindlessKind::Buffer
        } else {
            log::warn!("Ignoring release of out-of-range bindless slot {index}");
            return;
        };
        let fence = state.release_fence;
        let region = state.region(kind);
        let local = (index - region.base) as usize;
        if !region.live[local] {
            log::warn!("Ignoring release of free bindless slot {index}");
            return;
        }
        if state.pending.iter().any(|p| p.index == index) {
            log::warn!("Ignoring second release of bindless slot {index}");
            return;
        }
        state.pending.push_back(PendingRelease { index, kind, fence });
    }

    /// Recycles pending slots whose release fence has completed.
    pub fn retire(&self, completed_fence_value: u64) -> usize {
        self.state.lock().retire(completed_fence_value)
    }

    /// Current occupancy.
    pub fn stats(&self) -> BindlessStats {
        let state = self.state.lock();
        BindlessStats {
            live_textures: state.textures.live_count(),
            live_buffers: state.buffers.live_count(),
            pending_releases: state.pending.len() as u32,
            free_textures: state.textures.free.len() as u32,
            free_buffers: state.buffers.free.len() as u32,
        }
    }
}

/// An allocated bindless slot. Dropping it releases the slot through a
/// non-owning reference to the registry.
#[derive(Debug)]
pub struct BindlessSlot {
    index: u32,
    registry: Weak<BindlessRegistry>,
}

impl BindlessSlot {
    fn new(registry: &Arc<BindlessRegistry>, index: u32) -> Self {
        Self {
            index,
            registry: Arc::downgrade(registry),
        }
    }

    /// A slot owning no heap entry, reading as [`INVALID_BINDLESS_INDEX`].
    pub(crate) fn detached() -> Self {
        Self {
            index: INVALID_BINDLESS_INDEX,
            registry: Weak::new(),
        }
    }

    /// The shader-visible index.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl Drop for BindlessSlot {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.index);
        }
    }
}

/// The 1x1 textures behind the reserved slots.
#[derive(Debug)]
pub struct PlaceholderTextures {
    /// Resources in slot order.
    pub resources: [ResourceId; RESERVED_SLOT_COUNT as usize],
}

impl PlaceholderTextures {
    /// Uploads the four placeholder textures, shader-readable from any stage.
    pub fn create(uploader: &Uploader) -> Result<Self, UploadError> {
        let desc = ResourceDesc::texture_2d(1, 1, Format::Rgba8Unorm);
        let mut resources = [ResourceId(0); RESERVED_SLOT_COUNT as usize];
        for (slot, placeholder) in resources.iter_mut().zip(Placeholder::ALL) {
            *slot = uploader.upload_texture_2d(
                &desc,
                &[&placeholder.texel()],
                ResourceStates::ALL_SHADER_RESOURCE,
                "Placeholder",
            )?;
        }
        Ok(Self { resources })
    }

    /// Destroys the placeholder textures. The GPU must be idle.
    pub fn destroy(self, device: &dyn GpuDevice) {
        for resource in self.resources {
            if let Err(err) = device.destroy_resource(resource) {
                log::warn!("Failed to destroy placeholder texture: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use crate::renderer::descriptors::DescriptorHeapManager;
    use crate::renderer::mock::MockDevice;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry(textures: u32, buffers: u32) -> (Arc<MockDevice>, Arc<BindlessRegistry>) {
        let mock = MockDevice::new();
        let device: Arc<dyn GpuDevice> = mock.clone();
        let mut config = RendererConfig::default();
        config.bindless.max_textures = textures;
        config.bindless.max_buffers = buffers;
        let descriptors = DescriptorHeapManager::new(&device, &config).unwrap();
        (mock, BindlessRegistry::new(device, descriptors.bindless_region()))
    }

    fn texture() -> ShaderResourceViewDesc {
        ShaderResourceViewDesc::texture_2d(Format::Rgba8Unorm)
    }

    #[test]
    fn test_regions_are_independent() {
        let (_, reg) = registry(8, 4);
        let t = reg.register_texture(ResourceId(1), &texture()).unwrap();
        let b = reg
            .register_buffer(ResourceId(2), &ShaderResourceViewDesc::raw_buffer(64))
            .unwrap();
        assert_eq!(t.index(), RESERVED_SLOT_COUNT);
        assert_eq!(b.index(), 8);
        let stats = reg.stats();
        assert_eq!((stats.live_textures, stats.live_buffers), (1, 1));
    }

    #[test]
    fn test_descriptor_written_at_slot() {
        let (mock, reg) = registry(8, 4);
        let t = reg.register_texture(ResourceId(42), &texture()).unwrap();
        assert_eq!(mock.view_target(reg.cpu_handle(t.index())), Some(ResourceId(42)));
    }

    #[test]
    fn test_reserved_release_is_noop() {
        let (_, reg) = registry(8, 4);
        for i in 0..RESERVED_SLOT_COUNT {
            reg.release(i);
        }
        assert_eq!(reg.stats(), BindlessStats::default());
    }

    #[test]
    fn test_deferred_release_and_retire() {
        let (_, reg) = registry(8, 4);
        reg.set_release_fence(5);
        let slot = reg.register_texture(ResourceId(1), &texture()).unwrap();
        let index = slot.index();
        drop(slot);
        assert_eq!(reg.stats().pending_releases, 1);
        assert_eq!(reg.retire(4), 0);
        assert_eq!(reg.stats().free_textures, 0);
        assert_eq!(reg.retire(5), 1);
        let stats = reg.stats();
        assert_eq!((stats.pending_releases, stats.free_textures), (0, 1));
        let again = reg.register_texture(ResourceId(3), &texture()).unwrap();
        assert_eq!(again.index(), index);
    }

    #[test]
    fn test_exhaustion_flushes_pending_before_failing() {
        let (_, reg) = registry(RESERVED_SLOT_COUNT + 1, 1);
        let flushes = Arc::new(AtomicUsize::new(0));
        let counter = flushes.clone();
        reg.set_flush_callback(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        reg.set_release_fence(100);
        let first = reg.register_texture(ResourceId(1), &texture()).unwrap();
        drop(first);
        let second = reg.register_texture(ResourceId(2), &texture()).unwrap();
        assert_eq!(second.index(), RESERVED_SLOT_COUNT);
        assert_eq!(flushes.load(Ordering::SeqCst), 1);

        let err = reg.register_texture(ResourceId(3), &texture()).unwrap_err();
        assert_eq!(
            err,
            BindlessError::Exhausted {
                kind: BindlessKind::Texture,
                capacity: RESERVED_SLOT_COUNT + 1
            }
        );
    }

    #[test]
    fn test_slot_outliving_registry_is_harmless() {
        let (_, reg) = registry(8, 4);
        let slot = reg.register_texture(ResourceId(1), &texture()).unwrap();
        drop(reg);
        drop(slot);
    }
}
