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

//! Objects owned by the `wgpu` device and the state its command lists and
//! fences share.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cortex_core::renderer::api::{
    CommandListId, CpuDescriptorHandle, DescriptorHeapId, DeviceOptions, FenceId,
    GpuVirtualAddress, HeapType, PipelineId, QueueType, ResourceDesc, ResourceId,
    RootSignatureDesc, RootSignatureId,
};
use cortex_core::renderer::DeviceError;
use cortex_core::utils::align_up;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::graphics::debug::DebugLayer;
use crate::graphics::descriptors::{decode_cpu, Descriptor, DescriptorHeap, SlotAddress};
use crate::graphics::recording::{Command, ListSink, RecordedList};

use super::heap::Bindless;
use super::pipeline::Pipeline;

const BREADCRUMB_CAPACITY: usize = 64;
const ADDRESS_ALIGNMENT: u64 = 64 * 1024;
const ADDRESS_BASE: u64 = 0x1_0000_0000;

/// The `wgpu` object behind a resource.
#[derive(Debug)]
pub(crate) enum Storage {
    /// Upload buffers keep a CPU copy so mapped reads see what was written.
    Buffer {
        buffer: wgpu::Buffer,
        shadow: Option<Mutex<Vec<u8>>>,
    },
    Texture {
        texture: wgpu::Texture,
        format: wgpu::TextureFormat,
    },
}

#[derive(Debug)]
pub(crate) struct Resource {
    pub id: ResourceId,
    pub label: String,
    pub heap: HeapType,
    pub desc: ResourceDesc,
    pub address: GpuVirtualAddress,
    pub size: u64,
    pub storage: Storage,
}

impl Resource {
    pub fn buffer(&self) -> Option<&wgpu::Buffer> {
        match &self.storage {
            Storage::Buffer { buffer, .. } => Some(buffer),
            Storage::Texture { .. } => None,
        }
    }

    pub fn texture(&self) -> Option<(&wgpu::Texture, wgpu::TextureFormat)> {
        match &self.storage {
            Storage::Texture { texture, format } => Some((texture, *format)),
            Storage::Buffer { .. } => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct FenceValues {
    completed: u64,
    submitted: u64,
}

/// A fence completed from `on_submitted_work_done` callbacks.
///
/// `submitted` is the highest value a queue has scheduled a signal for;
/// `completed` is the highest value the GPU has reached.
#[derive(Debug)]
pub(crate) struct Fence {
    values: Mutex<FenceValues>,
    changed: Condvar,
}

impl Fence {
    pub fn new(initial_value: u64) -> Self {
        Self {
            values: Mutex::new(FenceValues {
                completed: initial_value,
                submitted: initial_value,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn completed(&self) -> u64 {
        self.values.lock().completed
    }

    pub fn submitted(&self) -> u64 {
        self.values.lock().submitted
    }

    pub fn schedule(&self, value: u64) {
        let mut values = self.values.lock();
        values.submitted = values.submitted.max(value);
        self.changed.notify_all();
    }

    /// Raises the completed value. A fence never goes backwards.
    pub fn complete(&self, value: u64) {
        let mut values = self.values.lock();
        values.completed = values.completed.max(value);
        values.submitted = values.submitted.max(value);
        self.changed.notify_all();
    }

    /// Waits until a signal of at least `value` is submitted, which is
    /// enough to order work on the single hardware queue behind it.
    pub fn wait_scheduled(&self, value: u64, shared: &Shared) -> Result<(), DeviceError> {
        let mut values = self.values.lock();
        while values.submitted < value {
            if let Some(reason) = shared.removed_reason() {
                return Err(DeviceError::Removed { reason });
            }
            self.changed.wait(&mut values);
        }
        Ok(())
    }

    /// Blocks until the fence completes `value`, polling the device once the
    /// signal is in flight.
    pub fn wait(&self, value: u64, shared: &Shared) -> Result<(), DeviceError> {
        loop {
            {
                let mut values = self.values.lock();
                if values.completed >= value {
                    return Ok(());
                }
                if let Some(reason) = shared.removed_reason() {
                    return Err(DeviceError::Removed { reason });
                }
                if values.submitted < value {
                    self.changed
                        .wait_for(&mut values, Duration::from_millis(10));
                    continue;
                }
            }
            if let Err(e) = shared.device.poll(wgpu::PollType::wait_indefinitely()) {
                shared.remove_device(format!("polling for fence value {value} failed: {e}"));
            }
        }
    }

    pub fn wake_all(&self) {
        let _guard = self.values.lock();
        self.changed.notify_all();
    }
}

/// The shader-visible heap as a bind group, rebuilt when the heap changes.
#[derive(Debug)]
pub(crate) struct HeapGroup {
    pub generation: u64,
    pub group: Arc<wgpu::BindGroup>,
}

#[derive(Debug)]
pub(crate) struct Shared {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub bindless: Bindless,
    pub debug: DebugLayer,
    pub breadcrumbs_enabled: bool,
    pub resources: RwLock<HashMap<ResourceId, Arc<Resource>>>,
    addresses: RwLock<BTreeMap<GpuVirtualAddress, ResourceId>>,
    pub heaps: RwLock<HashMap<DescriptorHeapId, Arc<DescriptorHeap>>>,
    pub root_signatures: RwLock<HashMap<RootSignatureId, Arc<RootSignatureDesc>>>,
    pub pipelines: RwLock<HashMap<PipelineId, Arc<Pipeline>>>,
    pub fences: RwLock<HashMap<FenceId, Arc<Fence>>>,
    pub closed_lists: Mutex<HashMap<CommandListId, RecordedList>>,
    pub heap_groups: Mutex<HashMap<DescriptorHeapId, HeapGroup>>,
    breadcrumbs: Mutex<VecDeque<String>>,
    removed: Mutex<Option<String>>,
    uncaptured: Mutex<Vec<String>>,
    next_id: AtomicU64,
    next_address: AtomicU64,
}

impl Shared {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, options: DeviceOptions) -> Self {
        Self {
            bindless: Bindless::new(&device),
            device,
            queue,
            debug: DebugLayer::new(options.validation),
            breadcrumbs_enabled: options.breadcrumbs,
            resources: RwLock::new(HashMap::new()),
            addresses: RwLock::new(BTreeMap::new()),
            heaps: RwLock::new(HashMap::new()),
            root_signatures: RwLock::new(HashMap::new()),
            pipelines: RwLock::new(HashMap::new()),
            fences: RwLock::new(HashMap::new()),
            closed_lists: Mutex::new(HashMap::new()),
            heap_groups: Mutex::new(HashMap::new()),
            breadcrumbs: Mutex::new(VecDeque::with_capacity(BREADCRUMB_CAPACITY)),
            removed: Mutex::new(None),
            uncaptured: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            next_address: AtomicU64::new(ADDRESS_BASE),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn allocate_address(&self, size: u64) -> GpuVirtualAddress {
        let span = align_up(size.max(1), ADDRESS_ALIGNMENT);
        self.next_address.fetch_add(span, Ordering::Relaxed)
    }

    pub fn insert_resource(&self, resource: Resource) -> Arc<Resource> {
        let resource = Arc::new(resource);
        if resource.address != 0 {
            self.addresses
                .write()
                .insert(resource.address, resource.id);
        }
        self.resources
            .write()
            .insert(resource.id, resource.clone());
        resource
    }

    pub fn remove_resource(&self, id: ResourceId) -> Option<Arc<Resource>> {
        let resource = self.resources.write().remove(&id)?;
        if resource.address != 0 {
            self.addresses.write().remove(&resource.address);
        }
        Some(resource)
    }

    pub fn resource(&self, id: ResourceId) -> Option<Arc<Resource>> {
        self.resources.read().get(&id).cloned()
    }

    /// The buffer containing `address` and the offset into it.
    pub fn resolve_address(&self, address: GpuVirtualAddress) -> Option<(Arc<Resource>, u64)> {
        let id = {
            let addresses = self.addresses.read();
            let (_, id) = addresses.range(..=address).next_back()?;
            *id
        };
        let resource = self.resource(id)?;
        let offset = address - resource.address;
        (offset < resource.size).then_some((resource, offset))
    }

    pub fn heap(&self, id: DescriptorHeapId) -> Option<Arc<DescriptorHeap>> {
        self.heaps.read().get(&id).cloned()
    }

    pub fn cpu_slot(
        &self,
        handle: CpuDescriptorHandle,
    ) -> Option<(Arc<DescriptorHeap>, SlotAddress)> {
        let address = decode_cpu(handle)?;
        Some((self.heap(address.heap)?, address))
    }

    pub fn root_signature(&self, id: RootSignatureId) -> Option<Arc<RootSignatureDesc>> {
        self.root_signatures.read().get(&id).cloned()
    }

    pub fn pipeline(&self, id: PipelineId) -> Option<Arc<Pipeline>> {
        self.pipelines.read().get(&id).cloned()
    }

    pub fn fence(&self, id: FenceId) -> Option<Arc<Fence>> {
        self.fences.read().get(&id).cloned()
    }

    pub fn push_breadcrumb(&self, marker: String) {
        if !self.breadcrumbs_enabled {
            return;
        }
        let mut trail = self.breadcrumbs.lock();
        if trail.len() == BREADCRUMB_CAPACITY {
            trail.pop_front();
        }
        trail.push_back(marker);
    }

    pub fn breadcrumbs(&self) -> Vec<String> {
        self.breadcrumbs.lock().iter().cloned().collect()
    }

    /// Records a validation error `wgpu` raised outside any call that could
    /// return it.
    pub fn report_uncaptured(&self, message: String) {
        self.debug.error(message.clone());
        self.uncaptured.lock().push(message);
    }

    /// Errors reported since the last call.
    pub fn take_uncaptured(&self) -> Vec<String> {
        std::mem::take(&mut *self.uncaptured.lock())
    }

    /// Marks the device as removed and wakes every fence waiter. The first
    /// reason wins.
    pub fn remove_device(&self, reason: String) {
        {
            let mut removed = self.removed.lock();
            if removed.is_some() {
                return;
            }
            log::error!("wgpu device removed: {reason}");
            *removed = Some(reason);
        }
        let fences: Vec<_> = self.fences.read().values().cloned().collect();
        for fence in fences {
            fence.wake_all();
        }
    }

    pub fn removed_reason(&self) -> Option<String> {
        self.removed.lock().clone()
    }

    pub fn is_removed(&self) -> bool {
        self.removed.lock().is_some()
    }
}

impl ListSink for Shared {
    fn descriptor_at(&self, handle: CpuDescriptorHandle) -> Option<Descriptor> {
        let (heap, address) = self.cpu_slot(handle)?;
        heap.read(address.slot)
    }

    fn debug_layer(&self) -> &DebugLayer {
        &self.debug
    }

    fn store_list(&self, ty: QueueType, commands: Vec<Command>) -> CommandListId {
        let id = CommandListId(self.next_id());
        self.closed_lists
            .lock()
            .insert(id, RecordedList { id, ty, commands });
        id
    }
}
