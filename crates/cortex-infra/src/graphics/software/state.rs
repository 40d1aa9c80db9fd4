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

//! State shared by the device front end, command lists and queue workers.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cortex_core::renderer::api::{
    CommandListId, CpuDescriptorHandle, DescriptorHeapId, DeviceOptions, FenceId,
    GpuDescriptorHandle, GpuVirtualAddress, PipelineId, QueueType, ResourceId,
    RootSignatureDesc, RootSignatureId,
};
use cortex_core::utils::align_up;
use parking_lot::{Mutex, RwLock};

use crate::graphics::descriptors::{
    decode_cpu, decode_gpu, Descriptor, DescriptorHeap, SlotAddress,
};
use crate::graphics::debug::DebugLayer;
use crate::graphics::recording::{Command, ListSink, RecordedList};

use super::memory::Resource;
use super::pipeline::Pipeline;
use super::queue::Fence;

/// Markers kept for the post-mortem trail.
const BREADCRUMB_CAPACITY: usize = 64;
/// Buffers are placed on 64 KiB boundaries of the virtual address space.
const ADDRESS_ALIGNMENT: u64 = 64 * 1024;
const ADDRESS_BASE: u64 = 0x1_0000_0000;

#[derive(Debug)]
pub(crate) struct Shared {
    pub debug: DebugLayer,
    pub breadcrumbs_enabled: bool,
    pub resources: RwLock<HashMap<ResourceId, Arc<Resource>>>,
    addresses: RwLock<BTreeMap<GpuVirtualAddress, ResourceId>>,
    pub heaps: RwLock<HashMap<DescriptorHeapId, Arc<DescriptorHeap>>>,
    pub root_signatures: RwLock<HashMap<RootSignatureId, Arc<RootSignatureDesc>>>,
    pub pipelines: RwLock<HashMap<PipelineId, Arc<Pipeline>>>,
    pub fences: RwLock<HashMap<FenceId, Arc<Fence>>>,
    pub closed_lists: Mutex<HashMap<CommandListId, RecordedList>>,
    breadcrumbs: Mutex<VecDeque<String>>,
    removed: Mutex<Option<String>>,
    next_id: AtomicU64,
    next_address: AtomicU64,
}

impl Shared {
    pub fn new(options: DeviceOptions) -> Self {
        Self {
            debug: DebugLayer::new(options.validation),
            breadcrumbs_enabled: options.breadcrumbs,
            resources: RwLock::new(HashMap::new()),
            addresses: RwLock::new(BTreeMap::new()),
            heaps: RwLock::new(HashMap::new()),
            root_signatures: RwLock::new(HashMap::new()),
            pipelines: RwLock::new(HashMap::new()),
            fences: RwLock::new(HashMap::new()),
            closed_lists: Mutex::new(HashMap::new()),
            breadcrumbs: Mutex::new(VecDeque::with_capacity(BREADCRUMB_CAPACITY)),
            removed: Mutex::new(None),
            next_id: AtomicU64::new(1),
            next_address: AtomicU64::new(ADDRESS_BASE),
        }
    }

    /// A fresh id, unique across every object kind of the device.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Reserves a virtual address range for a buffer of `size` bytes.
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

    /// Finds the buffer containing `address` and the offset into it.
    pub fn resolve_address(&self, address: GpuVirtualAddress) -> Option<(Arc<Resource>, usize)> {
        let id = {
            let addresses = self.addresses.read();
            let (_, id) = addresses.range(..=address).next_back()?;
            *id
        };
        let resource = self.resource(id)?;
        let offset = (address - resource.address) as usize;
        (offset < resource.size).then_some((resource, offset))
    }

    pub fn heap(&self, id: DescriptorHeapId) -> Option<Arc<DescriptorHeap>> {
        self.heaps.read().get(&id).cloned()
    }

    /// The heap and slot a CPU handle points at.
    pub fn cpu_slot(
        &self,
        handle: CpuDescriptorHandle,
    ) -> Option<(Arc<DescriptorHeap>, SlotAddress)> {
        let address = decode_cpu(handle)?;
        Some((self.heap(address.heap)?, address))
    }

    /// The descriptor written at a CPU handle.
    pub fn cpu_descriptor(&self, handle: CpuDescriptorHandle) -> Option<Descriptor> {
        let (heap, address) = self.cpu_slot(handle)?;
        heap.read(address.slot)
    }

    /// The heap and slot a GPU handle points at.
    pub fn gpu_slot(&self, handle: GpuDescriptorHandle) -> Option<SlotAddress> {
        decode_gpu(handle)
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

    /// Appends an executed marker to the trail when breadcrumbs are on.
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

    /// Marks the device as removed and wakes every fence waiter. The first
    /// reason wins.
    pub fn remove_device(&self, reason: String) {
        {
            let mut removed = self.removed.lock();
            if removed.is_some() {
                return;
            }
            log::error!("Software device removed: {reason}");
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
        self.cpu_descriptor(handle)
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
