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

//! The pool of transient resources reused across frames.

use crate::renderer::api::{
    ClearValue, HeapType, ResourceDesc, ResourceFlags, ResourceId, ResourceStates,
};
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GpuDevice;

#[derive(Debug)]
struct PoolEntry {
    desc: ResourceDesc,
    resource: ResourceId,
    /// Per-subresource state the resource was left in.
    states: Vec<ResourceStates>,
    idle_frames: u32,
    leased: bool,
}

/// Owns the committed resources behind transient graph handles.
///
/// A lease requires an exact description match. Free entries that stay
/// unused for more than `max_idle_frames` frames are destroyed.
#[derive(Debug)]
pub(crate) struct TransientPool {
    entries: Vec<PoolEntry>,
    max_idle_frames: u32,
    pub(crate) hits: u32,
    pub(crate) misses: u32,
}

/// The clear value a freshly created transient is optimized for.
fn clear_value_for(desc: &ResourceDesc) -> Option<ClearValue> {
    if desc.flags.contains(ResourceFlags::ALLOW_RENDER_TARGET) {
        Some(ClearValue::Color {
            format: desc.format,
            color: [0.0, 0.0, 0.0, 1.0],
        })
    } else if desc.flags.contains(ResourceFlags::ALLOW_DEPTH_STENCIL) {
        Some(ClearValue::DepthStencil {
            format: desc.format,
            depth: 1.0,
            stencil: 0,
        })
    } else {
        None
    }
}

impl TransientPool {
    pub(crate) fn new(max_idle_frames: u32) -> Self {
        Self {
            entries: Vec::new(),
            max_idle_frames,
            hits: 0,
            misses: 0,
        }
    }

    /// Leases a resource matching `desc`, creating one on a miss. Returns the
    /// resource and the per-subresource state it is currently in.
    pub(crate) fn acquire(
        &mut self,
        device: &dyn GpuDevice,
        desc: &ResourceDesc,
        name: &str,
    ) -> Result<(ResourceId, Vec<ResourceStates>), ResourceError> {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| !entry.leased && entry.desc == *desc)
        {
            entry.leased = true;
            entry.idle_frames = 0;
            self.hits += 1;
            return Ok((entry.resource, entry.states.clone()));
        }

        self.misses += 1;
        let resource = device.create_committed_resource(
            HeapType::Default,
            desc,
            ResourceStates::COMMON,
            clear_value_for(desc),
            name,
        )?;
        log::debug!("Render graph created transient '{name}' ({resource:?})");
        let states = vec![ResourceStates::COMMON; desc.subresource_count() as usize];
        self.entries.push(PoolEntry {
            desc: *desc,
            resource,
            states: states.clone(),
            idle_frames: 0,
            leased: true,
        });
        Ok((resource, states))
    }

    /// Returns a leased resource along with the states the frame left it in.
    pub(crate) fn give_back(&mut self, resource: ResourceId, states: &[ResourceStates]) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.resource == resource) {
            entry.leased = false;
            entry.idle_frames = 0;
            entry.states.clear();
            entry.states.extend_from_slice(states);
        }
    }

    /// Ages free entries by one frame and destroys those idle for too long.
    /// Returns how many were evicted.
    pub(crate) fn age(&mut self, device: &dyn GpuDevice) -> usize {
        let max_idle = self.max_idle_frames;
        let mut evicted = 0;
        self.entries.retain_mut(|entry| {
            if entry.leased {
                return true;
            }
            entry.idle_frames += 1;
            if entry.idle_frames <= max_idle {
                return true;
            }
            log::warn!(
                "Evicting transient {:?} ({}x{} {:?}) after {} idle frames",
                entry.resource,
                entry.desc.width,
                entry.desc.height,
                entry.desc.format,
                max_idle
            );
            if let Err(err) = device.destroy_resource(entry.resource) {
                log::warn!("Failed to destroy evicted transient: {err}");
            }
            evicted += 1;
            false
        });
        evicted
    }

    /// Resets the per-frame hit and miss counters.
    pub(crate) fn reset_counters(&mut self) {
        self.hits = 0;
        self.misses = 0;
    }

    /// Destroys every entry, leased or not.
    pub(crate) fn clear(&mut self, device: &dyn GpuDevice) {
        for entry in self.entries.drain(..) {
            if let Err(err) = device.destroy_resource(entry.resource) {
                log::warn!("Failed to destroy transient {:?}: {err}", entry.resource);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn free_len(&self) -> usize {
        self.entries.iter().filter(|e| !e.leased).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::Format;
    use crate::renderer::mock::MockDevice;

    fn target(width: u32) -> ResourceDesc {
        ResourceDesc::texture_2d(width, 64, Format::Rgba16Float)
            .with_flags(ResourceFlags::ALLOW_RENDER_TARGET)
    }

    #[test]
    fn test_exact_match_reuses_resource() {
        let device = MockDevice::new();
        let mut pool = TransientPool::new(8);
        let (first, _) = pool.acquire(device.as_ref(), &target(64), "a").unwrap();
        pool.give_back(first, &[ResourceStates::RENDER_TARGET]);
        let (second, states) = pool.acquire(device.as_ref(), &target(64), "b").unwrap();
        assert_eq!(first, second);
        assert_eq!(states, vec![ResourceStates::RENDER_TARGET]);
        let (third, _) = pool.acquire(device.as_ref(), &target(128), "c").unwrap();
        assert_ne!(second, third);
        assert_eq!((pool.hits, pool.misses), (1, 2));
    }

    #[test]
    fn test_idle_entries_are_evicted() {
        let device = MockDevice::new();
        let mut pool = TransientPool::new(2);
        let (resource, _) = pool.acquire(device.as_ref(), &target(64), "a").unwrap();
        pool.give_back(resource, &[ResourceStates::COMMON]);
        assert_eq!(pool.age(device.as_ref()), 0);
        assert_eq!(pool.age(device.as_ref()), 0);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.age(device.as_ref()), 1);
        assert_eq!(pool.len(), 0);
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn test_clear_values_match_pass_clears() {
        assert_eq!(
            clear_value_for(&target(64)),
            Some(ClearValue::Color {
                format: Format::Rgba16Float,
                color: [0.0, 0.0, 0.0, 1.0],
            })
        );
        let depth = ResourceDesc::texture_2d(64, 64, Format::D32Float)
            .with_flags(ResourceFlags::ALLOW_DEPTH_STENCIL);
        assert!(matches!(
            clear_value_for(&depth),
            Some(ClearValue::DepthStencil { depth, .. }) if depth == 1.0
        ));
        assert_eq!(clear_value_for(&ResourceDesc::buffer(64)), None);
    }

    #[test]
    fn test_leased_entries_never_age() {
        let device = MockDevice::new();
        let mut pool = TransientPool::new(0);
        pool.acquire(device.as_ref(), &target(64), "a").unwrap();
        assert_eq!(pool.age(device.as_ref()), 0);
        assert_eq!(pool.free_len(), 0);
        pool.clear(device.as_ref());
        assert_eq!(device.live_resources(), 0);
    }
}
