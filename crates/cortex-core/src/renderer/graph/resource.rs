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

//! Graph resource handles and the per-frame resource table.

use std::fmt;

use crate::renderer::api::{ResourceDesc, ResourceId, ResourceStates};
use crate::renderer::error::GraphError;

const INDEX_BITS: u32 = 20;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: u32 = (1 << (32 - INDEX_BITS)) - 1;

/// An opaque handle to a resource of one frame's render graph.
///
/// The low 20 bits index the frame's resource table and the high 12 bits
/// carry the frame generation, so handles kept across `begin_frame` are
/// rejected instead of silently aliasing a new resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RgHandle(u32);

impl RgHandle {
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        Self(((generation & GENERATION_MASK) << INDEX_BITS) | (index as u32 & INDEX_MASK))
    }

    /// The raw 32-bit value.
    pub fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        (self.0 & INDEX_MASK) as usize
    }

    pub(crate) fn generation(self) -> u32 {
        self.0 >> INDEX_BITS
    }
}

impl fmt::Debug for RgHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RgHandle({}@{})", self.index(), self.generation())
    }
}

/// Where a graph resource comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Owned outside the graph and carried across frames by the caller.
    Imported,
    /// Leased from the transient pool at compile time.
    Transient,
}

/// One entry of the frame's resource table.
#[derive(Debug)]
pub(crate) struct RgResource {
    pub(crate) name: String,
    pub(crate) desc: ResourceDesc,
    pub(crate) origin: Origin,
    /// `None` until a transient is realized.
    pub(crate) physical: Option<ResourceId>,
    /// Per-subresource state at the start of the frame.
    pub(crate) initial: Vec<ResourceStates>,
    /// Per-subresource state, tracked through compilation.
    pub(crate) states: Vec<ResourceStates>,
    /// Per-subresource flag: the last declared access wrote the subresource.
    pub(crate) last_write: Vec<bool>,
    /// Transient realization failed; every pass touching it is skipped.
    pub(crate) failed: bool,
}

impl RgResource {
    pub(crate) fn imported(
        name: String,
        desc: ResourceDesc,
        resource: ResourceId,
        states: Vec<ResourceStates>,
    ) -> Self {
        let count = states.len();
        Self {
            name,
            desc,
            origin: Origin::Imported,
            physical: Some(resource),
            initial: states.clone(),
            states,
            last_write: vec![false; count],
            failed: false,
        }
    }

    pub(crate) fn transient(name: String, desc: ResourceDesc) -> Self {
        let count = desc.subresource_count() as usize;
        Self {
            name,
            desc,
            origin: Origin::Transient,
            physical: None,
            initial: vec![ResourceStates::COMMON; count],
            states: vec![ResourceStates::COMMON; count],
            last_write: vec![false; count],
            failed: false,
        }
    }

    /// Binds a leased device resource and the states it currently has.
    pub(crate) fn realize(&mut self, resource: ResourceId, states: Vec<ResourceStates>) {
        self.physical = Some(resource);
        self.initial.clone_from(&states);
        self.states = states;
    }

    pub(crate) fn subresource_count(&self) -> u32 {
        self.states.len() as u32
    }
}

/// The frame's resource table, indexed by [`RgHandle`].
#[derive(Debug, Default)]
pub(crate) struct ResourceTable {
    pub(crate) generation: u32,
    pub(crate) entries: Vec<RgResource>,
}

impl ResourceTable {
    pub(crate) fn push(&mut self, resource: RgResource) -> RgHandle {
        let handle = RgHandle::new(self.entries.len(), self.generation);
        self.entries.push(resource);
        handle
    }

    pub(crate) fn check(&self, handle: RgHandle) -> Result<usize, GraphError> {
        if handle.generation() != self.generation & GENERATION_MASK {
            return Err(GraphError::StaleHandle {
                handle: handle.raw(),
            });
        }
        let index = handle.index();
        if index >= self.entries.len() {
            return Err(GraphError::InvalidHandle {
                handle: handle.raw(),
            });
        }
        Ok(index)
    }

    pub(crate) fn get(&self, handle: RgHandle) -> Result<&RgResource, GraphError> {
        let index = self.check(handle)?;
        Ok(&self.entries[index])
    }

    /// Starts a new frame: bumps the generation and drops every entry.
    pub(crate) fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1) & GENERATION_MASK;
        self.entries.clear();
    }

    pub(crate) fn handle_of(&self, index: usize) -> RgHandle {
        RgHandle::new(index, self.generation)
    }
}

/// Resolves graph handles to device resources while a pass executes.
pub struct RgResolver<'a> {
    pub(crate) table: &'a ResourceTable,
}

impl RgResolver<'_> {
    /// The device resource behind `handle`.
    pub fn resource(&self, handle: RgHandle) -> Result<ResourceId, GraphError> {
        self.table
            .get(handle)?
            .physical
            .ok_or(GraphError::InvalidHandle {
                handle: handle.raw(),
            })
    }

    /// The description of the resource behind `handle`.
    pub fn desc(&self, handle: RgHandle) -> Result<ResourceDesc, GraphError> {
        Ok(self.table.get(handle)?.desc)
    }

    /// The debug name given at creation or import.
    pub fn name(&self, handle: RgHandle) -> Result<&str, GraphError> {
        Ok(self.table.get(handle)?.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::Format;

    #[test]
    fn test_handle_packs_index_and_generation() {
        let handle = RgHandle::new(1234, 7);
        assert_eq!(handle.index(), 1234);
        assert_eq!(handle.generation(), 7);
        assert_eq!(RgHandle::new(0, GENERATION_MASK + 3).generation(), 2);
    }

    #[test]
    fn test_stale_handles_are_rejected() {
        let mut table = ResourceTable::default();
        let desc = ResourceDesc::texture_2d(4, 4, Format::Rgba8Unorm);
        let old = table.push(RgResource::transient("old".into(), desc));
        table.reset();
        let new = table.push(RgResource::transient("new".into(), desc));
        assert_eq!(old.index(), new.index());
        assert_eq!(
            table.check(old).unwrap_err(),
            GraphError::StaleHandle { handle: old.raw() }
        );
        assert_eq!(table.check(new).unwrap(), 0);
        let missing = RgHandle::new(5, table.generation);
        assert!(matches!(table.check(missing), Err(GraphError::InvalidHandle { .. })));
    }
}
