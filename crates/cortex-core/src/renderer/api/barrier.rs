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

use super::resource::{ResourceId, ResourceStates, ALL_SUBRESOURCES};

/// A resource barrier recorded into a command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceBarrier {
    /// Moves a subresource (or all of them) between access states.
    Transition {
        /// Resource being transitioned.
        resource: ResourceId,
        /// Subresource index, or [`ALL_SUBRESOURCES`].
        subresource: u32,
        /// State the subresource is currently in.
        before: ResourceStates,
        /// State the subresource moves to.
        after: ResourceStates,
    },
    /// Orders UAV accesses to the same resource across draws/dispatches.
    /// `None` orders every UAV access.
    Uav {
        /// Resource whose UAV writes must complete.
        resource: Option<ResourceId>,
    },
    /// Switches which of two memory-aliased resources is active.
    Aliasing {
        /// Resource that stops being used.
        before: Option<ResourceId>,
        /// Resource that starts being used.
        after: Option<ResourceId>,
    },
}

impl ResourceBarrier {
    /// A whole-resource transition.
    pub const fn transition(
        resource: ResourceId,
        before: ResourceStates,
        after: ResourceStates,
    ) -> Self {
        Self::Transition {
            resource,
            subresource: ALL_SUBRESOURCES,
            before,
            after,
        }
    }

    /// A UAV barrier on `resource`.
    pub const fn uav(resource: ResourceId) -> Self {
        Self::Uav {
            resource: Some(resource),
        }
    }

    /// The resource this barrier touches, if any.
    pub const fn resource(&self) -> Option<ResourceId> {
        match *self {
            Self::Transition { resource, .. } => Some(resource),
            Self::Uav { resource } => resource,
            Self::Aliasing { after, .. } => after,
        }
    }
}
