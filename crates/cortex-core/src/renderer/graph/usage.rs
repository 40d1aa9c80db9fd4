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

//! Declared resource usages and their mapping to resource states.

use crate::renderer::api::ResourceStates;

crate::cortex_bitflags! {
    /// How a pass uses a render graph resource.
    ///
    /// `RENDER_TARGET`, `UNORDERED_ACCESS`, `DEPTH_STENCIL_WRITE`, `COPY_DST`
    /// and `PRESENT` are exclusive and must be declared alone. The other
    /// usages combine freely.
    pub struct RgUsage: u32 {
        /// Sampled or loaded through an SRV from any shader stage.
        const SHADER_RESOURCE = 1 << 0;
        /// Read or written through a UAV.
        const UNORDERED_ACCESS = 1 << 1;
        /// Bound as a render target.
        const RENDER_TARGET = 1 << 2;
        /// Bound as a read-only depth target.
        const DEPTH_STENCIL_READ = 1 << 3;
        /// Bound as a writable depth target.
        const DEPTH_STENCIL_WRITE = 1 << 4;
        /// Source of a copy.
        const COPY_SRC = 1 << 5;
        /// Destination of a copy.
        const COPY_DST = 1 << 6;
        /// Indirect draw or dispatch arguments.
        const INDIRECT_ARGUMENT = 1 << 7;
        /// Handed to the presentation engine.
        const PRESENT = 1 << 8;
    }
}

impl RgUsage {
    const EXCLUSIVE: Self = Self::from_bits_retain(
        Self::RENDER_TARGET.bits()
            | Self::UNORDERED_ACCESS.bits()
            | Self::DEPTH_STENCIL_WRITE.bits()
            | Self::COPY_DST.bits()
            | Self::PRESENT.bits(),
    );

    /// `true` when the set holds an exclusive usage.
    pub const fn has_exclusive(self) -> bool {
        self.intersects(Self::EXCLUSIVE)
    }

    /// `true` when the set is non-empty and, if it holds an exclusive
    /// usage, holds nothing else.
    pub const fn is_well_formed(self) -> bool {
        !self.is_empty() && (!self.has_exclusive() || self.count() == 1)
    }

    /// The resource state a subresource must be in for this usage.
    ///
    /// Composable usages map to the union of their read states.
    pub fn required_state(self) -> ResourceStates {
        let mut state = ResourceStates::EMPTY;
        if self.contains(Self::SHADER_RESOURCE) {
            state |= ResourceStates::ALL_SHADER_RESOURCE;
        }
        if self.contains(Self::UNORDERED_ACCESS) {
            state |= ResourceStates::UNORDERED_ACCESS;
        }
        if self.contains(Self::RENDER_TARGET) {
            state |= ResourceStates::RENDER_TARGET;
        }
        if self.contains(Self::DEPTH_STENCIL_READ) {
            state |= ResourceStates::DEPTH_READ;
        }
        if self.contains(Self::DEPTH_STENCIL_WRITE) {
            state |= ResourceStates::DEPTH_WRITE;
        }
        if self.contains(Self::COPY_SRC) {
            state |= ResourceStates::COPY_SOURCE;
        }
        if self.contains(Self::COPY_DST) {
            state |= ResourceStates::COPY_DEST;
        }
        if self.contains(Self::INDIRECT_ARGUMENT) {
            state |= ResourceStates::INDIRECT_ARGUMENT;
        }
        if self.contains(Self::PRESENT) {
            state |= ResourceStates::PRESENT;
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_resource_covers_both_stages() {
        assert_eq!(
            RgUsage::SHADER_RESOURCE.required_state(),
            ResourceStates::PIXEL_SHADER_RESOURCE | ResourceStates::NON_PIXEL_SHADER_RESOURCE
        );
    }

    #[test]
    fn test_composable_usages_combine() {
        let usage = RgUsage::SHADER_RESOURCE | RgUsage::DEPTH_STENCIL_READ;
        assert!(usage.is_well_formed());
        assert_eq!(
            usage.required_state(),
            ResourceStates::ALL_SHADER_RESOURCE | ResourceStates::DEPTH_READ
        );
    }

    #[test]
    fn test_exclusive_usages_stand_alone() {
        assert!(RgUsage::RENDER_TARGET.is_well_formed());
        assert!(!(RgUsage::RENDER_TARGET | RgUsage::SHADER_RESOURCE).is_well_formed());
        assert!(!(RgUsage::UNORDERED_ACCESS | RgUsage::COPY_SRC).is_well_formed());
        assert!(!RgUsage::EMPTY.is_well_formed());
        assert_eq!(RgUsage::PRESENT.required_state(), ResourceStates::PRESENT);
    }
}
