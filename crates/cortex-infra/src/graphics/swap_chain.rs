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

use cortex_core::renderer::api::{Format, QueueId, ResourceId, SwapChainDesc};

/// Back buffers of a swap chain and the index of the one being rendered.
///
/// Swap chains are headless. Presenting validates the back buffer state on
/// the present queue and rotates to the next buffer.
#[derive(Debug)]
pub(crate) struct SwapChain {
    queue: QueueId,
    desc: SwapChainDesc,
    buffers: Vec<ResourceId>,
    current: u32,
}

impl SwapChain {
    pub const FORMAT: Format = Format::Rgba8Unorm;

    pub fn new(queue: QueueId, desc: SwapChainDesc, buffers: Vec<ResourceId>) -> Self {
        Self {
            queue,
            desc,
            buffers,
            current: 0,
        }
    }

    pub fn queue(&self) -> QueueId {
        self.queue
    }

    pub fn desc(&self) -> SwapChainDesc {
        self.desc
    }

    pub fn buffer(&self, index: u32) -> Option<ResourceId> {
        self.buffers.get(index as usize).copied()
    }

    pub fn current_index(&self) -> u32 {
        self.current
    }

    /// Returns the buffer being presented and moves to the next one.
    pub fn advance(&mut self) -> ResourceId {
        let presented = self.buffers[self.current as usize];
        self.current = (self.current + 1) % self.buffers.len() as u32;
        presented
    }

    /// Swaps in resized buffers, returning the old ones for destruction.
    pub fn replace(&mut self, desc: SwapChainDesc, buffers: Vec<ResourceId>) -> Vec<ResourceId> {
        self.desc = desc;
        self.current = 0;
        std::mem::replace(&mut self.buffers, buffers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_rotates_buffers() {
        let desc = SwapChainDesc {
            width: 4,
            height: 4,
            buffer_count: 2,
        };
        let mut chain = SwapChain::new(QueueId(1), desc, vec![ResourceId(10), ResourceId(11)]);
        assert_eq!(chain.advance(), ResourceId(10));
        assert_eq!(chain.current_index(), 1);
        assert_eq!(chain.advance(), ResourceId(11));
        assert_eq!(chain.current_index(), 0);
        let old = chain.replace(desc, vec![ResourceId(20), ResourceId(21)]);
        assert_eq!(old, vec![ResourceId(10), ResourceId(11)]);
        assert_eq!(chain.buffer(1), Some(ResourceId(21)));
    }
}
