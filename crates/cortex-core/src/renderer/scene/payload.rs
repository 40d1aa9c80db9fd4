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

//! The two-word payload the visibility pass writes per pixel.

/// Value of both payload words where no triangle was rasterized.
pub const BACKGROUND: u32 = 0xFFFF_FFFF;

/// Bits of the first word holding the triangle index.
pub const TRIANGLE_BITS: u32 = 24;

/// Largest triangle index a draw can address.
pub const MAX_TRIANGLE_INDEX: u32 = (1 << TRIANGLE_BITS) - 1;

/// Largest draw index a frame can address.
pub const MAX_DRAW_INDEX: u32 = (1 << (32 - TRIANGLE_BITS)) - 1;

/// A decoded visibility payload.
///
/// The triangle index is relative to the draw's first index, so the mesh
/// entry and the instance's index range locate the three vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisibilityPayload {
    /// Triangle within the draw.
    pub triangle: u32,
    /// Draw within the frame.
    pub draw: u32,
    /// Index into the instance table.
    pub instance: u32,
}

impl VisibilityPayload {
    /// Encodes the payload as `(triangle | draw << 24, instance)`.
    pub fn pack(self) -> [u32; 2] {
        debug_assert!(self.triangle <= MAX_TRIANGLE_INDEX);
        debug_assert!(self.draw <= MAX_DRAW_INDEX);
        [
            (self.triangle & MAX_TRIANGLE_INDEX) | (self.draw << TRIANGLE_BITS),
            self.instance,
        ]
    }

    /// Decodes a payload, or `None` for background pixels.
    pub fn unpack(words: [u32; 2]) -> Option<Self> {
        if words[1] == BACKGROUND {
            return None;
        }
        Some(Self {
            triangle: words[0] & MAX_TRIANGLE_INDEX,
            draw: words[0] >> TRIANGLE_BITS,
            instance: words[1],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_layout() {
        let payload = VisibilityPayload {
            triangle: 0x12_3456,
            draw: 0xAB,
            instance: 42,
        };
        assert_eq!(payload.pack(), [0xAB12_3456, 42]);
        assert_eq!(VisibilityPayload::unpack(payload.pack()), Some(payload));
    }

    #[test]
    fn test_limits_survive() {
        let payload = VisibilityPayload {
            triangle: MAX_TRIANGLE_INDEX,
            draw: MAX_DRAW_INDEX,
            instance: 0,
        };
        assert_eq!(VisibilityPayload::unpack(payload.pack()), Some(payload));
    }

    #[test]
    fn test_background_sentinel() {
        assert_eq!(VisibilityPayload::unpack([BACKGROUND, BACKGROUND]), None);
    }
}
