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

//! Texel formats understood by the renderer.

/// A texel or element format.
///
/// Typeless formats describe storage only; a view must name a typed member
/// of the same family (see [`Format::is_view_compatible`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Format {
    /// No format (buffers).
    #[default]
    Unknown,
    /// 4 x 8-bit storage, no interpretation.
    Rgba8Typeless,
    /// 4 x 8-bit unsigned normalized.
    Rgba8Unorm,
    /// 4 x 16-bit float.
    Rgba16Float,
    /// 2 x 16-bit float.
    Rg16Float,
    /// 4 x 32-bit float.
    Rgba32Float,
    /// 2 x 32-bit unsigned integer.
    Rg32Uint,
    /// 32-bit unsigned integer.
    R32Uint,
    /// 32-bit float.
    R32Float,
    /// 32-bit storage, no interpretation.
    R32Typeless,
    /// 32-bit float depth.
    D32Float,
}

impl Format {
    /// Size of one texel in bytes (`0` for [`Format::Unknown`]).
    pub const fn bytes_per_texel(self) -> u32 {
        match self {
            Format::Unknown => 0,
            Format::Rgba8Typeless
            | Format::Rgba8Unorm
            | Format::Rg16Float
            | Format::R32Uint
            | Format::R32Float
            | Format::R32Typeless
            | Format::D32Float => 4,
            Format::Rgba16Float | Format::Rg32Uint => 8,
            Format::Rgba32Float => 16,
        }
    }

    /// Number of channels a shader sees.
    pub const fn channel_count(self) -> u32 {
        match self {
            Format::Unknown => 0,
            Format::R32Uint | Format::R32Float | Format::R32Typeless | Format::D32Float => 1,
            Format::Rg16Float | Format::Rg32Uint => 2,
            Format::Rgba8Typeless
            | Format::Rgba8Unorm
            | Format::Rgba16Float
            | Format::Rgba32Float => 4,
        }
    }

    /// `true` for depth formats.
    pub const fn is_depth(self) -> bool {
        matches!(self, Format::D32Float)
    }

    /// `true` for typeless storage formats.
    pub const fn is_typeless(self) -> bool {
        matches!(self, Format::Rgba8Typeless | Format::R32Typeless)
    }

    /// `true` for integer formats that must be cleared through a UAV.
    pub const fn is_integer(self) -> bool {
        matches!(self, Format::Rg32Uint | Format::R32Uint)
    }

    /// Storage family shared by formats that may alias through views.
    const fn family(self) -> u8 {
        match self {
            Format::Rgba8Typeless | Format::Rgba8Unorm => 1,
            Format::R32Typeless | Format::R32Float | Format::R32Uint | Format::D32Float => 2,
            _ => 0,
        }
    }

    /// `true` when a view of format `view` may be created on a resource of
    /// format `self`.
    pub fn is_view_compatible(self, view: Format) -> bool {
        if view == Format::Unknown || view == self {
            return true;
        }
        let family = self.family();
        family != 0 && family == view.family() && !view.is_typeless()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texel_sizes() {
        assert_eq!(Format::Rgba8Unorm.bytes_per_texel(), 4);
        assert_eq!(Format::Rgba16Float.bytes_per_texel(), 8);
        assert_eq!(Format::Rg32Uint.bytes_per_texel(), 8);
        assert_eq!(Format::Rg16Float.bytes_per_texel(), 4);
    }

    #[test]
    fn test_view_compatibility() {
        assert!(Format::Rgba8Typeless.is_view_compatible(Format::Rgba8Unorm));
        assert!(Format::D32Float.is_view_compatible(Format::R32Float));
        assert!(!Format::Rgba8Typeless.is_view_compatible(Format::Rgba16Float));
        assert!(!Format::Rgba16Float.is_view_compatible(Format::Rg16Float));
        assert!(!Format::Rgba8Unorm.is_view_compatible(Format::Rgba8Typeless));
    }
}
