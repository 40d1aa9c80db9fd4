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

//! Conversions from the renderer's API types to their `wgpu` counterparts.

use cortex_core::renderer::api::{
    AddressMode, CompareFunc, CullMode, Filter, Format, IndexFormat, ResourceFlags,
    StaticSampler, VertexFormat,
};

/// A local extension trait to convert the renderer's types into `wgpu` types.
/// This avoids Rust's orphan rules while keeping an idiomatic `.into_wgpu()` syntax.
pub trait IntoWgpu<T> {
    /// Consumes self and converts it into a `wgpu` type.
    fn into_wgpu(self) -> T;
}

/// View formats. Typeless formats map to the view the renderer always uses
/// them through; `Unknown` has no equivalent.
impl IntoWgpu<Option<wgpu::TextureFormat>> for Format {
    fn into_wgpu(self) -> Option<wgpu::TextureFormat> {
        Some(match self {
            Format::Unknown => return None,
            Format::Rgba8Typeless | Format::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            Format::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            Format::Rg16Float => wgpu::TextureFormat::Rg16Float,
            Format::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            Format::Rg32Uint => wgpu::TextureFormat::Rg32Uint,
            Format::R32Uint => wgpu::TextureFormat::R32Uint,
            Format::R32Float | Format::R32Typeless => wgpu::TextureFormat::R32Float,
            Format::D32Float => wgpu::TextureFormat::Depth32Float,
        })
    }
}

/// The format a texture is allocated with. 32-bit typeless storage of a
/// depth-stencil resource is a depth texture sampled through its depth aspect.
pub(crate) fn storage_format(format: Format, flags: ResourceFlags) -> Option<wgpu::TextureFormat> {
    match format {
        Format::R32Typeless if flags.contains(ResourceFlags::ALLOW_DEPTH_STENCIL) => {
            Some(wgpu::TextureFormat::Depth32Float)
        }
        _ => format.into_wgpu(),
    }
}

/// Whether `format` can sit in the bindless texture array, which is declared
/// as filterable float.
pub(crate) fn is_filterable_color(format: wgpu::TextureFormat) -> bool {
    matches!(
        format,
        wgpu::TextureFormat::Rgba8Unorm
            | wgpu::TextureFormat::Rgba16Float
            | wgpu::TextureFormat::Rg16Float
    )
}

impl IntoWgpu<wgpu::CompareFunction> for CompareFunc {
    fn into_wgpu(self) -> wgpu::CompareFunction {
        match self {
            CompareFunc::Never => wgpu::CompareFunction::Never,
            CompareFunc::Less => wgpu::CompareFunction::Less,
            CompareFunc::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunc::Greater => wgpu::CompareFunction::Greater,
            CompareFunc::Always => wgpu::CompareFunction::Always,
        }
    }
}

impl IntoWgpu<Option<wgpu::Face>> for CullMode {
    fn into_wgpu(self) -> Option<wgpu::Face> {
        match self {
            CullMode::None => None,
            CullMode::Front => Some(wgpu::Face::Front),
            CullMode::Back => Some(wgpu::Face::Back),
        }
    }
}

impl IntoWgpu<wgpu::VertexFormat> for VertexFormat {
    fn into_wgpu(self) -> wgpu::VertexFormat {
        match self {
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        }
    }
}

impl IntoWgpu<wgpu::IndexFormat> for IndexFormat {
    fn into_wgpu(self) -> wgpu::IndexFormat {
        match self {
            IndexFormat::U16 => wgpu::IndexFormat::Uint16,
            IndexFormat::U32 => wgpu::IndexFormat::Uint32,
        }
    }
}

impl IntoWgpu<wgpu::FilterMode> for Filter {
    fn into_wgpu(self) -> wgpu::FilterMode {
        match self {
            Filter::Point => wgpu::FilterMode::Nearest,
            Filter::Linear => wgpu::FilterMode::Linear,
        }
    }
}

impl IntoWgpu<wgpu::MipmapFilterMode> for Filter {
    fn into_wgpu(self) -> wgpu::MipmapFilterMode {
        match self {
            Filter::Point => wgpu::MipmapFilterMode::Nearest,
            Filter::Linear => wgpu::MipmapFilterMode::Linear,
        }
    }
}

impl IntoWgpu<wgpu::AddressMode> for AddressMode {
    fn into_wgpu(self) -> wgpu::AddressMode {
        match self {
            AddressMode::Wrap => wgpu::AddressMode::Repeat,
            AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
        }
    }
}

/// The binding type a static sampler is declared with in WGSL.
impl IntoWgpu<wgpu::SamplerBindingType> for StaticSampler {
    fn into_wgpu(self) -> wgpu::SamplerBindingType {
        match (self.comparison, self.filter) {
            (Some(_), _) => wgpu::SamplerBindingType::Comparison,
            (None, Filter::Linear) => wgpu::SamplerBindingType::Filtering,
            (None, Filter::Point) => wgpu::SamplerBindingType::NonFiltering,
        }
    }
}

impl<'a> IntoWgpu<wgpu::SamplerDescriptor<'a>> for StaticSampler {
    fn into_wgpu(self) -> wgpu::SamplerDescriptor<'a> {
        let address: wgpu::AddressMode = self.address.into_wgpu();
        wgpu::SamplerDescriptor {
            label: Some("Static sampler"),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: self.filter.into_wgpu(),
            min_filter: self.filter.into_wgpu(),
            mipmap_filter: self.filter.into_wgpu(),
            compare: self.comparison.map(|f| f.into_wgpu()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typeless_formats_map_to_their_views() {
        assert_eq!(
            Format::Rgba8Typeless.into_wgpu(),
            Some(wgpu::TextureFormat::Rgba8Unorm)
        );
        let none: Option<wgpu::TextureFormat> = Format::Unknown.into_wgpu();
        assert_eq!(none, None);
        assert_eq!(
            storage_format(Format::R32Typeless, ResourceFlags::ALLOW_DEPTH_STENCIL),
            Some(wgpu::TextureFormat::Depth32Float)
        );
        assert_eq!(
            storage_format(Format::R32Typeless, ResourceFlags::EMPTY),
            Some(wgpu::TextureFormat::R32Float)
        );
    }

    #[test]
    fn test_cull_mode_conversion() {
        let none: Option<wgpu::Face> = CullMode::None.into_wgpu();
        assert_eq!(none, None);
        assert_eq!(CullMode::Back.into_wgpu(), Some(wgpu::Face::Back));
    }

    #[test]
    fn test_static_sampler_conversion() {
        let shadow = StaticSampler {
            register: 1,
            filter: Filter::Point,
            address: AddressMode::Clamp,
            comparison: Some(CompareFunc::LessEqual),
        };
        let desc: wgpu::SamplerDescriptor<'_> = shadow.into_wgpu();
        assert_eq!(desc.compare, Some(wgpu::CompareFunction::LessEqual));
        assert_eq!(desc.address_mode_u, wgpu::AddressMode::ClampToEdge);
        let ty: wgpu::SamplerBindingType = shadow.into_wgpu();
        assert_eq!(ty, wgpu::SamplerBindingType::Comparison);
        let wrap: wgpu::SamplerBindingType = StaticSampler::linear_wrap(0).into_wgpu();
        assert_eq!(wrap, wgpu::SamplerBindingType::Filtering);
    }

    #[test]
    fn test_only_filterable_color_formats_are_bindless() {
        assert!(is_filterable_color(wgpu::TextureFormat::Rgba8Unorm));
        assert!(!is_filterable_color(wgpu::TextureFormat::Depth32Float));
        assert!(!is_filterable_color(wgpu::TextureFormat::Rg32Uint));
        assert!(!is_filterable_color(wgpu::TextureFormat::Rgba32Float));
    }
}
