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

//! PBR materials and their GPU form.

use super::gpu_types::{
    VBMaterialConstants, MATERIAL_TEXTURE_COUNT, TEX_BASE_COLOR, TEX_METALLIC_ROUGHNESS,
    TEX_NORMAL,
};
use crate::math::Vec3;
use crate::renderer::bindless::{Placeholder, INVALID_BINDLESS_INDEX};

/// How a material's alpha is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaMode {
    /// Alpha is ignored.
    #[default]
    Opaque,
    /// Fragments with alpha below the cutoff are discarded.
    Mask,
    /// Alpha-blended. Not drawn by the visibility pipeline.
    Blend,
}

impl AlphaMode {
    /// The code stored in the material table.
    pub const fn code(self) -> u32 {
        match self {
            AlphaMode::Opaque => 0,
            AlphaMode::Mask => 1,
            AlphaMode::Blend => 2,
        }
    }
}

/// Bindless indices of a material's textures, `None` when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaterialTextures {
    /// sRGB base color and alpha.
    pub base_color: Option<u32>,
    /// Tangent-space normal map.
    pub normal: Option<u32>,
    /// Roughness (G) and metallic (B).
    pub metallic_roughness: Option<u32>,
    /// Emissive color.
    pub emissive: Option<u32>,
    /// Ambient occlusion (R).
    pub occlusion: Option<u32>,
    /// Clearcoat intensity (R).
    pub clearcoat: Option<u32>,
    /// Transmission (R).
    pub transmission: Option<u32>,
}

impl MaterialTextures {
    /// Resolves every slot to an index, substituting placeholders for the
    /// three semantics that have one.
    pub fn resolve(&self) -> [u32; MATERIAL_TEXTURE_COUNT] {
        let slots = [
            self.base_color,
            self.normal,
            self.metallic_roughness,
            self.emissive,
            self.occlusion,
            self.clearcoat,
            self.transmission,
        ];
        let mut out = [INVALID_BINDLESS_INDEX; MATERIAL_TEXTURE_COUNT];
        for (slot, (dst, index)) in out.iter_mut().zip(slots).enumerate() {
            *dst = index.unwrap_or_else(|| fallback(slot));
        }
        out
    }
}

fn fallback(slot: usize) -> u32 {
    match slot {
        TEX_BASE_COLOR => Placeholder::White.index(),
        TEX_NORMAL => Placeholder::FlatNormal.index(),
        TEX_METALLIC_ROUGHNESS => Placeholder::HalfRoughness.index(),
        _ => INVALID_BINDLESS_INDEX,
    }
}

/// A metallic-roughness material with the clearcoat, specular and
/// transmission extensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Linear base color.
    pub base_color: [f32; 4],
    /// Emissive radiance.
    pub emissive: Vec3,
    /// Metallic factor.
    pub metallic: f32,
    /// Perceptual roughness.
    pub roughness: f32,
    /// Specular factor (dielectric F0 scale).
    pub specular: f32,
    /// Index of refraction.
    pub ior: f32,
    /// Clearcoat intensity.
    pub clearcoat: f32,
    /// Clearcoat roughness.
    pub clearcoat_roughness: f32,
    /// Diffuse transmission factor.
    pub transmission: f32,
    /// Specular tint.
    pub specular_color: Vec3,
    /// Alpha-test threshold for [`AlphaMode::Mask`].
    pub alpha_cutoff: f32,
    /// Whether back faces are shaded.
    pub double_sided: bool,
    /// Alpha interpretation.
    pub alpha_mode: AlphaMode,
    /// Textures.
    pub textures: MaterialTextures,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: [1.0; 4],
            emissive: Vec3::ZERO,
            metallic: 0.0,
            roughness: 0.5,
            specular: 0.5,
            ior: 1.5,
            clearcoat: 0.0,
            clearcoat_roughness: 0.0,
            transmission: 0.0,
            specular_color: Vec3::ONE,
            alpha_cutoff: 0.5,
            double_sided: false,
            alpha_mode: AlphaMode::Opaque,
            textures: MaterialTextures::default(),
        }
    }
}

impl Material {
    /// `true` when the visibility pass uses the alpha-test pipelines.
    pub fn is_alpha_tested(&self) -> bool {
        self.alpha_mode == AlphaMode::Mask
    }

    /// Packs the material into its table entry.
    pub fn to_gpu(&self) -> VBMaterialConstants {
        VBMaterialConstants {
            base_color: self.base_color,
            emissive_metallic: [self.emissive.x, self.emissive.y, self.emissive.z, self.metallic],
            roughness_specular_ior_clearcoat: [
                self.roughness,
                self.specular,
                self.ior,
                self.clearcoat,
            ],
            clearcoat_roughness_transmission_cutoff_mode: [
                self.clearcoat_roughness,
                self.transmission,
                self.alpha_cutoff,
                self.alpha_mode.code() as f32,
            ],
            specular_color_double_sided: [
                self.specular_color.x,
                self.specular_color.y,
                self.specular_color.z,
                if self.double_sided { 1.0 } else { 0.0 },
            ],
            tex_idx: self.textures.resolve(),
            _pad: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::scene::gpu_types::{TEX_EMISSIVE, TEX_OCCLUSION};

    #[test]
    fn test_missing_textures_fall_back_per_semantic() {
        let gpu = Material::default().to_gpu();
        assert_eq!(gpu.tex_idx[TEX_BASE_COLOR], Placeholder::White.index());
        assert_eq!(gpu.tex_idx[TEX_NORMAL], Placeholder::FlatNormal.index());
        assert_eq!(
            gpu.tex_idx[TEX_METALLIC_ROUGHNESS],
            Placeholder::HalfRoughness.index()
        );
        assert_eq!(gpu.tex_idx[TEX_EMISSIVE], INVALID_BINDLESS_INDEX);
        assert_eq!(gpu.tex_idx[TEX_OCCLUSION], INVALID_BINDLESS_INDEX);
    }

    #[test]
    fn test_present_textures_are_kept() {
        let material = Material {
            alpha_mode: AlphaMode::Mask,
            alpha_cutoff: 0.3,
            textures: MaterialTextures {
                base_color: Some(17),
                occlusion: Some(42),
                ..Default::default()
            },
            ..Default::default()
        };
        let gpu = material.to_gpu();
        assert_eq!(gpu.tex_idx[TEX_BASE_COLOR], 17);
        assert_eq!(gpu.tex_idx[TEX_OCCLUSION], 42);
        assert_eq!(gpu.alpha_mode(), 1);
        assert_eq!(gpu.alpha_cutoff(), 0.3);
        assert!(material.is_alpha_tested());
    }
}
