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

//! GPU-visible records shared by the CPU tables and the shaders.
//!
//! Every struct is `#[repr(C)]`, free of implicit padding and sized to a
//! multiple of 16 bytes, so it can be copied verbatim into a structured or
//! constant buffer.

use crate::math::{Mat4, Vec2, Vec3, Vec4};
use crate::renderer::bindless::INVALID_BINDLESS_INDEX;

/// Instance flag: the material is alpha-tested.
pub const INSTANCE_FLAG_ALPHA_TEST: u32 = 1 << 0;
/// Instance flag: back faces are not culled.
pub const INSTANCE_FLAG_DOUBLE_SIDED: u32 = 1 << 1;

/// Material texture slot: base color.
pub const TEX_BASE_COLOR: usize = 0;
/// Material texture slot: tangent-space normal map.
pub const TEX_NORMAL: usize = 1;
/// Material texture slot: metallic (B) and roughness (G).
pub const TEX_METALLIC_ROUGHNESS: usize = 2;
/// Material texture slot: emissive color.
pub const TEX_EMISSIVE: usize = 3;
/// Material texture slot: ambient occlusion (R).
pub const TEX_OCCLUSION: usize = 4;
/// Material texture slot: clearcoat intensity (R).
pub const TEX_CLEARCOAT: usize = 5;
/// Material texture slot: transmission (R).
pub const TEX_TRANSMISSION: usize = 6;
/// Number of material texture slots.
pub const MATERIAL_TEXTURE_COUNT: usize = 7;

/// Index format code of a mesh entry: 32-bit indices.
pub const INDEX_FORMAT_R32: u32 = 0;
/// Index format code of a mesh entry: 16-bit indices.
pub const INDEX_FORMAT_R16: u32 = 1;

/// Light type code: directional.
pub const LIGHT_TYPE_DIRECTIONAL: f32 = 0.0;
/// Light type code: point.
pub const LIGHT_TYPE_POINT: f32 = 1.0;
/// Light type code: spot.
pub const LIGHT_TYPE_SPOT: f32 = 2.0;

/// An interleaved mesh vertex. 48 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Object-space position.
    pub position: Vec3,
    /// Object-space normal.
    pub normal: Vec3,
    /// Tangent (xyz) and bitangent sign (w).
    pub tangent: Vec4,
    /// Texture coordinate.
    pub uv: Vec2,
}

/// Byte stride of [`Vertex`].
pub const VERTEX_STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

/// One entry of the per-frame instance table.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VBInstanceData {
    /// Object to world.
    pub world_matrix: Mat4,
    /// Object to world on the previous frame.
    pub prev_world_matrix: Mat4,
    /// Inverse transpose of the world matrix.
    pub normal_matrix: Mat4,
    /// Index into the mesh table.
    pub mesh_index: u32,
    /// Index into the material table.
    pub material_index: u32,
    /// First index of the mesh's index range.
    pub first_index: u32,
    /// Number of indices drawn.
    pub index_count: u32,
    /// Value added to each index.
    pub base_vertex: u32,
    /// `INSTANCE_FLAG_*` bits.
    pub flags: u32,
    /// Padding to a 16-byte stride.
    pub _pad: [u32; 2],
}

impl Default for VBInstanceData {
    fn default() -> Self {
        Self {
            world_matrix: Mat4::IDENTITY,
            prev_world_matrix: Mat4::IDENTITY,
            normal_matrix: Mat4::IDENTITY,
            mesh_index: 0,
            material_index: 0,
            first_index: 0,
            index_count: 0,
            base_vertex: 0,
            flags: 0,
            _pad: [0; 2],
        }
    }
}

/// One entry of the mesh table: where a mesh's geometry lives in the
/// bindless heap.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VBMeshTableEntry {
    /// Bindless index of the raw vertex buffer SRV.
    pub vertex_buffer_index: u32,
    /// Bindless index of the raw index buffer SRV.
    pub index_buffer_index: u32,
    /// Bytes per vertex.
    pub vertex_stride_bytes: u32,
    /// [`INDEX_FORMAT_R32`] or [`INDEX_FORMAT_R16`].
    pub index_format: u32,
}

/// One entry of the material table.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VBMaterialConstants {
    /// Linear base color and alpha.
    pub base_color: [f32; 4],
    /// Emissive radiance (rgb) and metallic (w).
    pub emissive_metallic: [f32; 4],
    /// Roughness, specular, IOR, clearcoat.
    pub roughness_specular_ior_clearcoat: [f32; 4],
    /// Clearcoat roughness, transmission, alpha cutoff, alpha mode.
    pub clearcoat_roughness_transmission_cutoff_mode: [f32; 4],
    /// Specular color (rgb) and double-sided flag (w, 0 or 1).
    pub specular_color_double_sided: [f32; 4],
    /// Bindless texture indices, see the `TEX_*` slots.
    pub tex_idx: [u32; MATERIAL_TEXTURE_COUNT],
    /// Padding to a 16-byte stride.
    pub _pad: u32,
}

impl Default for VBMaterialConstants {
    fn default() -> Self {
        Self {
            base_color: [1.0; 4],
            emissive_metallic: [0.0; 4],
            roughness_specular_ior_clearcoat: [0.5, 0.5, 1.5, 0.0],
            clearcoat_roughness_transmission_cutoff_mode: [0.0, 0.0, 0.5, 0.0],
            specular_color_double_sided: [1.0, 1.0, 1.0, 0.0],
            tex_idx: [INVALID_BINDLESS_INDEX; MATERIAL_TEXTURE_COUNT],
            _pad: 0,
        }
    }
}

impl VBMaterialConstants {
    /// Metallic factor.
    pub fn metallic(&self) -> f32 {
        self.emissive_metallic[3]
    }

    /// Perceptual roughness factor.
    pub fn roughness(&self) -> f32 {
        self.roughness_specular_ior_clearcoat[0]
    }

    /// Alpha-test threshold.
    pub fn alpha_cutoff(&self) -> f32 {
        self.clearcoat_roughness_transmission_cutoff_mode[2]
    }

    /// Alpha mode code (0 opaque, 1 mask, 2 blend).
    pub fn alpha_mode(&self) -> u32 {
        self.clearcoat_roughness_transmission_cutoff_mode[3] as u32
    }
}

/// One entry of the reflection probe table.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VBReflectionProbe {
    /// World-space center (xyz) and radius of influence (w).
    pub position_radius: [f32; 4],
    /// Bindless index of the diffuse irradiance map.
    pub env_diffuse_index: u32,
    /// Bindless index of the prefiltered specular map.
    pub env_specular_index: u32,
    /// Last mip of the specular map.
    pub max_mip: f32,
    /// Radiance scale.
    pub intensity: f32,
}

/// One entry of the local-light table.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuLight {
    /// Position (xyz) and `LIGHT_TYPE_*` (w).
    pub position_type: [f32; 4],
    /// Direction the light points to (xyz) and cosine of the inner cone (w).
    pub direction_cos_inner: [f32; 4],
    /// Color premultiplied by intensity (rgb) and range (w).
    pub color_range: [f32; 4],
    /// Cosine of the outer cone (x) and shadow index (y, negative if none).
    pub params: [f32; 4],
}

/// Root constants of a visibility draw (20 x 32-bit values).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VisibilityConstants {
    /// World to clip.
    pub view_proj: Mat4,
    /// Index into the mesh table.
    pub mesh_index: u32,
    /// Draw index written to the payload's top byte.
    pub draw_index: u32,
    /// First instance of the draw's range.
    pub instance_base: u32,
    /// Unused.
    pub _pad: u32,
}

/// Constant buffer of the material resolve dispatch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialResolveParams {
    /// Clip to world.
    pub inv_view_proj: Mat4,
    /// World to clip.
    pub view_proj: Mat4,
    /// Width, height, 1/width, 1/height.
    pub screen: [f32; 4],
    /// Camera world position (xyz).
    pub camera_pos: [f32; 4],
}

/// Constant buffer of the cluster culling dispatch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ClusterCullParams {
    /// Clip to view.
    pub inv_proj: Mat4,
    /// World to view.
    pub view: Mat4,
    /// Width, height, 1/width, 1/height.
    pub screen: [f32; 4],
    /// Clusters along x, y, z and the per-cluster light cap.
    pub grid: [u32; 4],
    /// Near plane, far plane, unused, unused.
    pub depth_range: [f32; 4],
    /// Local light count (x).
    pub counts: [u32; 4],
}

/// Constant buffer of the deferred lighting pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DeferredLightingParams {
    /// Clip to world.
    pub inv_view_proj: Mat4,
    /// World to view.
    pub view: Mat4,
    /// Sun cascades (0..3) and local shadowed lights (3..6).
    pub light_view_projection: [Mat4; 6],
    /// Camera world position (xyz).
    pub camera_pos: [f32; 4],
    /// Direction towards the sun (xyz).
    pub sun_dir: [f32; 4],
    /// Sun color times intensity (rgb).
    pub sun_radiance: [f32; 4],
    /// View-space split depths (xyz) and far plane (w).
    pub cascade_splits: [f32; 4],
    /// Depth bias, PCF radius in texels, enabled, unused.
    pub shadow_params: [f32; 4],
    /// Diffuse IBL scale, specular IBL scale, enabled, unused.
    pub env_params: [f32; 4],
    /// 1/shadow size (xy) and specular max mip (z).
    pub shadow_inv_size_and_spec_max_mip: [f32; 4],
    /// proj[0][0], proj[1][1], near, far.
    pub projection_params: [f32; 4],
    /// Width, height, clusters along x, clusters along y.
    pub screen_and_cluster: [u32; 4],
    /// Clusters along z, per-cluster light cap, local light count, unused.
    pub cluster_params: [u32; 4],
    /// Unused, probe count, unused, unused.
    pub reflection_probe_params: [u32; 4],
}

/// Constant buffer of the motion vector dispatch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MotionVectorParams {
    /// Clip to world, current frame.
    pub inv_view_proj: Mat4,
    /// World to clip, previous frame.
    pub prev_view_proj: Mat4,
    /// World to clip, current frame.
    pub view_proj: Mat4,
    /// Width, height, unused, unused.
    pub dims: [u32; 4],
}

/// Root constants of the BRDF LUT dispatch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BrdfLutConstants {
    /// Edge length of the square LUT.
    pub size: u32,
    /// Importance samples per texel.
    pub sample_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_gpu_layouts() {
        assert_eq!(size_of::<Vertex>(), 48);
        assert_eq!(size_of::<VBInstanceData>(), 224);
        assert_eq!(size_of::<VBMeshTableEntry>(), 16);
        assert_eq!(size_of::<VBMaterialConstants>(), 112);
        assert_eq!(size_of::<VBReflectionProbe>(), 32);
        assert_eq!(size_of::<GpuLight>(), 64);
        assert_eq!(size_of::<VisibilityConstants>() / 4, 20);
        for size in [
            size_of::<VBInstanceData>(),
            size_of::<VBMaterialConstants>(),
            size_of::<MaterialResolveParams>(),
            size_of::<ClusterCullParams>(),
            size_of::<DeferredLightingParams>(),
            size_of::<MotionVectorParams>(),
        ] {
            assert_eq!(size % 16, 0);
        }
    }
}
