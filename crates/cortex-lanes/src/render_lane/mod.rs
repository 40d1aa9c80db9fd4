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

//! Render lanes - the stages of the deferred pipeline.
//!
//! Stages run in this order: visibility, material resolve, clustered light
//! culling, deferred lighting, motion vectors. The BRDF LUT lane runs once
//! before the first frame that needs it.

use cortex_core::config::RendererConfig;
use cortex_core::math::{Mat4, Vec3};
use cortex_core::renderer::api::{
    DescriptorHeapType, Format, GpuDescriptorHandle, GpuVirtualAddress, ResourceId,
    ShaderResourceViewDesc, ShaderSource, ShaderStage, UnorderedAccessViewDesc,
};
use cortex_core::renderer::scene::Camera;
use cortex_core::renderer::{PassContext, RenderError, RgHandle};

mod brdf_lut_lane;
mod cluster_cull_lane;
mod deferred_lighting_lane;
mod material_resolve_lane;
mod motion_vector_lane;
mod visibility_lane;

pub use brdf_lut_lane::*;
pub use cluster_cull_lane::*;
pub use deferred_lighting_lane::*;
pub use material_resolve_lane::*;
pub use motion_vector_lane::*;
pub use visibility_lane::*;

/// A stage of the deferred pipeline.
///
/// A lane is created once per device, owns its pipeline states and is asked
/// every frame to declare its passes into the render graph. Lanes hold no
/// per-frame state of their own beyond constant buffers indexed by frame
/// slot, so the same lane serves every frame in flight.
pub trait RenderLane: Send + Sync {
    /// A human-readable identifier for the stage, used in logs.
    fn strategy_name(&self) -> &'static str;
}

/// Storage formats of the five G-buffer planes, in shader binding order.
pub const GBUFFER_FORMATS: [Format; 5] = [
    Format::Rgba8Typeless,
    Format::Rgba16Float,
    Format::Rgba16Float,
    Format::Rgba16Float,
    Format::Rgba16Float,
];

/// View formats of the G-buffer planes. Albedo is stored typeless and read
/// and written through an RGBA8 view.
pub const GBUFFER_VIEW_FORMATS: [Format; 5] = [
    Format::Rgba8Unorm,
    Format::Rgba16Float,
    Format::Rgba16Float,
    Format::Rgba16Float,
    Format::Rgba16Float,
];

/// Debug names of the G-buffer planes.
pub const GBUFFER_NAMES: [&str; 5] = [
    "GBuffer Albedo",
    "GBuffer NormalRoughness",
    "GBuffer EmissiveMetallic",
    "GBuffer MaterialExt0",
    "GBuffer MaterialExt1",
];

/// Format of the visibility buffer.
pub const VISIBILITY_FORMAT: Format = Format::Rg32Uint;
/// Format of the scene depth.
pub const DEPTH_FORMAT: Format = Format::D32Float;
/// Format depth is sampled through.
pub const DEPTH_SRV_FORMAT: Format = Format::R32Float;
/// Format of the lit HDR target.
pub const HDR_FORMAT: Format = Format::Rgba16Float;
/// Format of the velocity target.
pub const VELOCITY_FORMAT: Format = Format::Rg16Float;

/// The five G-buffer planes of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GBuffer {
    /// Albedo (rgb) and occlusion (a).
    pub albedo: RgHandle,
    /// World normal (xyz) and roughness (w).
    pub normal_roughness: RgHandle,
    /// Emissive (rgb) and metallic (w).
    pub emissive_metallic: RgHandle,
    /// Clearcoat, IOR, specular, clearcoat roughness.
    pub ext0: RgHandle,
    /// Specular color (rgb) and transmission (w).
    pub ext1: RgHandle,
}

impl GBuffer {
    /// Builds the set from handles in binding order.
    pub fn from_planes(planes: [RgHandle; 5]) -> Self {
        let [albedo, normal_roughness, emissive_metallic, ext0, ext1] = planes;
        Self {
            albedo,
            normal_roughness,
            emissive_metallic,
            ext0,
            ext1,
        }
    }

    /// Handles in binding order.
    pub fn planes(&self) -> [RgHandle; 5] {
        [
            self.albedo,
            self.normal_roughness,
            self.emissive_metallic,
            self.ext0,
            self.ext1,
        ]
    }
}

/// Camera matrices of the current and previous frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameView {
    /// World to view.
    pub view: Mat4,
    /// View to clip.
    pub projection: Mat4,
    /// World to clip.
    pub view_proj: Mat4,
    /// Clip to world.
    pub inv_view_proj: Mat4,
    /// Clip to view.
    pub inv_projection: Mat4,
    /// World to clip on the previous frame.
    pub prev_view_proj: Mat4,
    /// Eye position.
    pub camera_pos: Vec3,
    /// Near plane distance.
    pub near: f32,
    /// Far plane distance.
    pub far: f32,
    /// Target width in pixels.
    pub width: u32,
    /// Target height in pixels.
    pub height: u32,
}

impl FrameView {
    /// Derives every matrix from `camera`. `prev_view_proj` is `None` on the
    /// first frame, which then reprojects onto itself.
    pub fn new(
        camera: &Camera,
        prev_view_proj: Option<Mat4>,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        let view_proj = camera.view_projection();
        Ok(Self {
            view: camera.view,
            projection: camera.projection,
            view_proj,
            inv_view_proj: camera.inverse_view_projection()?,
            inv_projection: camera.inverse_projection()?,
            prev_view_proj: prev_view_proj.unwrap_or(view_proj),
            camera_pos: camera.position(),
            near: camera.near,
            far: camera.far,
            width,
            height,
        })
    }

    /// Width, height and their reciprocals.
    pub fn screen(&self) -> [f32; 4] {
        let (w, h) = (self.width.max(1) as f32, self.height.max(1) as f32);
        [w, h, 1.0 / w, 1.0 / h]
    }
}

/// GPU addresses of this frame's slot of every upload table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameTables {
    /// `VBInstanceData` records.
    pub instances: GpuVirtualAddress,
    /// `VBMaterialConstants` records.
    pub materials: GpuVirtualAddress,
    /// `VBMeshTableEntry` records.
    pub meshes: GpuVirtualAddress,
    /// `GpuLight` records of the local lights.
    pub lights: GpuVirtualAddress,
    /// `VBReflectionProbe` records.
    pub probes: GpuVirtualAddress,
}

/// One descriptor of a transient table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TableEntry {
    /// A shader resource view.
    Srv(ResourceId, ShaderResourceViewDesc),
    /// An unordered access view.
    Uav(ResourceId, UnorderedAccessViewDesc),
}

impl TableEntry {
    /// An SRV of every mip of a 2D texture.
    pub fn texture(resource: ResourceId, format: Format) -> Self {
        TableEntry::Srv(resource, ShaderResourceViewDesc::texture_2d(format))
    }

    /// A UAV of mip 0 of a 2D texture.
    pub fn rw_texture(resource: ResourceId, format: Format) -> Self {
        TableEntry::Uav(
            resource,
            UnorderedAccessViewDesc::Texture2D {
                format,
                mip_slice: 0,
            },
        )
    }
}

/// Writes `entries` into a contiguous range of this frame's transient ring
/// and returns the GPU handle of its first slot.
pub fn write_transient_table(
    ctx: &mut PassContext<'_>,
    entries: &[TableEntry],
) -> Result<GpuDescriptorHandle, RenderError> {
    let base = ctx
        .descriptors
        .allocate_transient_range(DescriptorHeapType::CbvSrvUav, entries.len() as u32)?;
    for (i, entry) in entries.iter().enumerate() {
        let dest = base.at(i as u32).cpu;
        match entry {
            TableEntry::Srv(resource, desc) => {
                ctx.device.create_shader_resource_view(*resource, desc, dest)?
            }
            TableEntry::Uav(resource, desc) => {
                ctx.device.create_unordered_access_view(*resource, desc, dest)?
            }
        }
    }
    Ok(base.gpu)
}

/// Thread groups needed to cover `extent` threads.
pub const fn group_count(extent: u32, group_size: u32) -> u32 {
    extent.div_ceil(group_size)
}

pub(crate) fn shader(
    config: &RendererConfig,
    program: &str,
    entry_point: &str,
    stage: ShaderStage,
) -> ShaderSource {
    ShaderSource::new(&config.shader_dir, program, entry_point, stage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_count_rounds_up() {
        assert_eq!(group_count(0, 8), 0);
        assert_eq!(group_count(1, 8), 1);
        assert_eq!(group_count(64, 8), 8);
        assert_eq!(group_count(65, 8), 9);
        assert_eq!(group_count(3456, 64), 54);
    }

    #[test]
    fn test_albedo_views_reinterpret_typeless_storage() {
        for (storage, view) in GBUFFER_FORMATS.iter().zip(GBUFFER_VIEW_FORMATS) {
            assert!(storage.is_view_compatible(view));
        }
        assert!(DEPTH_FORMAT.is_view_compatible(DEPTH_SRV_FORMAT));
    }

    #[test]
    fn test_first_frame_reprojects_onto_itself() {
        let camera = Camera::look_at(
            Vec3::new(0.0, 1.0, 5.0),
            Vec3::ZERO,
            1.0,
            16.0 / 9.0,
            0.1,
            100.0,
        )
        .unwrap();
        let view = FrameView::new(&camera, None, 160, 90).unwrap();
        assert_eq!(view.prev_view_proj, view.view_proj);
        assert_eq!(view.screen()[0], 160.0);
    }
}
