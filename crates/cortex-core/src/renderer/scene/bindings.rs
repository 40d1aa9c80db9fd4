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

//! Shader programs and the root signature each of them is paired with.
//!
//! Lanes bind arguments by the parameter indices below, and the reference
//! device's kernels read them back by the same indices.

use crate::renderer::api::{
    CompareFunc, DescriptorRange, DescriptorRangeKind, Filter, AddressMode, RootParameter,
    RootSignatureDesc, RootSignatureFlags, StaticSampler,
};

/// Shader file names, without extension, under the shader directory.
pub mod programs {
    /// Visibility buffer rasterization.
    pub const VISIBILITY: &str = "VisibilityBuffer";
    /// G-buffer reconstruction.
    pub const MATERIAL_RESOLVE: &str = "MaterialResolve";
    /// Clustered light assignment.
    pub const CLUSTER_CULL: &str = "ClusteredLightCulling";
    /// Fullscreen deferred shading.
    pub const DEFERRED_LIGHTING: &str = "DeferredLighting";
    /// Screen-space velocity.
    pub const MOTION_VECTORS: &str = "MotionVectors";
    /// Split-sum BRDF preintegration.
    pub const BRDF_LUT: &str = "BrdfLut";
}

/// Shader entry point names.
pub mod entry_points {
    /// Vertex stage.
    pub const VS_MAIN: &str = "VSMain";
    /// Pixel stage.
    pub const PS_MAIN: &str = "PSMain";
    /// Alpha-tested pixel stage.
    pub const PS_MAIN_ALPHA_TEST: &str = "PSMainAlphaTest";
    /// Compute stage.
    pub const CS_MAIN: &str = "CSMain";
}

/// Visibility pass parameters.
pub mod visibility {
    /// `VisibilityConstants` as root constants (`b0`).
    pub const CONSTANTS: u32 = 0;
    /// Instance table (`t0`).
    pub const INSTANCES: u32 = 1;
    /// Material table (`t1`).
    pub const MATERIALS: u32 = 2;
    /// Number of 32-bit root constants.
    pub const CONSTANT_COUNT: u32 = 20;
}

/// Material resolve parameters.
pub mod material_resolve {
    /// `MaterialResolveParams` (`b0`).
    pub const PARAMS: u32 = 0;
    /// Instance table (`t0`).
    pub const INSTANCES: u32 = 1;
    /// Mesh table (`t1`).
    pub const MESHES: u32 = 2;
    /// Material table (`t2`).
    pub const MATERIALS: u32 = 3;
    /// Table: visibility, depth SRVs (`t3..t4`) then the five G-buffer UAVs (`u0..u4`).
    pub const TARGETS: u32 = 4;
    /// Descriptors in [`TARGETS`].
    pub const TARGETS_LEN: u32 = 7;
    /// Thread group edge.
    pub const GROUP_SIZE: u32 = 8;
}

/// Cluster culling parameters.
pub mod cluster_cull {
    /// `ClusterCullParams` (`b0`).
    pub const PARAMS: u32 = 0;
    /// Local-light table (`t0`).
    pub const LIGHTS: u32 = 1;
    /// Per-cluster `(offset, count)` (`u0`).
    pub const RANGES: u32 = 2;
    /// Light index list (`u1`).
    pub const INDICES: u32 = 3;
    /// Threads per group, one per cluster.
    pub const GROUP_SIZE: u32 = 64;
}

/// Deferred lighting parameters.
pub mod deferred_lighting {
    /// `DeferredLightingParams` (`b0`).
    pub const PARAMS: u32 = 0;
    /// Local-light table (`t0`).
    pub const LIGHTS: u32 = 1;
    /// Reflection probe table (`t1`). Probe maps are read through the heap.
    pub const PROBES: u32 = 2;
    /// Cluster ranges (`t2`).
    pub const CLUSTER_RANGES: u32 = 3;
    /// Cluster light indices (`t3`).
    pub const CLUSTER_INDICES: u32 = 4;
    /// Table of [`TEXTURES_LEN`] SRVs starting at `t4`, in `TEX_*` order.
    pub const TEXTURES: u32 = 5;
    /// G-buffer albedo.
    pub const TEX_ALBEDO: u32 = 0;
    /// G-buffer normal and roughness.
    pub const TEX_NORMAL_ROUGHNESS: u32 = 1;
    /// G-buffer emissive and metallic.
    pub const TEX_EMISSIVE_METALLIC: u32 = 2;
    /// G-buffer extension plane 0.
    pub const TEX_MATERIAL_EXT0: u32 = 3;
    /// G-buffer extension plane 1.
    pub const TEX_MATERIAL_EXT1: u32 = 4;
    /// Scene depth.
    pub const TEX_DEPTH: u32 = 5;
    /// Diffuse irradiance map.
    pub const TEX_ENV_DIFFUSE: u32 = 6;
    /// Prefiltered specular map.
    pub const TEX_ENV_SPECULAR: u32 = 7;
    /// BRDF LUT.
    pub const TEX_BRDF_LUT: u32 = 8;
    /// Shadow map array.
    pub const TEX_SHADOW_MAP: u32 = 9;
    /// Descriptors in [`TEXTURES`].
    pub const TEXTURES_LEN: u32 = 10;
}

/// Motion vector parameters.
pub mod motion_vectors {
    /// `MotionVectorParams` (`b0`).
    pub const PARAMS: u32 = 0;
    /// Instance table (`t0`).
    pub const INSTANCES: u32 = 1;
    /// Mesh table (`t1`).
    pub const MESHES: u32 = 2;
    /// Table: visibility, depth SRVs (`t2..t3`) then the velocity UAV (`u0`).
    pub const TARGETS: u32 = 3;
    /// Descriptors in [`TARGETS`].
    pub const TARGETS_LEN: u32 = 3;
    /// Thread group edge.
    pub const GROUP_SIZE: u32 = 8;
}

/// BRDF LUT parameters.
pub mod brdf_lut {
    /// `BrdfLutConstants` as root constants (`b0`).
    pub const CONSTANTS: u32 = 0;
    /// Table holding the LUT UAV (`u0`).
    pub const OUTPUT: u32 = 1;
    /// Thread group edge.
    pub const GROUP_SIZE: u32 = 8;
    /// Edge length of the LUT.
    pub const SIZE: u32 = 256;
    /// Importance samples per texel.
    pub const SAMPLE_COUNT: u32 = 128;
}

const fn range(kind: DescriptorRangeKind, count: u32, base_register: u32) -> DescriptorRange {
    DescriptorRange {
        kind,
        count,
        base_register,
        space: 0,
    }
}

/// Layout of the visibility pipelines.
pub fn visibility_root_signature() -> RootSignatureDesc {
    RootSignatureDesc {
        label: "Visibility".into(),
        parameters: vec![
            RootParameter::Constants {
                register: 0,
                count: visibility::CONSTANT_COUNT,
            },
            RootParameter::Srv { register: 0 },
            RootParameter::Srv { register: 1 },
        ],
        static_samplers: vec![StaticSampler::linear_wrap(0)],
        flags: RootSignatureFlags::ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT
            | RootSignatureFlags::CBV_SRV_UAV_HEAP_DIRECTLY_INDEXED,
    }
}

/// Layout of the material resolve pipeline.
pub fn material_resolve_root_signature() -> RootSignatureDesc {
    RootSignatureDesc {
        label: "MaterialResolve".into(),
        parameters: vec![
            RootParameter::Cbv { register: 0 },
            RootParameter::Srv { register: 0 },
            RootParameter::Srv { register: 1 },
            RootParameter::Srv { register: 2 },
            RootParameter::DescriptorTable {
                ranges: vec![
                    range(DescriptorRangeKind::Srv, 2, 3),
                    range(DescriptorRangeKind::Uav, 5, 0),
                ],
            },
        ],
        static_samplers: vec![StaticSampler::linear_wrap(0)],
        flags: RootSignatureFlags::CBV_SRV_UAV_HEAP_DIRECTLY_INDEXED,
    }
}

/// Layout of the cluster culling pipeline.
pub fn cluster_cull_root_signature() -> RootSignatureDesc {
    RootSignatureDesc {
        label: "ClusterCull".into(),
        parameters: vec![
            RootParameter::Cbv { register: 0 },
            RootParameter::Srv { register: 0 },
            RootParameter::Uav { register: 0 },
            RootParameter::Uav { register: 1 },
        ],
        static_samplers: Vec::new(),
        flags: RootSignatureFlags::EMPTY,
    }
}

/// Layout of the deferred lighting pipeline.
pub fn deferred_lighting_root_signature() -> RootSignatureDesc {
    RootSignatureDesc {
        label: "DeferredLighting".into(),
        parameters: vec![
            RootParameter::Cbv { register: 0 },
            RootParameter::Srv { register: 0 },
            RootParameter::Srv { register: 1 },
            RootParameter::Srv { register: 2 },
            RootParameter::Srv { register: 3 },
            RootParameter::DescriptorTable {
                ranges: vec![range(
                    DescriptorRangeKind::Srv,
                    deferred_lighting::TEXTURES_LEN,
                    4,
                )],
            },
        ],
        static_samplers: vec![
            StaticSampler::linear_clamp(0),
            StaticSampler {
                register: 1,
                filter: Filter::Point,
                address: AddressMode::Clamp,
                comparison: Some(CompareFunc::LessEqual),
            },
            StaticSampler::linear_wrap(2),
        ],
        flags: RootSignatureFlags::CBV_SRV_UAV_HEAP_DIRECTLY_INDEXED,
    }
}

/// Layout of the motion vector pipeline.
pub fn motion_vectors_root_signature() -> RootSignatureDesc {
    RootSignatureDesc {
        label: "MotionVectors".into(),
        parameters: vec![
            RootParameter::Cbv { register: 0 },
            RootParameter::Srv { register: 0 },
            RootParameter::Srv { register: 1 },
            RootParameter::DescriptorTable {
                ranges: vec![
                    range(DescriptorRangeKind::Srv, 2, 2),
                    range(DescriptorRangeKind::Uav, 1, 0),
                ],
            },
        ],
        static_samplers: Vec::new(),
        flags: RootSignatureFlags::CBV_SRV_UAV_HEAP_DIRECTLY_INDEXED,
    }
}

/// Layout of the BRDF LUT pipeline.
pub fn brdf_lut_root_signature() -> RootSignatureDesc {
    RootSignatureDesc {
        label: "BrdfLut".into(),
        parameters: vec![
            RootParameter::Constants {
                register: 0,
                count: 2,
            },
            RootParameter::DescriptorTable {
                ranges: vec![range(DescriptorRangeKind::Uav, 1, 0)],
            },
        ],
        static_samplers: Vec::new(),
        flags: RootSignatureFlags::EMPTY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lengths_match_parameter_constants() {
        let resolve = material_resolve_root_signature();
        assert_eq!(
            resolve.parameters[material_resolve::TARGETS as usize].table_len(),
            material_resolve::TARGETS_LEN
        );
        let lighting = deferred_lighting_root_signature();
        assert_eq!(
            lighting.parameters[deferred_lighting::TEXTURES as usize].table_len(),
            deferred_lighting::TEXTURES_LEN
        );
        let motion = motion_vectors_root_signature();
        assert_eq!(
            motion.parameters[motion_vectors::TARGETS as usize].table_len(),
            motion_vectors::TARGETS_LEN
        );
    }

    #[test]
    fn test_bindless_passes_index_the_heap_directly() {
        for desc in [
            visibility_root_signature(),
            material_resolve_root_signature(),
            deferred_lighting_root_signature(),
            motion_vectors_root_signature(),
        ] {
            assert!(desc
                .flags
                .contains(RootSignatureFlags::CBV_SRV_UAV_HEAP_DIRECTLY_INDEXED));
        }
    }
}
