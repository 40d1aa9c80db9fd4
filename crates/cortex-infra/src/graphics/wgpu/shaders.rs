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

//! The WGSL programs and how root signatures map onto their bind groups.
//!
//! Group 0 carries the root arguments. Parameter `p` starts at binding
//! `p * 16`: root views bind their whole buffer there, and table entry `i`
//! binds at `p * 16 + i`. Root constants and the word offsets of root views
//! live in the root block at binding 199. Static sampler `s{r}` binds at
//! `200 + r`. Group 1 is the shader-visible heap, for programs that index
//! it directly.

use std::num::NonZeroU64;

use cortex_core::renderer::api::{
    DescriptorRangeKind, RootParameter, RootSignatureDesc, RootSignatureFlags,
};
use cortex_core::renderer::scene::bindings::{entry_points, programs};

use crate::graphics::recording::RootViewKind;

use super::conversions::IntoWgpu;

pub(crate) const ROOT_BLOCK_BINDING: u32 = 199;
/// `bias` (4 x vec4), `draw` (vec4), `constants` (16 x vec4).
pub(crate) const ROOT_BLOCK_SIZE: u64 = 336;
/// Root blocks are packed at the uniform offset alignment.
pub(crate) const ROOT_BLOCK_STRIDE: u64 = 512;
pub(crate) const MAX_ROOT_PARAMETERS: usize = 16;
pub(crate) const MAX_ROOT_CONSTANTS: usize = 64;
const PARAMETER_STRIDE: u32 = 16;
const SAMPLER_BINDING_BASE: u32 = 200;

pub(crate) const HEAP_TEXTURE_CAPACITY: u32 = 256;
pub(crate) const HEAP_BUFFER_CAPACITY: u32 = 128;
pub(crate) const SLOT_NONE: u32 = 0;
pub(crate) const SLOT_TEXTURE: u32 = 1;
pub(crate) const SLOT_BUFFER: u32 = 2;

const COMMON: &str = include_str!("shaders/common.wgsl");
const BINDLESS: &str = include_str!("shaders/bindless.wgsl");

const FILTERABLE: wgpu::TextureSampleType = wgpu::TextureSampleType::Float { filterable: true };
const UNFILTERABLE: wgpu::TextureSampleType = wgpu::TextureSampleType::Float { filterable: false };
const UINT: wgpu::TextureSampleType = wgpu::TextureSampleType::Uint;

/// What a descriptor table entry is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TableSlot {
    Sampled(wgpu::TextureSampleType),
    /// A depth texture array read with a comparison sampler.
    ShadowArray,
    Storage(wgpu::TextureFormat),
}

#[derive(Debug)]
pub(crate) struct Program {
    pub name: &'static str,
    source: &'static str,
    pub graphics: bool,
    pub bindless: bool,
    table: &'static [TableSlot],
}

impl Program {
    /// The full module: shared helpers, the heap declarations when the
    /// program indexes the heap, then the program itself.
    pub fn source(&self) -> String {
        let mut source = String::from(COMMON);
        if self.bindless {
            source.push('\n');
            source.push_str(BINDLESS);
        }
        source.push('\n');
        source.push_str(self.source);
        source
    }

    fn stages(&self) -> wgpu::ShaderStages {
        if self.graphics {
            wgpu::ShaderStages::VERTEX_FRAGMENT
        } else {
            wgpu::ShaderStages::COMPUTE
        }
    }
}

static PROGRAMS: [Program; 6] = [
    Program {
        name: programs::VISIBILITY,
        source: include_str!("shaders/visibility.wgsl"),
        graphics: true,
        bindless: true,
        table: &[],
    },
    Program {
        name: programs::MATERIAL_RESOLVE,
        source: include_str!("shaders/material_resolve.wgsl"),
        graphics: false,
        bindless: true,
        table: &[
            TableSlot::Sampled(UINT),
            TableSlot::Sampled(UNFILTERABLE),
            TableSlot::Storage(wgpu::TextureFormat::Rgba8Unorm),
            TableSlot::Storage(wgpu::TextureFormat::Rgba16Float),
            TableSlot::Storage(wgpu::TextureFormat::Rgba16Float),
            TableSlot::Storage(wgpu::TextureFormat::Rgba16Float),
            TableSlot::Storage(wgpu::TextureFormat::Rgba16Float),
        ],
    },
    Program {
        name: programs::CLUSTER_CULL,
        source: include_str!("shaders/cluster_cull.wgsl"),
        graphics: false,
        bindless: false,
        table: &[],
    },
    Program {
        name: programs::DEFERRED_LIGHTING,
        source: include_str!("shaders/deferred_lighting.wgsl"),
        graphics: true,
        bindless: true,
        table: &[
            TableSlot::Sampled(FILTERABLE),
            TableSlot::Sampled(FILTERABLE),
            TableSlot::Sampled(FILTERABLE),
            TableSlot::Sampled(FILTERABLE),
            TableSlot::Sampled(FILTERABLE),
            TableSlot::Sampled(UNFILTERABLE),
            TableSlot::Sampled(FILTERABLE),
            TableSlot::Sampled(FILTERABLE),
            TableSlot::Sampled(FILTERABLE),
            TableSlot::ShadowArray,
        ],
    },
    Program {
        name: programs::MOTION_VECTORS,
        source: include_str!("shaders/motion_vectors.wgsl"),
        graphics: false,
        bindless: true,
        table: &[
            TableSlot::Sampled(UINT),
            TableSlot::Sampled(UNFILTERABLE),
            TableSlot::Storage(wgpu::TextureFormat::Rg16Float),
        ],
    },
    Program {
        name: programs::BRDF_LUT,
        source: include_str!("shaders/brdf_lut.wgsl"),
        graphics: false,
        bindless: false,
        table: &[TableSlot::Storage(wgpu::TextureFormat::Rg16Float)],
    },
];

pub(crate) fn program(name: &str) -> Option<&'static Program> {
    PROGRAMS.iter().find(|p| p.name == name)
}

/// The WGSL function implementing an entry point.
pub(crate) fn entry_point(entry: &str) -> Option<&'static str> {
    Some(match entry {
        entry_points::VS_MAIN => "vs_main",
        entry_points::PS_MAIN => "ps_main",
        entry_points::PS_MAIN_ALPHA_TEST => "ps_main_alpha_test",
        entry_points::CS_MAIN => "cs_main",
        _ => return None,
    })
}

/// Vertex shader location of an input element.
pub(crate) fn semantic_location(semantic: &str) -> Option<u32> {
    Some(match semantic {
        "POSITION" => 0,
        "TEXCOORD" => 1,
        "NORMAL" => 2,
        "TANGENT" => 3,
        _ => return None,
    })
}

/// Where the value of a group 0 binding comes from at draw time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindingSource {
    RootBlock,
    RootView {
        parameter: u32,
        kind: RootViewKind,
    },
    TableEntry {
        parameter: u32,
        index: u32,
        slot: TableSlot,
    },
    Sampler {
        register: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Binding {
    pub binding: u32,
    pub source: BindingSource,
    pub ty: wgpu::BindingType,
}

impl Binding {
    pub fn layout_entry(&self, program: &Program) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding: self.binding,
            visibility: program.stages(),
            ty: self.ty,
            count: None,
        }
    }
}

fn buffer(ty: wgpu::BufferBindingType, min_binding_size: Option<NonZeroU64>) -> wgpu::BindingType {
    wgpu::BindingType::Buffer {
        ty,
        has_dynamic_offset: false,
        min_binding_size,
    }
}

fn slot_type(slot: TableSlot) -> wgpu::BindingType {
    match slot {
        TableSlot::Sampled(sample_type) => wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        TableSlot::ShadowArray => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Depth,
            view_dimension: wgpu::TextureViewDimension::D2Array,
            multisampled: false,
        },
        TableSlot::Storage(format) => wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
    }
}

/// First root-block constant of each parameter; `None` for parameters that
/// are not inline constants.
pub(crate) fn constant_offsets(signature: &RootSignatureDesc) -> Vec<Option<u32>> {
    let mut next = 0;
    signature
        .parameters
        .iter()
        .map(|p| match p {
            RootParameter::Constants { count, .. } => {
                let base = next;
                next += count;
                Some(base)
            }
            _ => None,
        })
        .collect()
}

/// The group 0 bindings of `program` under `signature`.
pub(crate) fn bindings(
    program: &Program,
    signature: &RootSignatureDesc,
) -> Result<Vec<Binding>, String> {
    if signature.parameters.len() > MAX_ROOT_PARAMETERS {
        return Err(format!(
            "'{}' has {} parameters, at most {MAX_ROOT_PARAMETERS} map onto a bind group",
            signature.label,
            signature.parameters.len()
        ));
    }
    let constants: u32 = signature
        .parameters
        .iter()
        .map(|p| match p {
            RootParameter::Constants { count, .. } => *count,
            _ => 0,
        })
        .sum();
    if constants as usize > MAX_ROOT_CONSTANTS {
        return Err(format!("'{}' has {constants} root constants", signature.label));
    }
    if program.bindless
        && !signature
            .flags
            .contains(RootSignatureFlags::CBV_SRV_UAV_HEAP_DIRECTLY_INDEXED)
    {
        return Err(format!(
            "{} indexes the descriptor heap but '{}' does not allow it",
            program.name, signature.label
        ));
    }

    let mut out = vec![Binding {
        binding: ROOT_BLOCK_BINDING,
        source: BindingSource::RootBlock,
        ty: buffer(
            wgpu::BufferBindingType::Uniform,
            NonZeroU64::new(ROOT_BLOCK_SIZE),
        ),
    }];
    for (p, parameter) in signature.parameters.iter().enumerate() {
        let p = p as u32;
        let base = p * PARAMETER_STRIDE;
        let view = |kind, ty| Binding {
            binding: base,
            source: BindingSource::RootView { parameter: p, kind },
            ty,
        };
        match parameter {
            RootParameter::Constants { .. } => {}
            RootParameter::Cbv { .. } => out.push(view(
                RootViewKind::Cbv,
                buffer(wgpu::BufferBindingType::Uniform, None),
            )),
            RootParameter::Srv { .. } => out.push(view(
                RootViewKind::Srv,
                buffer(wgpu::BufferBindingType::Storage { read_only: true }, None),
            )),
            RootParameter::Uav { .. } => out.push(view(
                RootViewKind::Uav,
                buffer(wgpu::BufferBindingType::Storage { read_only: false }, None),
            )),
            RootParameter::DescriptorTable { ranges } => {
                if parameter.table_len() as usize != program.table.len() {
                    return Err(format!(
                        "{} expects a table of {} descriptors, '{}' declares {}",
                        program.name,
                        program.table.len(),
                        signature.label,
                        parameter.table_len()
                    ));
                }
                if parameter.table_len() >= PARAMETER_STRIDE {
                    return Err(format!("table of {} descriptors", parameter.table_len()));
                }
                let kinds = ranges
                    .iter()
                    .flat_map(|r| std::iter::repeat(r.kind).take(r.count as usize));
                for (index, (kind, slot)) in kinds.zip(program.table).enumerate() {
                    let storage = matches!(slot, TableSlot::Storage(_));
                    if storage != (kind == DescriptorRangeKind::Uav) {
                        return Err(format!(
                            "table entry {index} of '{}' is a {kind:?} range where {} binds {slot:?}",
                            signature.label, program.name
                        ));
                    }
                    out.push(Binding {
                        binding: base + index as u32,
                        source: BindingSource::TableEntry {
                            parameter: p,
                            index: index as u32,
                            slot: *slot,
                        },
                        ty: slot_type(*slot),
                    });
                }
            }
        }
    }
    for sampler in &signature.static_samplers {
        out.push(Binding {
            binding: SAMPLER_BINDING_BASE + sampler.register,
            source: BindingSource::Sampler {
                register: sampler.register,
            },
            ty: wgpu::BindingType::Sampler((*sampler).into_wgpu()),
        });
    }
    Ok(out)
}

/// Group 1: the heap's textures, buffers and the slot table.
pub(crate) fn heap_layout_entries() -> [wgpu::BindGroupLayoutEntry; 3] {
    let stages = wgpu::ShaderStages::VERTEX_FRAGMENT | wgpu::ShaderStages::COMPUTE;
    [
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: stages,
            ty: slot_type(TableSlot::Sampled(FILTERABLE)),
            count: std::num::NonZeroU32::new(HEAP_TEXTURE_CAPACITY),
        },
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: stages,
            ty: buffer(wgpu::BufferBindingType::Storage { read_only: true }, None),
            count: std::num::NonZeroU32::new(HEAP_BUFFER_CAPACITY),
        },
        wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: stages,
            ty: buffer(wgpu::BufferBindingType::Storage { read_only: true }, None),
            count: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::checks::program_root_signature;

    /// Group 0 binding numbers declared in WGSL source.
    fn declared_bindings(source: &str) -> Vec<u32> {
        source
            .match_indices("@group(0) @binding(")
            .filter_map(|(at, prefix)| {
                let rest = &source[at + prefix.len()..];
                rest[..rest.find(')')?].parse().ok()
            })
            .collect()
    }

    #[test]
    fn test_every_program_binds_under_its_root_signature() {
        for program in &PROGRAMS {
            let signature = program_root_signature(program.name)
                .unwrap_or_else(|| panic!("{} has no root signature", program.name));
            let bindings = bindings(program, &signature).unwrap();
            let mut numbers: Vec<u32> = bindings.iter().map(|b| b.binding).collect();
            numbers.sort_unstable();
            numbers.dedup();
            assert_eq!(numbers.len(), bindings.len(), "{}", program.name);
            for declared in declared_bindings(&program.source()) {
                assert!(
                    numbers.contains(&declared),
                    "{} declares binding {declared} that no root parameter fills",
                    program.name
                );
            }
        }
    }

    #[test]
    fn test_root_constants_are_packed_in_order() {
        let signature = program_root_signature(programs::VISIBILITY).unwrap();
        assert_eq!(constant_offsets(&signature), vec![Some(0), None, None]);
    }

    #[test]
    fn test_only_heap_programs_include_the_heap() {
        let visibility = program(programs::VISIBILITY).unwrap();
        assert!(visibility.source().contains("heap_textures"));
        let cull = program(programs::CLUSTER_CULL).unwrap();
        assert!(!cull.source().contains("heap_textures"));
        assert!(program("Tonemap").is_none());
    }

    #[test]
    fn test_table_kinds_must_match_the_program() {
        let program = program(programs::BRDF_LUT).unwrap();
        let mut signature = program_root_signature(programs::BRDF_LUT).unwrap();
        if let RootParameter::DescriptorTable { ranges } = &mut signature.parameters[1] {
            ranges[0].kind = DescriptorRangeKind::Srv;
        }
        assert!(bindings(program, &signature).is_err());
    }

    #[test]
    fn test_entry_points() {
        assert_eq!(entry_point(entry_points::PS_MAIN_ALPHA_TEST), Some("ps_main_alpha_test"));
        assert_eq!(entry_point("main"), None);
        assert_eq!(semantic_location("TEXCOORD"), Some(1));
    }
}
