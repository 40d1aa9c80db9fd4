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

//! Root signatures, shader sources and pipeline state descriptions.

use std::path::{Path, PathBuf};

use super::format::Format;

/// An opaque handle to a root signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootSignatureId(pub u64);

/// An opaque handle to a compiled pipeline state object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(pub u64);

crate::cortex_bitflags! {
    /// Root signature capabilities.
    pub struct RootSignatureFlags: u32 {
        /// The pipeline consumes vertex buffers through an input layout.
        const ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT = 1 << 0;
        /// Shaders may index `ResourceDescriptorHeap[]` directly.
        const CBV_SRV_UAV_HEAP_DIRECTLY_INDEXED = 1 << 1;
    }
}

/// Kind of descriptors in a descriptor table range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorRangeKind {
    /// Shader resource views (`t` registers).
    Srv,
    /// Unordered access views (`u` registers).
    Uav,
    /// Constant buffer views (`b` registers).
    Cbv,
}

/// A contiguous run of registers inside a descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRange {
    /// Register class.
    pub kind: DescriptorRangeKind,
    /// Number of descriptors.
    pub count: u32,
    /// First register.
    pub base_register: u32,
    /// Register space.
    pub space: u32,
}

/// One root parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootParameter {
    /// Inline 32-bit constants bound to `b{register}`.
    Constants {
        /// Shader register.
        register: u32,
        /// Number of 32-bit values.
        count: u32,
    },
    /// Root constant buffer view bound by GPU address.
    Cbv {
        /// Shader register (`b`).
        register: u32,
    },
    /// Root shader resource view bound by GPU address.
    Srv {
        /// Shader register (`t`).
        register: u32,
    },
    /// Root unordered access view bound by GPU address.
    Uav {
        /// Shader register (`u`).
        register: u32,
    },
    /// A table of descriptors in the bound shader-visible heap.
    DescriptorTable {
        /// Ranges, laid out back to back from the table base.
        ranges: Vec<DescriptorRange>,
    },
}

impl RootParameter {
    /// Descriptors a table parameter spans (0 for other kinds).
    pub fn table_len(&self) -> u32 {
        match self {
            RootParameter::DescriptorTable { ranges } => ranges.iter().map(|r| r.count).sum(),
            _ => 0,
        }
    }
}

/// Texture filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Nearest texel.
    Point,
    /// Bilinear within a mip, linear between mips.
    Linear,
}

/// Texture addressing outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    /// Repeat.
    Wrap,
    /// Clamp to edge.
    Clamp,
}

/// Comparison used by depth tests and comparison samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunc {
    /// Never passes.
    Never,
    /// Passes when `new < old`.
    Less,
    /// Passes when `new <= old`.
    LessEqual,
    /// Passes when `new > old`.
    Greater,
    /// Always passes.
    Always,
}

impl CompareFunc {
    /// Evaluates the comparison.
    #[inline]
    pub fn passes(self, new: f32, old: f32) -> bool {
        match self {
            CompareFunc::Never => false,
            CompareFunc::Less => new < old,
            CompareFunc::LessEqual => new <= old,
            CompareFunc::Greater => new > old,
            CompareFunc::Always => true,
        }
    }
}

/// A sampler baked into a root signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticSampler {
    /// Shader register (`s`).
    pub register: u32,
    /// Filtering.
    pub filter: Filter,
    /// Addressing on every axis.
    pub address: AddressMode,
    /// Comparison for shadow lookups.
    pub comparison: Option<CompareFunc>,
}

impl StaticSampler {
    /// Linear filtering with wrap addressing.
    pub const fn linear_wrap(register: u32) -> Self {
        Self {
            register,
            filter: Filter::Linear,
            address: AddressMode::Wrap,
            comparison: None,
        }
    }

    /// Linear filtering clamped to edge.
    pub const fn linear_clamp(register: u32) -> Self {
        Self {
            register,
            filter: Filter::Linear,
            address: AddressMode::Clamp,
            comparison: None,
        }
    }

    /// Point filtering clamped to edge.
    pub const fn point_clamp(register: u32) -> Self {
        Self {
            register,
            filter: Filter::Point,
            address: AddressMode::Clamp,
            comparison: None,
        }
    }
}

/// Layout of the arguments a pipeline consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSignatureDesc {
    /// Debug label.
    pub label: String,
    /// Parameters by index.
    pub parameters: Vec<RootParameter>,
    /// Samplers baked into the signature.
    pub static_samplers: Vec<StaticSampler>,
    /// Capabilities.
    pub flags: RootSignatureFlags,
}

/// Programmable stage a shader entry point targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader (`vs_6_6`).
    Vertex,
    /// Pixel shader (`ps_6_6`).
    Pixel,
    /// Compute shader (`cs_6_6`).
    Compute,
}

impl ShaderStage {
    /// The shader-model 6.6 target profile.
    pub const fn profile(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs_6_6",
            ShaderStage::Pixel => "ps_6_6",
            ShaderStage::Compute => "cs_6_6",
        }
    }
}

/// A shader entry point in an HLSL source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderSource {
    /// Path of the `.hlsl` file.
    pub path: PathBuf,
    /// Entry point name (`VSMain`, `PSMain`, `CSMain`, `PSMainAlphaTest`).
    pub entry_point: String,
    /// Target stage.
    pub stage: ShaderStage,
}

impl ShaderSource {
    /// `<dir>/<name>.hlsl` at `entry_point`.
    pub fn new(dir: &Path, name: &str, entry_point: &str, stage: ShaderStage) -> Self {
        Self {
            path: dir.join(format!("{name}.hlsl")),
            entry_point: entry_point.to_owned(),
            stage,
        }
    }

    /// File name without extension, which names the shader program.
    pub fn program_name(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }
}

/// Face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    /// Draw both faces.
    None,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    Back,
}

/// Depth test configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    /// Depth testing on.
    pub test: bool,
    /// Depth writes on.
    pub write: bool,
    /// Comparison.
    pub compare: CompareFunc,
}

impl DepthState {
    /// No depth test, no writes.
    pub const DISABLED: Self = Self {
        test: false,
        write: false,
        compare: CompareFunc::Always,
    };

    /// `LESS` test with writes.
    pub const LESS_WRITE: Self = Self {
        test: true,
        write: true,
        compare: CompareFunc::Less,
    };
}

/// One vertex attribute fed by the input assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputElement {
    /// HLSL semantic (`POSITION`, `TEXCOORD`...).
    pub semantic: &'static str,
    /// Attribute format.
    pub format: VertexFormat,
    /// Byte offset inside the vertex.
    pub offset: u32,
}

/// Vertex attribute formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    /// Two floats.
    Float32x2,
    /// Three floats.
    Float32x3,
    /// Four floats.
    Float32x4,
}

/// A full graphics pipeline state.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsPipelineDesc {
    /// Debug label.
    pub label: String,
    /// Argument layout.
    pub root_signature: RootSignatureId,
    /// Vertex stage.
    pub vertex_shader: ShaderSource,
    /// Pixel stage, if any.
    pub pixel_shader: Option<ShaderSource>,
    /// Vertex attributes.
    pub input_layout: Vec<InputElement>,
    /// Face culling.
    pub cull_mode: CullMode,
    /// Depth test.
    pub depth: DepthState,
    /// Formats of the bound render targets, in slot order.
    pub render_target_formats: Vec<Format>,
    /// Format of the depth target.
    pub depth_format: Option<Format>,
}

/// A compute pipeline state.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputePipelineDesc {
    /// Debug label.
    pub label: String,
    /// Argument layout.
    pub root_signature: RootSignatureId,
    /// Compute stage.
    pub shader: ShaderSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_source_naming() {
        let src = ShaderSource::new(
            Path::new("assets/shaders"),
            "VisibilityPass",
            "PSMainAlphaTest",
            ShaderStage::Pixel,
        );
        assert_eq!(src.program_name(), "VisibilityPass");
        assert_eq!(src.path, Path::new("assets/shaders/VisibilityPass.hlsl"));
        assert_eq!(src.stage.profile(), "ps_6_6");
    }

    #[test]
    fn test_table_len() {
        let table = RootParameter::DescriptorTable {
            ranges: vec![
                DescriptorRange {
                    kind: DescriptorRangeKind::Srv,
                    count: 5,
                    base_register: 0,
                    space: 0,
                },
                DescriptorRange {
                    kind: DescriptorRangeKind::Uav,
                    count: 2,
                    base_register: 0,
                    space: 0,
                },
            ],
        };
        assert_eq!(table.table_len(), 7);
        assert_eq!(RootParameter::Srv { register: 0 }.table_len(), 0);
    }
}
