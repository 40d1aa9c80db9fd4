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

//! Pipeline state objects.
//!
//! The device has no shader compiler. A pipeline names a program by the
//! HLSL file stem and entry point, and creation binds it to the built-in
//! kernel implementing that program. Unknown programs fail the way a missing
//! shader file does.

use std::sync::Arc;

use cortex_core::renderer::api::{
    ComputePipelineDesc, CullMode, DepthState, Format, GraphicsPipelineDesc, InputElement,
    RootSignatureDesc, RootSignatureId, ShaderSource, ShaderStage,
};
use cortex_core::renderer::PipelineError;

use crate::graphics::checks;

use super::kernels::{self, ComputeKernel, GraphicsProgram};
use super::state::Shared;

#[derive(Debug)]
pub(crate) enum Pipeline {
    Graphics(GraphicsPipeline),
    Compute(ComputePipeline),
}

impl Pipeline {
    pub fn label(&self) -> &str {
        match self {
            Pipeline::Graphics(p) => &p.label,
            Pipeline::Compute(p) => &p.label,
        }
    }

    pub fn root_signature(&self) -> RootSignatureId {
        match self {
            Pipeline::Graphics(p) => p.root_signature,
            Pipeline::Compute(p) => p.root_signature,
        }
    }
}

#[derive(Debug)]
pub(crate) struct GraphicsPipeline {
    pub label: String,
    pub root_signature: RootSignatureId,
    pub program: GraphicsProgram,
    pub input_layout: Vec<InputElement>,
    pub cull_mode: CullMode,
    pub depth: DepthState,
    pub render_target_formats: Vec<Format>,
    pub depth_format: Option<Format>,
}

#[derive(Debug)]
pub(crate) struct ComputePipeline {
    pub label: String,
    pub root_signature: RootSignatureId,
    pub kernel: ComputeKernel,
}

fn not_found(shader: &ShaderSource) -> PipelineError {
    PipelineError::ShaderNotFound {
        path: shader.path.clone(),
        entry_point: shader.entry_point.clone(),
    }
}

fn root_signature(
    shared: &Shared,
    label: &str,
    id: RootSignatureId,
) -> Result<Arc<RootSignatureDesc>, PipelineError> {
    shared.root_signature(id).ok_or_else(|| {
        PipelineError::InvalidRootSignature(format!("'{label}' references unknown {id:?}"))
    })
}

pub(crate) fn create_graphics(
    shared: &Shared,
    desc: &GraphicsPipelineDesc,
) -> Result<Pipeline, PipelineError> {
    let signature = root_signature(shared, &desc.label, desc.root_signature)?;
    checks::check_graphics_desc(desc)?;
    let program = kernels::graphics_program(&desc.vertex_shader, desc.pixel_shader.as_ref())
        .ok_or_else(|| not_found(desc.pixel_shader.as_ref().unwrap_or(&desc.vertex_shader)))?;
    let name = desc.vertex_shader.program_name();
    checks::check_layout(&desc.label, name, checks::program_root_signature(name), &signature)?;
    Ok(Pipeline::Graphics(GraphicsPipeline {
        label: desc.label.clone(),
        root_signature: desc.root_signature,
        program,
        input_layout: desc.input_layout.clone(),
        cull_mode: desc.cull_mode,
        depth: desc.depth,
        render_target_formats: desc.render_target_formats.clone(),
        depth_format: desc.depth_format,
    }))
}

pub(crate) fn create_compute(
    shared: &Shared,
    desc: &ComputePipelineDesc,
) -> Result<Pipeline, PipelineError> {
    let signature = root_signature(shared, &desc.label, desc.root_signature)?;
    checks::check_stage(&desc.label, &desc.shader, ShaderStage::Compute)?;
    let kernel = kernels::compute_kernel(desc.shader.program_name(), &desc.shader.entry_point)
        .ok_or_else(|| not_found(&desc.shader))?;
    let name = desc.shader.program_name();
    checks::check_layout(&desc.label, name, checks::program_root_signature(name), &signature)?;
    Ok(Pipeline::Compute(ComputePipeline {
        label: desc.label.clone(),
        root_signature: desc.root_signature,
        kernel,
    }))
}
