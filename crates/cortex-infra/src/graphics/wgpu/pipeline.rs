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

//! Pipeline state objects compiled from the WGSL programs.
//!
//! A pipeline names its program by the HLSL file stem and entry point, the
//! same way it does on the software device. Render pipelines are finished
//! lazily, once per vertex stride, since the stride comes from the bound
//! vertex buffer rather than the pipeline description.

use std::collections::HashMap;
use std::sync::Arc;

use cortex_core::renderer::api::{
    ComputePipelineDesc, GraphicsPipelineDesc, RootSignatureDesc, RootSignatureId, ShaderSource,
    ShaderStage,
};
use cortex_core::renderer::PipelineError;
use parking_lot::Mutex;

use crate::graphics::checks;

use super::conversions::IntoWgpu;
use super::shaders::{self, Binding, Program};
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

    pub fn layout(&self) -> &ProgramLayout {
        match self {
            Pipeline::Graphics(p) => &p.layout,
            Pipeline::Compute(p) => &p.layout,
        }
    }
}

/// How a program's bind groups are filled from root arguments.
#[derive(Debug)]
pub(crate) struct ProgramLayout {
    pub program: &'static Program,
    pub bindings: Vec<Binding>,
    pub constant_offsets: Vec<Option<u32>>,
    pub group: wgpu::BindGroupLayout,
    pub samplers: HashMap<u32, wgpu::Sampler>,
    pipeline_layout: wgpu::PipelineLayout,
}

#[derive(Debug)]
pub(crate) struct GraphicsPipeline {
    pub label: String,
    pub root_signature: RootSignatureId,
    pub desc: GraphicsPipelineDesc,
    pub layout: ProgramLayout,
    module: wgpu::ShaderModule,
    vertex_entry: &'static str,
    pixel_entry: Option<&'static str>,
    variants: Mutex<HashMap<u64, Arc<wgpu::RenderPipeline>>>,
}

#[derive(Debug)]
pub(crate) struct ComputePipeline {
    pub label: String,
    pub root_signature: RootSignatureId,
    pub layout: ProgramLayout,
    pub pipeline: wgpu::ComputePipeline,
}

fn not_found(shader: &ShaderSource) -> PipelineError {
    PipelineError::ShaderNotFound {
        path: shader.path.clone(),
        entry_point: shader.entry_point.clone(),
    }
}

fn compilation_failed(label: &str, details: impl Into<String>) -> PipelineError {
    PipelineError::CompilationFailed {
        label: label.to_owned(),
        details: details.into(),
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

/// Fails with whatever `wgpu` reported while the objects of `label` were
/// created.
fn check_uncaptured(shared: &Shared, label: &str) -> Result<(), PipelineError> {
    let errors = shared.take_uncaptured();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(compilation_failed(label, errors.join("\n")))
    }
}

fn program_layout(
    shared: &Shared,
    label: &str,
    program: &'static Program,
    signature: &RootSignatureDesc,
) -> Result<ProgramLayout, PipelineError> {
    let bindings =
        shaders::bindings(program, signature).map_err(|e| compilation_failed(label, e))?;
    let entries: Vec<_> = bindings.iter().map(|b| b.layout_entry(program)).collect();
    let group = shared
        .device
        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{label}_Arguments")),
            entries: &entries,
        });
    let samplers = signature
        .static_samplers
        .iter()
        .map(|s| (s.register, shared.device.create_sampler(&(*s).into_wgpu())))
        .collect();
    let mut groups = vec![Some(&group)];
    if program.bindless {
        groups.push(Some(&shared.bindless.layout));
    }
    let pipeline_layout = shared
        .device
        .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{label}_Layout")),
            bind_group_layouts: &groups,
            immediate_size: 0,
        });
    Ok(ProgramLayout {
        program,
        bindings,
        constant_offsets: shaders::constant_offsets(signature),
        group,
        samplers,
        pipeline_layout,
    })
}

fn module(shared: &Shared, label: &str, program: &Program) -> wgpu::ShaderModule {
    shared
        .device
        .create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label} ({})", program.name)),
            source: wgpu::ShaderSource::Wgsl(program.source().into()),
        })
}

pub(crate) fn create_graphics(
    shared: &Shared,
    desc: &GraphicsPipelineDesc,
) -> Result<Pipeline, PipelineError> {
    let signature = root_signature(shared, &desc.label, desc.root_signature)?;
    checks::check_graphics_desc(desc)?;
    let name = desc.vertex_shader.program_name();
    let program = shaders::program(name)
        .filter(|p| p.graphics)
        .ok_or_else(|| not_found(&desc.vertex_shader))?;
    checks::check_layout(&desc.label, name, checks::program_root_signature(name), &signature)?;
    let vertex_entry = shaders::entry_point(&desc.vertex_shader.entry_point)
        .ok_or_else(|| not_found(&desc.vertex_shader))?;
    let pixel_entry = desc
        .pixel_shader
        .as_ref()
        .map(|pixel| shaders::entry_point(&pixel.entry_point).ok_or_else(|| not_found(pixel)))
        .transpose()?;
    for element in &desc.input_layout {
        if shaders::semantic_location(element.semantic).is_none() {
            return Err(compilation_failed(
                &desc.label,
                format!("no vertex input for semantic {}", element.semantic),
            ));
        }
    }

    shared.take_uncaptured();
    let layout = program_layout(shared, &desc.label, program, &signature)?;
    let module = module(shared, &desc.label, program);
    let pipeline = GraphicsPipeline {
        label: desc.label.clone(),
        root_signature: desc.root_signature,
        desc: desc.clone(),
        layout,
        module,
        vertex_entry,
        pixel_entry,
        variants: Mutex::new(HashMap::new()),
    };
    // Mesh vertices are 48 bytes; building that variant now surfaces shader
    // errors at creation.
    let stride = if desc.input_layout.is_empty() { 0 } else { 48 };
    pipeline.variant(shared, stride);
    check_uncaptured(shared, &desc.label)?;
    Ok(Pipeline::Graphics(pipeline))
}

pub(crate) fn create_compute(
    shared: &Shared,
    desc: &ComputePipelineDesc,
) -> Result<Pipeline, PipelineError> {
    let signature = root_signature(shared, &desc.label, desc.root_signature)?;
    checks::check_stage(&desc.label, &desc.shader, ShaderStage::Compute)?;
    let name = desc.shader.program_name();
    let program = shaders::program(name)
        .filter(|p| !p.graphics)
        .ok_or_else(|| not_found(&desc.shader))?;
    let entry = shaders::entry_point(&desc.shader.entry_point)
        .filter(|e| *e == "cs_main")
        .ok_or_else(|| not_found(&desc.shader))?;
    checks::check_layout(&desc.label, name, checks::program_root_signature(name), &signature)?;

    shared.take_uncaptured();
    let layout = program_layout(shared, &desc.label, program, &signature)?;
    let module = module(shared, &desc.label, program);
    let pipeline = shared
        .device
        .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&desc.label),
            layout: Some(&layout.pipeline_layout),
            module: &module,
            entry_point: Some(entry),
            compilation_options: Default::default(),
            cache: None,
        });
    check_uncaptured(shared, &desc.label)?;
    Ok(Pipeline::Compute(ComputePipeline {
        label: desc.label.clone(),
        root_signature: desc.root_signature,
        layout,
        pipeline,
    }))
}

impl GraphicsPipeline {
    /// The render pipeline for vertex buffers of `stride` bytes.
    pub fn variant(&self, shared: &Shared, stride: u64) -> Arc<wgpu::RenderPipeline> {
        let mut variants = self.variants.lock();
        if let Some(pipeline) = variants.get(&stride) {
            return pipeline.clone();
        }
        let pipeline = Arc::new(self.build(shared, stride));
        variants.insert(stride, pipeline.clone());
        pipeline
    }

    fn build(&self, shared: &Shared, stride: u64) -> wgpu::RenderPipeline {
        let attributes: Vec<wgpu::VertexAttribute> = self
            .desc
            .input_layout
            .iter()
            .filter_map(|element| {
                Some(wgpu::VertexAttribute {
                    format: element.format.into_wgpu(),
                    offset: u64::from(element.offset),
                    shader_location: shaders::semantic_location(element.semantic)?,
                })
            })
            .collect();
        let buffers = if attributes.is_empty() {
            Vec::new()
        } else {
            vec![wgpu::VertexBufferLayout {
                array_stride: stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            }]
        };
        let targets: Vec<Option<wgpu::ColorTargetState>> = self
            .desc
            .render_target_formats
            .iter()
            .map(|format| {
                let format: Option<wgpu::TextureFormat> = (*format).into_wgpu();
                format.map(|format| wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();
        let depth_stencil = self.desc.depth_format.and_then(|format| {
            let format: Option<wgpu::TextureFormat> = format.into_wgpu();
            Some(wgpu::DepthStencilState {
                format: format?,
                depth_write_enabled: Some(self.desc.depth.write),
                depth_compare: Some(if self.desc.depth.test {
                    self.desc.depth.compare.into_wgpu()
                } else {
                    wgpu::CompareFunction::Always
                }),
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            })
        });

        shared
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&self.label),
                layout: Some(&self.layout.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.module,
                    entry_point: Some(self.vertex_entry),
                    buffers: &buffers,
                    compilation_options: Default::default(),
                },
                fragment: self.pixel_entry.map(|entry| wgpu::FragmentState {
                    module: &self.module,
                    entry_point: Some(entry),
                    targets: &targets,
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: self.desc.cull_mode.into_wgpu(),
                    ..Default::default()
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
    }
}
