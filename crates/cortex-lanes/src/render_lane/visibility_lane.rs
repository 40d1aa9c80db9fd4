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

//! Visibility buffer rasterization.
//!
//! Every visible pixel ends up holding `(triangle | draw << 24, instance)`;
//! later passes rebuild the surface from that payload instead of reading a
//! fat G-buffer written by the rasterizer.

use std::sync::Arc;

use cortex_core::config::RendererConfig;
use cortex_core::math::Mat4;
use cortex_core::renderer::api::{
    CullMode, DepthState, DepthStencilViewDesc, DescriptorHeapDesc, DescriptorHeapType,
    GraphicsPipelineDesc, IndexBufferView, InputElement, PipelineBindPoint, PipelineId,
    PrimitiveTopology, RenderTargetViewDesc, RootSignatureId, ScissorRect, ShaderStage,
    UnorderedAccessViewDesc, VertexBufferView, VertexFormat, Viewport,
};
use cortex_core::renderer::api::{CpuDescriptorHandle, GpuVirtualAddress};
use cortex_core::renderer::scene::bindings::{self, entry_points, programs, visibility};
use cortex_core::renderer::scene::payload::{BACKGROUND, MAX_DRAW_INDEX};
use cortex_core::renderer::scene::VisibilityConstants;
use cortex_core::renderer::{GpuDevice, PassType, RenderError, RenderGraph, RgHandle, RgUsage};

use super::{shader, RenderLane, DEPTH_FORMAT, VISIBILITY_FORMAT};

/// The four visibility pipelines: alpha handling times face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VisibilityVariant {
    /// Opaque, back faces culled.
    Opaque,
    /// Opaque, both faces drawn.
    OpaqueDoubleSided,
    /// Alpha-tested, back faces culled.
    AlphaTest,
    /// Alpha-tested, both faces drawn.
    AlphaTestDoubleSided,
}

impl VisibilityVariant {
    /// Every variant, in the order draws of one mesh are issued.
    pub const ALL: [VisibilityVariant; 4] = [
        VisibilityVariant::Opaque,
        VisibilityVariant::OpaqueDoubleSided,
        VisibilityVariant::AlphaTest,
        VisibilityVariant::AlphaTestDoubleSided,
    ];

    /// The variant drawing a material with these properties.
    pub const fn of(alpha_tested: bool, double_sided: bool) -> Self {
        match (alpha_tested, double_sided) {
            (false, false) => VisibilityVariant::Opaque,
            (false, true) => VisibilityVariant::OpaqueDoubleSided,
            (true, false) => VisibilityVariant::AlphaTest,
            (true, true) => VisibilityVariant::AlphaTestDoubleSided,
        }
    }

    /// Position in [`VisibilityVariant::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// `true` for the alpha-tested variants.
    pub const fn alpha_tested(self) -> bool {
        matches!(
            self,
            VisibilityVariant::AlphaTest | VisibilityVariant::AlphaTestDoubleSided
        )
    }

    /// `true` for the variants drawing both faces.
    pub const fn double_sided(self) -> bool {
        matches!(
            self,
            VisibilityVariant::OpaqueDoubleSided | VisibilityVariant::AlphaTestDoubleSided
        )
    }

    fn label(self) -> &'static str {
        match self {
            VisibilityVariant::Opaque => "Visibility Opaque",
            VisibilityVariant::OpaqueDoubleSided => "Visibility Opaque DS",
            VisibilityVariant::AlphaTest => "Visibility AlphaTest",
            VisibilityVariant::AlphaTestDoubleSided => "Visibility AlphaTest DS",
        }
    }
}

/// One instanced draw: a contiguous range of the instance table sharing a
/// mesh and a pipeline variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityDraw {
    /// Index into the mesh table.
    pub mesh: u32,
    /// Pipeline the range is drawn with.
    pub variant: VisibilityVariant,
    /// First record of the range in the instance table.
    pub first_instance: u32,
    /// Records in the range.
    pub instance_count: u32,
    /// Indices of the mesh.
    pub index_count: u32,
    /// Vertex buffer of the mesh.
    pub vertex_buffer: VertexBufferView,
    /// Index buffer of the mesh.
    pub index_buffer: IndexBufferView,
}

/// What the visibility pass of one frame reads and writes.
#[derive(Debug, Clone)]
pub struct VisibilityInputs {
    /// `R32G32_UINT` payload target.
    pub visibility: RgHandle,
    /// Scene depth.
    pub depth: RgHandle,
    /// World to clip.
    pub view_proj: Mat4,
    /// Instance table of this frame.
    pub instances: GpuVirtualAddress,
    /// Material table of this frame.
    pub materials: GpuVirtualAddress,
    /// Draws in submission order. Empty ranges are dropped.
    pub draws: Vec<VisibilityDraw>,
    /// Target width.
    pub width: u32,
    /// Target height.
    pub height: u32,
}

/// Rasterizes instance ranges into the visibility buffer.
#[derive(Debug)]
pub struct VisibilityLane {
    root_signature: RootSignatureId,
    pipelines: [PipelineId; 4],
    /// CPU-only copy of the visibility UAV, which UAV clears read from.
    clear_view: CpuDescriptorHandle,
}

impl VisibilityLane {
    /// Creates the root signature, the four pipelines and the CPU-only heap
    /// slot the visibility clear goes through.
    pub fn new(device: &Arc<dyn GpuDevice>, config: &RendererConfig) -> Result<Self, RenderError> {
        let root_signature = device.create_root_signature(&bindings::visibility_root_signature())?;
        let mut pipelines = Vec::with_capacity(VisibilityVariant::ALL.len());
        for variant in VisibilityVariant::ALL {
            let pixel_entry = if variant.alpha_tested() {
                entry_points::PS_MAIN_ALPHA_TEST
            } else {
                entry_points::PS_MAIN
            };
            pipelines.push(device.create_graphics_pipeline(&GraphicsPipelineDesc {
                label: variant.label().into(),
                root_signature,
                vertex_shader: shader(
                    config,
                    programs::VISIBILITY,
                    entry_points::VS_MAIN,
                    ShaderStage::Vertex,
                ),
                pixel_shader: Some(shader(
                    config,
                    programs::VISIBILITY,
                    pixel_entry,
                    ShaderStage::Pixel,
                )),
                input_layout: vec![
                    InputElement {
                        semantic: "POSITION",
                        format: VertexFormat::Float32x3,
                        offset: 0,
                    },
                    InputElement {
                        semantic: "TEXCOORD",
                        format: VertexFormat::Float32x2,
                        offset: 40,
                    },
                ],
                cull_mode: if variant.double_sided() {
                    CullMode::None
                } else {
                    CullMode::Back
                },
                depth: DepthState::LESS_WRITE,
                render_target_formats: vec![VISIBILITY_FORMAT],
                depth_format: Some(DEPTH_FORMAT),
            })?);
        }
        let pipelines: [PipelineId; 4] = [pipelines[0], pipelines[1], pipelines[2], pipelines[3]];

        let clear_heap = device.create_descriptor_heap(&DescriptorHeapDesc {
            ty: DescriptorHeapType::CbvSrvUav,
            capacity: 1,
            shader_visible: false,
        })?;
        Ok(Self {
            root_signature,
            pipelines,
            clear_view: clear_heap.cpu_start,
        })
    }

    /// The pipeline of `variant`.
    pub fn pipeline(&self, variant: VisibilityVariant) -> PipelineId {
        self.pipelines[variant.index()]
    }

    /// Declares the clear of the visibility buffer followed by the draws.
    ///
    /// The clear writes the background sentinel through a UAV, so it is its
    /// own pass and the graph moves the buffer to `RENDER_TARGET` between the
    /// two.
    pub fn declare(&self, graph: &mut RenderGraph, inputs: VisibilityInputs) {
        let visibility = inputs.visibility;
        let clear_view = self.clear_view;
        graph
            .add_pass("VisibilityClear", PassType::Graphics)
            .write(visibility, RgUsage::UNORDERED_ACCESS)
            .execute(move |ctx| {
                let target = ctx.resources.resource(visibility)?;
                let uav = UnorderedAccessViewDesc::Texture2D {
                    format: VISIBILITY_FORMAT,
                    mip_slice: 0,
                };
                let slot = ctx
                    .descriptors
                    .allocate_transient_range(DescriptorHeapType::CbvSrvUav, 1)?;
                ctx.device.create_unordered_access_view(target, &uav, slot.cpu)?;
                ctx.device.create_unordered_access_view(target, &uav, clear_view)?;
                let heap = ctx.descriptors.shader_visible_heap();
                ctx.cmd.set_descriptor_heaps(&[heap]);
                ctx.cmd
                    .clear_unordered_access_view_uint(slot.gpu, clear_view, target, [BACKGROUND; 4]);
                Ok(())
            });

        let root_signature = self.root_signature;
        let pipelines = self.pipelines;
        let VisibilityInputs {
            visibility,
            depth,
            view_proj,
            instances,
            materials,
            draws,
            width,
            height,
        } = inputs;
        let draws: Vec<VisibilityDraw> = draws
            .into_iter()
            .filter(|d| d.instance_count > 0 && d.index_count > 0)
            .collect();
        graph
            .add_pass("Visibility", PassType::Graphics)
            .write(visibility, RgUsage::RENDER_TARGET)
            .write(depth, RgUsage::DEPTH_STENCIL_WRITE)
            .execute(move |ctx| {
                let target = ctx.resources.resource(visibility)?;
                let depth_target = ctx.resources.resource(depth)?;
                let rtv = ctx.descriptors.allocate_transient_range(DescriptorHeapType::Rtv, 1)?;
                let dsv = ctx.descriptors.allocate_transient_range(DescriptorHeapType::Dsv, 1)?;
                ctx.device.create_render_target_view(
                    target,
                    &RenderTargetViewDesc {
                        format: VISIBILITY_FORMAT,
                        mip_slice: 0,
                        array_slice: 0,
                    },
                    rtv.cpu,
                )?;
                ctx.device.create_depth_stencil_view(
                    depth_target,
                    &DepthStencilViewDesc {
                        format: DEPTH_FORMAT,
                        mip_slice: 0,
                        array_slice: 0,
                    },
                    dsv.cpu,
                )?;
                let heap = ctx.descriptors.shader_visible_heap();

                let cmd = &mut *ctx.cmd;
                cmd.set_descriptor_heaps(&[heap]);
                cmd.set_render_targets(&[rtv.cpu], Some(dsv.cpu));
                cmd.clear_depth_stencil_view(dsv.cpu, 1.0);
                cmd.set_viewport(Viewport::from_size(width, height));
                cmd.set_scissor_rect(ScissorRect::from_size(width, height));
                cmd.set_primitive_topology(PrimitiveTopology::TriangleList);
                cmd.set_root_signature(PipelineBindPoint::Graphics, root_signature);
                cmd.set_root_shader_resource_view(
                    PipelineBindPoint::Graphics,
                    visibility::INSTANCES,
                    instances,
                );
                cmd.set_root_shader_resource_view(
                    PipelineBindPoint::Graphics,
                    visibility::MATERIALS,
                    materials,
                );

                let mut bound: Option<VisibilityVariant> = None;
                for (index, draw) in draws.iter().enumerate() {
                    if bound != Some(draw.variant) {
                        cmd.set_pipeline(pipelines[draw.variant.index()]);
                        bound = Some(draw.variant);
                    }
                    let constants = VisibilityConstants {
                        view_proj,
                        mesh_index: draw.mesh,
                        draw_index: index as u32 & MAX_DRAW_INDEX,
                        instance_base: draw.first_instance,
                        _pad: 0,
                    };
                    cmd.set_root_constants(
                        PipelineBindPoint::Graphics,
                        visibility::CONSTANTS,
                        bytemuck::cast_slice(&[constants]),
                        0,
                    );
                    cmd.set_vertex_buffers(0, &[draw.vertex_buffer]);
                    cmd.set_index_buffer(Some(draw.index_buffer));
                    cmd.draw_indexed_instanced(draw.index_count, draw.instance_count, 0, 0, 0);
                }
                log::trace!("Visibility: {} draws", draws.len());
                Ok(())
            });
    }
}

impl RenderLane for VisibilityLane {
    fn strategy_name(&self) -> &'static str {
        "VisibilityBuffer"
    }
}

/// Groups a frame's instance records into draws.
///
/// `records` is `(mesh, variant)` per instance, already sorted by mesh and
/// then variant, as laid out in the instance table. Consecutive records with
/// the same key become one draw, so each mesh yields at most four.
pub fn partition_draws(records: &[(u32, VisibilityVariant)]) -> Vec<(u32, VisibilityVariant, u32, u32)> {
    let mut ranges: Vec<(u32, VisibilityVariant, u32, u32)> = Vec::new();
    for (i, &(mesh, variant)) in records.iter().enumerate() {
        match ranges.last_mut() {
            Some((m, v, _, count)) if *m == mesh && *v == variant => *count += 1,
            _ => ranges.push((mesh, variant, i as u32, 1)),
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_axes() {
        assert_eq!(VisibilityVariant::of(false, false), VisibilityVariant::Opaque);
        assert_eq!(
            VisibilityVariant::of(true, true),
            VisibilityVariant::AlphaTestDoubleSided
        );
        for variant in VisibilityVariant::ALL {
            assert_eq!(
                VisibilityVariant::of(variant.alpha_tested(), variant.double_sided()),
                variant
            );
            assert_eq!(VisibilityVariant::ALL[variant.index()], variant);
        }
    }

    #[test]
    fn test_partition_yields_at_most_four_ranges_per_mesh() {
        use VisibilityVariant::*;
        let records = [
            (0, Opaque),
            (0, Opaque),
            (0, OpaqueDoubleSided),
            (0, AlphaTest),
            (0, AlphaTestDoubleSided),
            (0, AlphaTestDoubleSided),
            (1, AlphaTest),
        ];
        let ranges = partition_draws(&records);
        assert_eq!(
            ranges,
            vec![
                (0, Opaque, 0, 2),
                (0, OpaqueDoubleSided, 2, 1),
                (0, AlphaTest, 3, 1),
                (0, AlphaTestDoubleSided, 4, 2),
                (1, AlphaTest, 6, 1),
            ]
        );
    }

    #[test]
    fn test_partition_of_nothing_is_empty() {
        assert!(partition_draws(&[]).is_empty());
    }
}
