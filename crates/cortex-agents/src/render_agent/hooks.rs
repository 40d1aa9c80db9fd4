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

//! Extension points around the built-in passes.

use cortex_core::renderer::api::{DepthStencilViewDesc, DescriptorHeapType};
use cortex_core::renderer::scene::RenderScene;
use cortex_core::renderer::{PassType, RenderError, RenderGraph, RgHandle, RgUsage};
use cortex_lanes::{FrameView, SunShadow, DEPTH_FORMAT};

/// What a shadow hook may render into.
#[derive(Debug, Clone, Copy)]
pub struct ShadowContext<'a> {
    /// The scene being drawn.
    pub scene: &'a RenderScene,
    /// Camera matrices of the frame.
    pub view: &'a FrameView,
    /// `D32_FLOAT` array, one slice per cascade.
    pub shadow_map: RgHandle,
    /// Edge length of one slice.
    pub map_size: u32,
    /// Slices in the array.
    pub cascades: u32,
}

/// Declares the passes filling the sun shadow map.
///
/// Runs before the visibility pass. Returning `None` leaves the sun
/// unshadowed for the frame.
pub trait ShadowHook: Send {
    /// Declares this frame's shadow passes.
    fn declare(
        &mut self,
        graph: &mut RenderGraph,
        ctx: &ShadowContext<'_>,
    ) -> Result<Option<SunShadow>, RenderError>;
}

/// The default shadow hook: every slice is cleared to depth 1, which reads
/// as fully lit.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClearShadowMap;

impl ShadowHook for ClearShadowMap {
    fn declare(
        &mut self,
        graph: &mut RenderGraph,
        ctx: &ShadowContext<'_>,
    ) -> Result<Option<SunShadow>, RenderError> {
        let shadow_map = ctx.shadow_map;
        let cascades = ctx.cascades.max(1);
        graph
            .add_pass("ShadowClear", PassType::Graphics)
            .write(shadow_map, RgUsage::DEPTH_STENCIL_WRITE)
            .execute(move |pass| {
                let target = pass.resources.resource(shadow_map)?;
                let dsvs = pass
                    .descriptors
                    .allocate_transient_range(DescriptorHeapType::Dsv, cascades)?;
                for slice in 0..cascades {
                    let dsv = dsvs.at(slice).cpu;
                    pass.device.create_depth_stencil_view(
                        target,
                        &DepthStencilViewDesc {
                            format: DEPTH_FORMAT,
                            mip_slice: 0,
                            array_slice: slice,
                        },
                        dsv,
                    )?;
                    pass.cmd.clear_depth_stencil_view(dsv, 1.0);
                }
                Ok(())
            });
        Ok(None)
    }
}

/// What a post-process hook reads and writes.
#[derive(Debug, Clone, Copy)]
pub struct PostProcessContext {
    /// Lit `R16G16B16A16_FLOAT` color.
    pub hdr: RgHandle,
    /// Screen-space motion in pixels.
    pub velocity: RgHandle,
    /// Scene depth.
    pub depth: RgHandle,
    /// The swap-chain image presented after the hook.
    pub back_buffer: RgHandle,
    /// Target width.
    pub width: u32,
    /// Target height.
    pub height: u32,
}

/// Declares passes between lighting and present, typically tone mapping
/// into the back buffer.
pub trait PostProcessHook: Send {
    /// Declares this frame's post-processing passes.
    fn declare(
        &mut self,
        graph: &mut RenderGraph,
        ctx: &PostProcessContext,
    ) -> Result<(), RenderError>;
}
