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

//! Persistent render targets and the states each frame leaves them in.

use cortex_core::math::Vec3;
use cortex_core::renderer::api::{
    Format, HeapType, ResourceDesc, ResourceFlags, ResourceId, ResourceStates,
};
use cortex_core::renderer::{GpuDevice, RenderError, RenderGraph, RgHandle, Uploader};
use cortex_lanes::{GBuffer, DEPTH_FORMAT, GBUFFER_FORMATS, GBUFFER_NAMES};

/// A resource living across frames, imported into each frame's graph with
/// the per-subresource states the previous frame left it in.
#[derive(Debug, Clone)]
pub(crate) struct Tracked {
    pub resource: ResourceId,
    states: Vec<ResourceStates>,
    name: &'static str,
}

impl Tracked {
    /// Wraps a resource whose subresources are all in `state`.
    pub fn new(
        device: &dyn GpuDevice,
        resource: ResourceId,
        state: ResourceStates,
        name: &'static str,
    ) -> Result<Self, RenderError> {
        let count = device.resource_desc(resource)?.subresource_count();
        Ok(Self {
            resource,
            states: vec![state; count as usize],
            name,
        })
    }

    /// Creates a default-heap resource.
    pub fn create(
        device: &dyn GpuDevice,
        desc: &ResourceDesc,
        state: ResourceStates,
        name: &'static str,
    ) -> Result<Self, RenderError> {
        let resource =
            device.create_committed_resource(HeapType::Default, desc, state, None, name)?;
        Self::new(device, resource, state, name)
    }

    pub fn import(&self, graph: &mut RenderGraph) -> Result<RgHandle, RenderError> {
        graph.import_with_states(self.resource, self.states.clone(), self.name)
    }

    /// Remembers the states the compiled graph leaves the resource in.
    pub fn update(&mut self, graph: &RenderGraph, handle: RgHandle) -> Result<(), RenderError> {
        self.states = graph.final_state(handle)?.to_vec();
        Ok(())
    }

    pub fn destroy(&self, device: &dyn GpuDevice) {
        if let Err(err) = device.destroy_resource(self.resource) {
            log::warn!("Failed to destroy '{}': {err}", self.name);
        }
    }
}

/// Depth and the G-buffer planes, sized to the viewport.
#[derive(Debug)]
pub(crate) struct ScreenTargets {
    pub depth: Tracked,
    pub gbuffer: Vec<Tracked>,
}

/// Handles of [`ScreenTargets`] imported into one graph.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScreenHandles {
    pub depth: RgHandle,
    pub gbuffer: GBuffer,
}

impl ScreenTargets {
    pub fn create(device: &dyn GpuDevice, width: u32, height: u32) -> Result<Self, RenderError> {
        let depth = Tracked::create(
            device,
            &ResourceDesc::texture_2d(width, height, DEPTH_FORMAT)
                .with_flags(ResourceFlags::ALLOW_DEPTH_STENCIL),
            ResourceStates::DEPTH_WRITE,
            "Depth",
        )?;
        let mut planes = Vec::with_capacity(GBUFFER_FORMATS.len());
        for (format, name) in GBUFFER_FORMATS.into_iter().zip(GBUFFER_NAMES) {
            match Tracked::create(
                device,
                &ResourceDesc::texture_2d(width, height, format)
                    .with_flags(ResourceFlags::ALLOW_UNORDERED_ACCESS),
                ResourceStates::UNORDERED_ACCESS,
                name,
            ) {
                Ok(plane) => planes.push(plane),
                Err(err) => {
                    depth.destroy(device);
                    planes.iter().for_each(|p: &Tracked| p.destroy(device));
                    return Err(err);
                }
            }
        }
        Ok(Self {
            depth,
            gbuffer: planes,
        })
    }

    pub fn import(&self, graph: &mut RenderGraph) -> Result<ScreenHandles, RenderError> {
        let depth = self.depth.import(graph)?;
        let mut planes = [depth; 5];
        for (handle, plane) in planes.iter_mut().zip(&self.gbuffer) {
            *handle = plane.import(graph)?;
        }
        Ok(ScreenHandles {
            depth,
            gbuffer: GBuffer::from_planes(planes),
        })
    }

    pub fn update(
        &mut self,
        graph: &RenderGraph,
        handles: &ScreenHandles,
    ) -> Result<(), RenderError> {
        self.depth.update(graph, handles.depth)?;
        for (plane, handle) in self.gbuffer.iter_mut().zip(handles.gbuffer.planes()) {
            plane.update(graph, handle)?;
        }
        Ok(())
    }

    pub fn destroy(&self, device: &dyn GpuDevice) {
        self.depth.destroy(device);
        for plane in &self.gbuffer {
            plane.destroy(device);
        }
    }
}

/// 1x1 RGBA16F environment maps of a uniform sky, used when the scene
/// brings no maps of its own.
#[derive(Debug)]
pub(crate) struct UniformSky {
    pub color: Vec3,
    pub diffuse: ResourceId,
    pub specular: ResourceId,
}

impl UniformSky {
    pub fn upload(uploader: &Uploader, color: Vec3) -> Result<Self, RenderError> {
        let texel: Vec<u8> = [color.x, color.y, color.z, 1.0]
            .into_iter()
            .flat_map(|c| half::f16::from_f32(c).to_le_bytes())
            .collect();
        let desc = ResourceDesc::texture_2d(1, 1, Format::Rgba16Float);
        let diffuse = uploader.upload_texture_2d(
            &desc,
            &[&texel],
            ResourceStates::ALL_SHADER_RESOURCE,
            "Sky Diffuse",
        )?;
        let specular = match uploader.upload_texture_2d(
            &desc,
            &[&texel],
            ResourceStates::ALL_SHADER_RESOURCE,
            "Sky Specular",
        ) {
            Ok(specular) => specular,
            Err(err) => {
                let _ = uploader.device().destroy_resource(diffuse);
                return Err(err.into());
            }
        };
        Ok(Self {
            color,
            diffuse,
            specular,
        })
    }

    pub fn destroy(&self, device: &dyn GpuDevice) {
        for resource in [self.diffuse, self.specular] {
            if let Err(err) = device.destroy_resource(resource) {
                log::warn!("Failed to destroy sky texture: {err}");
            }
        }
    }
}
