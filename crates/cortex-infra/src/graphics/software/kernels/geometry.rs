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

//! Triangle fetch shared by the screen-space passes that rebuild geometry
//! from the visibility buffer.

use bytemuck::Zeroable;
use cortex_core::math::{Mat4, Vec2, Vec3, Vec4};
use cortex_core::renderer::scene::{
    VBInstanceData, VBMeshTableEntry, Vertex, VisibilityPayload, INDEX_FORMAT_R16,
};

use super::super::bindings::{Bindings, TextureView};
use super::super::validation::Fault;

/// The payload stored at a pixel, `None` for background.
pub(super) fn payload(visibility: &TextureView, x: u32, y: u32) -> Option<VisibilityPayload> {
    let [a, b, ..] = visibility.load_uint(x as i32, y as i32, 0, 0);
    VisibilityPayload::unpack([a, b])
}

/// World position under a pixel center, from its depth.
pub(super) fn world_position(inv_view_proj: &Mat4, ndc: Vec2, depth: f32) -> Vec3 {
    inv_view_proj.project_point3(Vec3::new(ndc.x, ndc.y, depth))
}

/// The three vertices of `triangle` of the draw that produced `instance`.
///
/// Vertex and index buffers are reached through the mesh entry's bindless
/// indices. Reads past the end of a buffer return zero, as raw buffer loads
/// do.
pub(super) fn fetch_triangle(
    bindings: &Bindings<'_>,
    mesh: &VBMeshTableEntry,
    instance: &VBInstanceData,
    triangle: u32,
) -> Result<[Vertex; 3], Fault> {
    let indices = bindings.heap_buffer(mesh.index_buffer_index)?;
    let vertices = bindings.heap_buffer(mesh.vertex_buffer_index)?;
    let stride = mesh.vertex_stride_bytes as usize;
    let mut out = [Vertex::zeroed(); 3];
    for (k, vertex) in out.iter_mut().enumerate() {
        let i = (instance.first_index + triangle * 3 + k as u32) as usize;
        let index = if mesh.index_format == INDEX_FORMAT_R16 {
            indices.load::<u16>(i * 2).map(u32::from)
        } else {
            indices.load::<u32>(i * 4)
        }
        .unwrap_or(0);
        let v = index.wrapping_add(instance.base_vertex) as usize;
        *vertex = vertices.load::<Vertex>(v * stride).unwrap_or_else(Vertex::zeroed);
    }
    Ok(out)
}

/// Clip-space positions of `vertices` under `world` then `view_proj`.
pub(super) fn clip_positions(vertices: &[Vertex; 3], world: &Mat4, view_proj: &Mat4) -> [Vec4; 3] {
    let transform = *view_proj * *world;
    vertices.map(|v| transform * v.position.extend(1.0))
}
