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

//! CPU mesh data and its uploaded, bindless-registered GPU form.

use std::sync::Arc;

use super::gpu_types::{Vertex, VBMeshTableEntry, INDEX_FORMAT_R16, INDEX_FORMAT_R32, VERTEX_STRIDE};
use super::payload::MAX_TRIANGLE_INDEX;
use crate::math::{Aabb, Sphere, Vec2, Vec3, Vec4};
use crate::renderer::api::{
    IndexBufferView, IndexFormat, ResourceId, ResourceStates, ShaderResourceViewDesc,
    VertexBufferView,
};
use crate::renderer::bindless::{BindlessRegistry, BindlessSlot};
use crate::renderer::error::RenderError;
use crate::renderer::traits::GpuDevice;
use crate::renderer::upload::Uploader;

/// Index data of a mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshIndices {
    /// 16-bit indices.
    U16(Vec<u16>),
    /// 32-bit indices.
    U32(Vec<u32>),
}

impl MeshIndices {
    /// Number of indices.
    pub fn len(&self) -> usize {
        match self {
            MeshIndices::U16(v) => v.len(),
            MeshIndices::U32(v) => v.len(),
        }
    }

    /// `true` without indices.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `i`-th index, widened.
    pub fn get(&self, i: usize) -> Option<u32> {
        match self {
            MeshIndices::U16(v) => v.get(i).map(|&x| u32::from(x)),
            MeshIndices::U32(v) => v.get(i).copied(),
        }
    }

    /// Element size.
    pub fn format(&self) -> IndexFormat {
        match self {
            MeshIndices::U16(_) => IndexFormat::U16,
            MeshIndices::U32(_) => IndexFormat::U32,
        }
    }

    /// Little-endian bytes, zero-padded to a multiple of four for raw views.
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = match self {
            MeshIndices::U16(v) => bytemuck::cast_slice::<u16, u8>(v).to_vec(),
            MeshIndices::U32(v) => bytemuck::cast_slice::<u32, u8>(v).to_vec(),
        };
        bytes.resize(bytes.len().next_multiple_of(4), 0);
        bytes
    }
}

/// Triangle-list geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    /// Interleaved vertices.
    pub vertices: Vec<Vertex>,
    /// Triangle-list indices.
    pub indices: MeshIndices,
}

impl MeshData {
    /// Checks the index buffer forms whole triangles inside the vertex range.
    pub fn validate(&self) -> Result<(), RenderError> {
        let count = self.indices.len();
        if count == 0 || count % 3 != 0 {
            return Err(RenderError::InvalidScene(format!(
                "mesh index count {count} is not a positive multiple of 3"
            )));
        }
        if (count / 3) as u64 > u64::from(MAX_TRIANGLE_INDEX) + 1 {
            return Err(RenderError::InvalidScene(format!(
                "mesh has {} triangles, the payload addresses at most {}",
                count / 3,
                MAX_TRIANGLE_INDEX + 1
            )));
        }
        let vertices = self.vertices.len() as u32;
        if (0..count).filter_map(|i| self.indices.get(i)).any(|i| i >= vertices) {
            return Err(RenderError::InvalidScene(format!(
                "mesh index out of range of {vertices} vertices"
            )));
        }
        Ok(())
    }

    /// A sphere around every vertex, centered on their bounding box.
    pub fn bounding_sphere(&self) -> Sphere {
        let positions: Vec<Vec3> = self.vertices.iter().map(|v| v.position).collect();
        let Some(aabb) = Aabb::from_points(&positions) else {
            return Sphere::new(Vec3::ZERO, 0.0);
        };
        let center = aabb.center();
        let radius = positions
            .iter()
            .map(|p| (*p - center).length_squared())
            .fold(0.0f32, f32::max)
            .sqrt();
        Sphere::new(center, radius)
    }

    /// A unit cube centered on the origin with per-face normals.
    pub fn cube() -> Self {
        let faces: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::X, Vec3::Y, Vec3::new(0.0, 0.0, -1.0)),
            (Vec3::new(-1.0, 0.0, 0.0), Vec3::Y, Vec3::Z),
            (Vec3::Y, Vec3::new(0.0, 0.0, -1.0), Vec3::X),
            (Vec3::new(0.0, -1.0, 0.0), Vec3::Z, Vec3::X),
            (Vec3::Z, Vec3::Y, Vec3::X),
            (Vec3::new(0.0, 0.0, -1.0), Vec3::Y, Vec3::new(-1.0, 0.0, 0.0)),
        ];
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, up, right) in faces {
            let base = vertices.len() as u16;
            for (u, v) in [(0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)] {
                let position = normal * 0.5 + right * (u - 0.5) + up * (0.5 - v);
                vertices.push(Vertex {
                    position,
                    normal,
                    tangent: right.extend(1.0),
                    uv: Vec2::new(u, v),
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self {
            vertices,
            indices: MeshIndices::U16(indices),
        }
    }

    /// A `size` x `size` quad in the XY plane facing +Z.
    pub fn quad(size: f32) -> Self {
        let h = size * 0.5;
        let corner = |x: f32, y: f32, u: f32, v: f32| Vertex {
            position: Vec3::new(x, y, 0.0),
            normal: Vec3::Z,
            tangent: Vec4::new(1.0, 0.0, 0.0, 1.0),
            uv: Vec2::new(u, v),
        };
        Self {
            vertices: vec![
                corner(-h, -h, 0.0, 1.0),
                corner(h, -h, 1.0, 1.0),
                corner(h, h, 1.0, 0.0),
                corner(-h, h, 0.0, 0.0),
            ],
            indices: MeshIndices::U16(vec![0, 1, 2, 0, 2, 3]),
        }
    }
}

/// A mesh living in default-heap buffers, readable as raw bindless SRVs.
#[derive(Debug)]
pub struct GpuMesh {
    vertex_buffer: ResourceId,
    index_buffer: ResourceId,
    vertex_srv: BindlessSlot,
    index_srv: BindlessSlot,
    vertex_count: u32,
    index_count: u32,
    index_format: IndexFormat,
    vertex_bytes: u64,
    index_bytes: u64,
    bounds: Sphere,
}

impl GpuMesh {
    /// Uploads `data` and registers both buffers in the bindless heap.
    pub fn upload(
        uploader: &Uploader,
        bindless: &Arc<BindlessRegistry>,
        data: &MeshData,
        label: &str,
    ) -> Result<Self, RenderError> {
        data.validate()?;
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&data.vertices);
        let index_bytes = data.indices.to_bytes();

        let vertex_buffer = uploader.upload_buffer(
            vertex_bytes,
            ResourceStates::VERTEX_AND_CONSTANT_BUFFER | ResourceStates::ALL_SHADER_RESOURCE,
            &format!("{label} vertices"),
        )?;
        let index_buffer = match uploader.upload_buffer(
            &index_bytes,
            ResourceStates::INDEX_BUFFER | ResourceStates::ALL_SHADER_RESOURCE,
            &format!("{label} indices"),
        ) {
            Ok(buffer) => buffer,
            Err(err) => {
                let _ = uploader.device().destroy_resource(vertex_buffer);
                return Err(err.into());
            }
        };

        let slots = bindless
            .register_buffer(
                vertex_buffer,
                &ShaderResourceViewDesc::raw_buffer(vertex_bytes.len() as u64),
            )
            .and_then(|vertex_srv| {
                bindless
                    .register_buffer(
                        index_buffer,
                        &ShaderResourceViewDesc::raw_buffer(index_bytes.len() as u64),
                    )
                    .map(|index_srv| (vertex_srv, index_srv))
            });
        let (vertex_srv, index_srv) = match slots {
            Ok(slots) => slots,
            Err(err) => {
                let _ = uploader.device().destroy_resource(vertex_buffer);
                let _ = uploader.device().destroy_resource(index_buffer);
                return Err(err.into());
            }
        };

        log::debug!(
            "Uploaded mesh '{label}': {} vertices, {} indices, SRVs {}/{}",
            data.vertices.len(),
            data.indices.len(),
            vertex_srv.index(),
            index_srv.index()
        );
        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_srv,
            index_srv,
            vertex_count: data.vertices.len() as u32,
            index_count: data.indices.len() as u32,
            index_format: data.indices.format(),
            vertex_bytes: vertex_bytes.len() as u64,
            index_bytes: index_bytes.len() as u64,
            bounds: data.bounding_sphere(),
        })
    }

    /// The mesh table entry.
    pub fn table_entry(&self) -> VBMeshTableEntry {
        VBMeshTableEntry {
            vertex_buffer_index: self.vertex_srv.index(),
            index_buffer_index: self.index_srv.index(),
            vertex_stride_bytes: VERTEX_STRIDE,
            index_format: match self.index_format {
                IndexFormat::U16 => INDEX_FORMAT_R16,
                IndexFormat::U32 => INDEX_FORMAT_R32,
            },
        }
    }

    /// Vertex count.
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Index count.
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Object-space bounding sphere.
    pub fn bounds(&self) -> Sphere {
        self.bounds
    }

    /// Returns both SRV slots to the registry while keeping the buffers.
    /// The mesh table rejects the mesh until it is uploaded again.
    pub fn release_views(&mut self) {
        self.vertex_srv = BindlessSlot::detached();
        self.index_srv = BindlessSlot::detached();
    }

    /// Input-assembler binding of the vertex buffer.
    pub fn vertex_buffer_view(&self, device: &dyn GpuDevice) -> Result<VertexBufferView, RenderError> {
        Ok(VertexBufferView {
            address: device.gpu_virtual_address(self.vertex_buffer)?,
            size_in_bytes: self.vertex_bytes as u32,
            stride: VERTEX_STRIDE,
        })
    }

    /// Input-assembler binding of the index buffer.
    pub fn index_buffer_view(&self, device: &dyn GpuDevice) -> Result<IndexBufferView, RenderError> {
        Ok(IndexBufferView {
            address: device.gpu_virtual_address(self.index_buffer)?,
            size_in_bytes: self.index_bytes as u32,
            format: self.index_format,
        })
    }

    /// Releases the SRVs and destroys the buffers. The GPU must be done with
    /// them.
    pub fn destroy(self, device: &dyn GpuDevice) {
        let Self {
            vertex_buffer,
            index_buffer,
            vertex_srv,
            index_srv,
            ..
        } = self;
        drop(vertex_srv);
        drop(index_srv);
        for resource in [vertex_buffer, index_buffer] {
            if let Err(err) = device.destroy_resource(resource) {
                log::warn!("Failed to destroy mesh buffer: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_is_valid_and_closed() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        cube.validate().unwrap();
        for v in &cube.vertices {
            assert!(v.position.x.abs() <= 0.5 + 1e-6);
            assert!(v.position.y.abs() <= 0.5 + 1e-6);
            assert!(v.position.z.abs() <= 0.5 + 1e-6);
            assert!((v.position.dot(v.normal) - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_bounding_sphere_encloses_vertices() {
        let cube = MeshData::cube();
        let sphere = cube.bounding_sphere();
        assert!(sphere.center.length() < 1e-6);
        assert!((sphere.radius - 0.75f32.sqrt()).abs() < 1e-5);

        let mut quad = MeshData::quad(2.0);
        for v in &mut quad.vertices {
            v.position = v.position + Vec3::new(3.0, 0.0, 0.0);
        }
        let sphere = quad.bounding_sphere();
        assert_eq!(sphere.center, Vec3::new(3.0, 0.0, 0.0));
        assert!(quad
            .vertices
            .iter()
            .all(|v| (v.position - sphere.center).length() <= sphere.radius + 1e-6));
    }

    #[test]
    fn test_validation_rejects_bad_indices() {
        let mut quad = MeshData::quad(1.0);
        quad.indices = MeshIndices::U16(vec![0, 1]);
        assert!(quad.validate().is_err());
        quad.indices = MeshIndices::U32(vec![0, 1, 9]);
        assert!(quad.validate().is_err());
    }

    #[test]
    fn test_u16_indices_are_padded_for_raw_views() {
        let indices = MeshIndices::U16(vec![0, 1, 2]);
        let bytes = indices.to_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..6], &[0, 0, 1, 0, 2, 0]);
        assert_eq!(indices.format(), IndexFormat::U16);
    }
}
