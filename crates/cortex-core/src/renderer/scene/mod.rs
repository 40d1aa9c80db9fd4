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

//! The scene description the frame orchestrator renders, and the
//! GPU-visible data model of the visibility-buffer pipeline.

pub mod bindings;
pub mod camera;
pub mod cluster;
pub mod gpu_types;
pub mod light;
pub mod material;
pub mod mesh;
pub mod payload;

pub use self::camera::Camera;
pub use self::cluster::ClusterGrid;
pub use self::gpu_types::*;
pub use self::light::{Light, LightKind};
pub use self::material::{AlphaMode, Material, MaterialTextures};
pub use self::mesh::{GpuMesh, MeshData, MeshIndices};
pub use self::payload::VisibilityPayload;

use crate::math::{Mat4, Vec3};
use crate::renderer::api::ResourceId;
use crate::renderer::error::RenderError;
use crate::renderer::traits::GpuDevice;

/// Stable identity of an instance across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

/// A mesh drawn with a material at a transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instance {
    /// Identity used to find last frame's transform.
    pub id: InstanceId,
    /// Index into [`RenderScene::meshes`].
    pub mesh: u32,
    /// Index into [`RenderScene::materials`].
    pub material: u32,
    /// Object to world.
    pub transform: Mat4,
}

/// A localized environment probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReflectionProbe {
    /// World-space center.
    pub position: Vec3,
    /// Radius of influence.
    pub radius: f32,
    /// Bindless index of the diffuse irradiance map.
    pub env_diffuse_index: u32,
    /// Bindless index of the prefiltered specular map.
    pub env_specular_index: u32,
    /// Last mip of the specular map.
    pub max_mip: f32,
    /// Radiance scale.
    pub intensity: f32,
}

impl ReflectionProbe {
    /// The probe table entry.
    pub fn to_gpu(&self) -> VBReflectionProbe {
        VBReflectionProbe {
            position_radius: [self.position.x, self.position.y, self.position.z, self.radius],
            env_diffuse_index: self.env_diffuse_index,
            env_specular_index: self.env_specular_index,
            max_mip: self.max_mip,
            intensity: self.intensity,
        }
    }
}

/// Distant lighting: equirectangular irradiance and prefiltered maps plus
/// the sky color written behind geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    /// RGBA16F diffuse irradiance map, or a uniform sky when absent.
    pub diffuse: Option<ResourceId>,
    /// RGBA16F prefiltered specular map with its mip chain.
    pub specular: Option<ResourceId>,
    /// Color of background pixels, and of the uniform sky.
    pub sky_color: Vec3,
    /// Scale of both image-based terms.
    pub intensity: f32,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            diffuse: None,
            specular: None,
            sky_color: Vec3::new(0.05, 0.07, 0.1),
            intensity: 1.0,
        }
    }
}

/// Everything one frame draws.
#[derive(Debug, Default)]
pub struct RenderScene {
    /// Uploaded meshes.
    pub meshes: Vec<GpuMesh>,
    /// Materials.
    pub materials: Vec<Material>,
    /// Instances.
    pub instances: Vec<Instance>,
    /// Lights. The first directional light is the sun.
    pub lights: Vec<Light>,
    /// Reflection probes.
    pub probes: Vec<ReflectionProbe>,
    /// The viewpoint.
    pub camera: Camera,
    /// Distant lighting.
    pub environment: Environment,
    next_instance: u64,
}

impl RenderScene {
    /// An empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an uploaded mesh and returns its index.
    pub fn add_mesh(&mut self, mesh: GpuMesh) -> u32 {
        self.meshes.push(mesh);
        self.meshes.len() as u32 - 1
    }

    /// Adds a material and returns its index.
    pub fn add_material(&mut self, material: Material) -> u32 {
        self.materials.push(material);
        self.materials.len() as u32 - 1
    }

    /// Adds an instance and returns its identity.
    pub fn add_instance(&mut self, mesh: u32, material: u32, transform: Mat4) -> InstanceId {
        let id = InstanceId(self.next_instance);
        self.next_instance += 1;
        self.instances.push(Instance {
            id,
            mesh,
            material,
            transform,
        });
        id
    }

    /// Looks an instance up by identity.
    pub fn instance_mut(&mut self, id: InstanceId) -> Option<&mut Instance> {
        self.instances.iter_mut().find(|i| i.id == id)
    }

    /// Removes an instance.
    pub fn remove_instance(&mut self, id: InstanceId) -> Option<Instance> {
        let pos = self.instances.iter().position(|i| i.id == id)?;
        Some(self.instances.remove(pos))
    }

    /// The first directional light.
    pub fn sun(&self) -> Option<&Light> {
        self.lights.iter().find(|l| l.kind == LightKind::Directional)
    }

    /// Point and spot lights, in declaration order.
    pub fn local_lights(&self) -> impl Iterator<Item = &Light> {
        self.lights.iter().filter(|l| l.is_local())
    }

    /// Checks every instance references an existing mesh and material.
    pub fn validate(&self) -> Result<(), RenderError> {
        for instance in &self.instances {
            if instance.mesh as usize >= self.meshes.len() {
                return Err(RenderError::InvalidScene(format!(
                    "instance {:?} references mesh {} of {}",
                    instance.id,
                    instance.mesh,
                    self.meshes.len()
                )));
            }
            if instance.material as usize >= self.materials.len() {
                return Err(RenderError::InvalidScene(format!(
                    "instance {:?} references material {} of {}",
                    instance.id,
                    instance.material,
                    self.materials.len()
                )));
            }
        }
        Ok(())
    }

    /// Destroys the meshes. The GPU must be done with them.
    pub fn destroy_meshes(&mut self, device: &dyn GpuDevice) {
        for mesh in self.meshes.drain(..) {
            mesh.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_ids_are_stable_across_removal() {
        let mut scene = RenderScene::new();
        let a = scene.add_instance(0, 0, Mat4::IDENTITY);
        let b = scene.add_instance(0, 0, Mat4::IDENTITY);
        assert_ne!(a, b);
        scene.remove_instance(a);
        let c = scene.add_instance(0, 0, Mat4::IDENTITY);
        assert_ne!(c, b);
        assert!(scene.instance_mut(b).is_some());
        assert!(scene.instance_mut(a).is_none());
    }

    #[test]
    fn test_validation_catches_dangling_references() {
        let mut scene = RenderScene::new();
        scene.add_material(Material::default());
        scene.add_instance(0, 0, Mat4::IDENTITY);
        assert!(matches!(scene.validate(), Err(RenderError::InvalidScene(_))));
    }

    #[test]
    fn test_sun_is_first_directional() {
        let mut scene = RenderScene::new();
        scene.lights.push(Light::point(Vec3::ZERO, Vec3::ONE, 1.0, 5.0));
        scene
            .lights
            .push(Light::directional(Vec3::new(0.0, -1.0, 0.0), Vec3::ONE, 3.0));
        assert_eq!(scene.sun().map(|l| l.intensity), Some(3.0));
        assert_eq!(scene.local_lights().count(), 1);
    }
}
