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

//! Per-frame bookkeeping: instance partitioning, statistics and the
//! resources a frame leaves behind.

use std::collections::{HashMap, HashSet};

use cortex_core::math::{Frustum, Mat4};
use cortex_core::renderer::api::{ResourceId, ResourceStates};
use cortex_core::renderer::graph::GraphStats;
use cortex_core::renderer::scene::{
    AlphaMode, InstanceId, RenderScene, VBInstanceData, INSTANCE_FLAG_ALPHA_TEST,
    INSTANCE_FLAG_DOUBLE_SIDED,
};
use cortex_core::renderer::RenderError;
use cortex_lanes::{partition_draws, VisibilityVariant};

/// One instanced draw over a range of the instance table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceRange {
    /// Mesh drawn.
    pub mesh: u32,
    /// Pipeline variant.
    pub variant: VisibilityVariant,
    /// First record.
    pub first: u32,
    /// Records in the range.
    pub count: u32,
}

/// The instance table of a frame and the draws covering it.
#[derive(Debug, Default)]
pub struct InstancePlan {
    /// Records sorted by mesh, then variant, then instance identity.
    pub records: Vec<VBInstanceData>,
    /// Identity of each record, for next frame's previous transforms.
    pub ids: Vec<InstanceId>,
    /// At most four ranges per mesh.
    pub ranges: Vec<InstanceRange>,
    /// Distinct meshes with at least one record.
    pub visible_meshes: u32,
    /// Instances dropped because their material blends.
    pub blended: u32,
    /// Instances outside the view frustum, with their transforms.
    pub culled: Vec<(InstanceId, Mat4)>,
}

impl InstancePlan {
    /// Partitions `scene`'s instances into the four ranges of each mesh.
    ///
    /// Blended materials have no pass and are left out, as are instances
    /// whose world bounding sphere lies outside `frustum`. `previous` maps
    /// instance identities to last frame's transforms; instances missing
    /// from it reproject onto themselves.
    pub fn build(
        scene: &RenderScene,
        frustum: &Frustum,
        previous: &HashMap<InstanceId, Mat4>,
    ) -> Result<Self, RenderError> {
        scene.validate()?;
        let mut blended = 0;
        let mut culled = Vec::new();
        let mut keyed = Vec::with_capacity(scene.instances.len());
        for instance in &scene.instances {
            let material = &scene.materials[instance.material as usize];
            if material.alpha_mode == AlphaMode::Blend {
                blended += 1;
                continue;
            }
            let bounds = scene.meshes[instance.mesh as usize]
                .bounds()
                .transformed(&instance.transform);
            if !frustum.intersects_sphere(&bounds) {
                culled.push((instance.id, instance.transform));
                continue;
            }
            let variant = VisibilityVariant::of(material.is_alpha_tested(), material.double_sided);
            keyed.push((instance.mesh, variant, instance.id, instance));
        }
        keyed.sort_by_key(|&(mesh, variant, id, _)| (mesh, variant, id));

        let mut records = Vec::with_capacity(keyed.len());
        let mut ids = Vec::with_capacity(keyed.len());
        let mut meshes = HashSet::new();
        for &(mesh, variant, id, instance) in &keyed {
            let mut flags = 0;
            if variant.alpha_tested() {
                flags |= INSTANCE_FLAG_ALPHA_TEST;
            }
            if variant.double_sided() {
                flags |= INSTANCE_FLAG_DOUBLE_SIDED;
            }
            records.push(VBInstanceData {
                world_matrix: instance.transform,
                prev_world_matrix: previous.get(&id).copied().unwrap_or(instance.transform),
                normal_matrix: instance.transform.normal_matrix(),
                mesh_index: mesh,
                material_index: instance.material,
                first_index: 0,
                index_count: scene.meshes[mesh as usize].index_count(),
                base_vertex: 0,
                flags,
                _pad: [0; 2],
            });
            ids.push(id);
            meshes.insert(mesh);
        }

        let keys: Vec<_> = keyed.iter().map(|&(mesh, variant, ..)| (mesh, variant)).collect();
        let ranges = partition_draws(&keys)
            .into_iter()
            .map(|(mesh, variant, first, count)| InstanceRange {
                mesh,
                variant,
                first,
                count,
            })
            .collect();
        Ok(Self {
            records,
            ids,
            ranges,
            visible_meshes: meshes.len() as u32,
            blended,
            culled,
        })
    }

    /// World transforms by identity, culled instances included, to carry
    /// into the next frame.
    pub fn transforms(&self) -> HashMap<InstanceId, Mat4> {
        self.ids
            .iter()
            .zip(&self.records)
            .map(|(id, record)| (*id, record.world_matrix))
            .chain(self.culled.iter().copied())
            .collect()
    }
}

/// Counters of the last rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    /// Frame number, starting at 0.
    pub frame_index: u64,
    /// Draw calls recorded by the built-in passes.
    pub draw_calls: u32,
    /// Compute dispatches recorded by the built-in passes.
    pub dispatches: u32,
    /// Instance records drawn.
    pub instances: u32,
    /// Meshes with at least one drawn instance.
    pub visible_meshes: u32,
    /// Instances outside the view frustum.
    pub culled: u32,
    /// Point and spot lights.
    pub local_lights: u32,
    /// Upload tables that grew this frame.
    pub table_growths: u32,
    /// `true` when culling ran on the compute queue.
    pub async_compute: bool,
    /// Render graph counters of the main graph.
    pub graph: GraphStats,
}

/// A resource produced by the frame and the state it was left in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutput {
    /// The device resource.
    pub resource: ResourceId,
    /// State of subresource 0 after the frame.
    pub state: ResourceStates,
}

/// The intermediate and final images of the last frame. Transient entries
/// stay valid until the next call to `render`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutputs {
    /// `R32G32_UINT` visibility payload.
    pub visibility: FrameOutput,
    /// `R16G16B16A16_FLOAT` lit color.
    pub hdr: FrameOutput,
    /// `R16G16_FLOAT` motion in pixels.
    pub velocity: FrameOutput,
    /// Scene depth.
    pub depth: FrameOutput,
    /// The G-buffer planes in binding order.
    pub gbuffer: [FrameOutput; 5],
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::math::Vec3;
    use cortex_core::renderer::scene::Material;

    fn material(alpha_mode: AlphaMode, double_sided: bool) -> Material {
        Material {
            alpha_mode,
            double_sided,
            ..Material::default()
        }
    }

    fn frustum() -> Frustum {
        let proj = Mat4::perspective_rh_zo(1.0, 1.0, 0.1, 100.0).unwrap();
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y).unwrap();
        Frustum::from_view_proj(&(proj * view))
    }

    #[test]
    fn test_empty_scene_plans_nothing() {
        let plan = InstancePlan::build(&RenderScene::new(), &frustum(), &HashMap::new()).unwrap();
        assert!(plan.records.is_empty());
        assert!(plan.ranges.is_empty());
        assert_eq!(plan.visible_meshes, 0);
    }

    #[test]
    fn test_invalid_references_are_rejected() {
        let mut scene = RenderScene::new();
        scene.add_material(material(AlphaMode::Opaque, false));
        scene.add_instance(3, 0, Mat4::IDENTITY);
        assert!(matches!(
            InstancePlan::build(&scene, &frustum(), &HashMap::new()),
            Err(RenderError::InvalidScene(_))
        ));
    }
}
