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

//! `ClusteredLightCulling.hlsl`: one thread per froxel appends the local
//! lights whose range sphere touches it.

use cortex_core::renderer::scene::bindings::cluster_cull;
use cortex_core::renderer::scene::cluster::{cull_cluster, ClusterGrid};
use cortex_core::renderer::scene::{ClusterCullParams, GpuLight};

use super::super::validation::Fault;
use super::DispatchContext;

/// The grid described by the dispatch constants.
pub(super) fn grid_from(grid: [u32; 4], depth_range: [f32; 4]) -> ClusterGrid {
    ClusterGrid {
        dims: [grid[0].max(1), grid[1].max(1), grid[2].max(1)],
        near: depth_range[0],
        far: depth_range[1],
        max_lights_per_cluster: grid[3],
    }
}

pub(super) fn run(ctx: &DispatchContext<'_>) -> Result<(), Fault> {
    let b = &ctx.bindings;
    let params: ClusterCullParams = b.constant_buffer(cluster_cull::PARAMS)?;
    let source = b.structured::<GpuLight>(cluster_cull::LIGHTS)?;
    let mut ranges = b.rw_structured::<[u32; 2]>(cluster_cull::RANGES)?;
    let mut indices = b.rw_structured::<u32>(cluster_cull::INDICES)?;

    let grid = grid_from(params.grid, params.depth_range);
    let lights = (0..params.counts[0])
        .map(|i| source.get(i))
        .collect::<Result<Vec<_>, _>>()?;
    let threads = ctx.groups[0] * cluster_cull::GROUP_SIZE;
    let mut found = Vec::with_capacity(grid.max_lights_per_cluster as usize);

    for cluster in 0..threads.min(grid.cluster_count()) {
        found.clear();
        let range = cull_cluster(
            &grid,
            cluster,
            &params.inv_proj,
            &params.view,
            &lights,
            &mut found,
        );
        ranges.set(cluster as usize, range)?;
        for (i, light) in found.iter().enumerate() {
            indices.set(range[0] as usize + i, *light)?;
        }
    }
    Ok(())
}
