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

//! `BrdfLut.hlsl`: split-sum preintegration of the GGX specular lobe.

use cortex_core::renderer::scene::bindings::brdf_lut;
use cortex_core::renderer::scene::BrdfLutConstants;
use cortex_core::renderer::shading::brdf_lut::integrate_brdf;

use super::super::validation::Fault;
use super::DispatchContext;

pub(super) fn run(ctx: &DispatchContext<'_>) -> Result<(), Fault> {
    let constants: BrdfLutConstants = ctx.bindings.constants(brdf_lut::CONSTANTS)?;
    let mut lut = ctx.bindings.rw_texture(brdf_lut::OUTPUT, 0)?;
    let (width, height) = lut.size();
    let size = constants.size.min(width).min(height);
    let (threads_x, threads_y) = ctx.threads_2d(brdf_lut::GROUP_SIZE);
    for y in 0..threads_y.min(size) {
        let roughness = (y as f32 + 0.5) / size as f32;
        for x in 0..threads_x.min(size) {
            let n_dot_v = (x as f32 + 0.5) / size as f32;
            let [scale, bias] = integrate_brdf(n_dot_v, roughness, constants.sample_count);
            lut.store(x, y, [scale, bias, 0.0, 0.0]);
        }
    }
    Ok(())
}
