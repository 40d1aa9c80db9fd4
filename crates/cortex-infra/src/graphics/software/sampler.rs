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

//! Static sampler evaluation.

use cortex_core::math::{Vec2, Vec4};
use cortex_core::renderer::api::{AddressMode, CompareFunc, Filter, StaticSampler};

use super::bindings::TextureView;

fn address(coord: i32, size: u32, mode: AddressMode) -> i32 {
    let size = size.max(1) as i32;
    match mode {
        AddressMode::Wrap => coord.rem_euclid(size),
        AddressMode::Clamp => coord.clamp(0, size - 1),
    }
}

fn fetch(view: &TextureView, sampler: &StaticSampler, x: i32, y: i32, mip: u32, slice: u32) -> Vec4 {
    let (w, h) = view.size(mip);
    let x = address(x, w, sampler.address);
    let y = address(y, h, sampler.address);
    Vec4::from_array(view.load(x, y, mip, slice))
}

fn sample_mip(view: &TextureView, sampler: &StaticSampler, uv: Vec2, mip: u32, slice: u32) -> Vec4 {
    let (w, h) = view.size(mip);
    match sampler.filter {
        Filter::Point => {
            let x = (uv.x * w as f32).floor() as i32;
            let y = (uv.y * h as f32).floor() as i32;
            fetch(view, sampler, x, y, mip, slice)
        }
        Filter::Linear => {
            let tx = uv.x * w as f32 - 0.5;
            let ty = uv.y * h as f32 - 0.5;
            let x0 = tx.floor();
            let y0 = ty.floor();
            let fx = tx - x0;
            let fy = ty - y0;
            let (x0, y0) = (x0 as i32, y0 as i32);
            let top = fetch(view, sampler, x0, y0, mip, slice)
                .lerp(fetch(view, sampler, x0 + 1, y0, mip, slice), fx);
            let bottom = fetch(view, sampler, x0, y0 + 1, mip, slice)
                .lerp(fetch(view, sampler, x0 + 1, y0 + 1, mip, slice), fx);
            top.lerp(bottom, fy)
        }
    }
}

/// `SampleLevel`.
pub(crate) fn sample_level(
    view: &TextureView,
    sampler: &StaticSampler,
    uv: Vec2,
    lod: f32,
    slice: u32,
) -> Vec4 {
    let max_mip = view.mip_count().saturating_sub(1) as f32;
    let lod = if lod.is_finite() { lod.clamp(0.0, max_mip) } else { 0.0 };
    match sampler.filter {
        Filter::Point => sample_mip(view, sampler, uv, lod.round() as u32, slice),
        Filter::Linear => {
            let lower = lod.floor();
            let t = lod - lower;
            let a = sample_mip(view, sampler, uv, lower as u32, slice);
            if t == 0.0 {
                return a;
            }
            let b = sample_mip(view, sampler, uv, lower as u32 + 1, slice);
            a.lerp(b, t)
        }
    }
}

/// `SampleGrad`: the mip comes from the UV change across one pixel.
pub(crate) fn sample_grad(
    view: &TextureView,
    sampler: &StaticSampler,
    uv: Vec2,
    ddx: Vec2,
    ddy: Vec2,
) -> Vec4 {
    let (w, h) = view.size(0);
    let size = Vec2::new(w as f32, h as f32);
    let footprint = (ddx * size).length().max((ddy * size).length());
    let lod = if footprint > 0.0 { footprint.log2() } else { 0.0 };
    sample_level(view, sampler, uv, lod, 0)
}

/// `SampleCmpLevelZero` with point filtering: 1 where the comparison of
/// `reference` against the stored depth passes.
pub(crate) fn sample_compare(
    view: &TextureView,
    sampler: &StaticSampler,
    uv: Vec2,
    slice: u32,
    reference: f32,
) -> f32 {
    let compare = sampler.comparison.unwrap_or(CompareFunc::Always);
    let (w, h) = view.size(0);
    let x = (uv.x * w as f32).floor() as i32;
    let y = (uv.y * h as f32).floor() as i32;
    let stored = fetch(view, sampler, x, y, 0, slice).x;
    if compare.passes(reference, stored) {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_and_clamp_addressing() {
        assert_eq!(address(-1, 4, AddressMode::Wrap), 3);
        assert_eq!(address(5, 4, AddressMode::Wrap), 1);
        assert_eq!(address(-1, 4, AddressMode::Clamp), 0);
        assert_eq!(address(9, 4, AddressMode::Clamp), 3);
    }
}
