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

//! Split-sum preintegration of the specular BRDF.
//!
//! Each texel stores the scale and bias applied to F0 for a given
//! `(n.v, roughness)`, so that `specular IBL = prefiltered * (F0 * A + B)`.

use super::brdf::g_smith_ibl;
use super::sampling::{hammersley, importance_sample_ggx};
use crate::math::{Vec3, EPSILON};

/// Integrates `(A, B)` for one view angle and roughness.
pub fn integrate_brdf(n_dot_v: f32, roughness: f32, sample_count: u32) -> [f32; 2] {
    let n_dot_v = n_dot_v.max(EPSILON);
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).max(0.0).sqrt(), 0.0, n_dot_v);
    let n = Vec3::Z;
    let mut a = 0.0;
    let mut b = 0.0;
    for i in 0..sample_count {
        let h = importance_sample_ggx(hammersley(i, sample_count), n, roughness);
        let v_dot_h = v.dot(h);
        let l = h * (2.0 * v_dot_h) - v;
        let n_dot_l = l.z;
        if n_dot_l <= 0.0 {
            continue;
        }
        let n_dot_h = h.z.max(EPSILON);
        let v_dot_h = v_dot_h.max(0.0);
        let g_vis = g_smith_ibl(n_dot_v, n_dot_l, roughness) * v_dot_h / (n_dot_h * n_dot_v);
        let fc = (1.0 - v_dot_h).powi(5);
        a += (1.0 - fc) * g_vis;
        b += fc * g_vis;
    }
    let inv = 1.0 / sample_count.max(1) as f32;
    [(a * inv).clamp(0.0, 1.0), (b * inv).clamp(0.0, 1.0)]
}

/// The whole `size` x `size` table, row-major. Columns sweep `n.v`, rows
/// sweep roughness, both sampled at texel centers.
pub fn generate(size: u32, sample_count: u32) -> Vec<[f32; 2]> {
    let mut out = Vec::with_capacity((size * size) as usize);
    for y in 0..size {
        let roughness = (y as f32 + 0.5) / size as f32;
        for x in 0..size {
            let n_dot_v = (x as f32 + 0.5) / size as f32;
            out.push(integrate_brdf(n_dot_v, roughness, sample_count));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lut_stays_in_unit_square() {
        for texel in generate(16, 128) {
            assert!((0.0..=1.0).contains(&texel[0]));
            assert!((0.0..=1.0).contains(&texel[1]));
            assert!(texel[0] + texel[1] <= 1.0 + 2e-2);
        }
    }

    #[test]
    fn test_smooth_head_on_reflects_everything() {
        let [a, b] = integrate_brdf(1.0, 0.01, 256);
        assert_relative_eq!(a, 1.0, epsilon = 1e-2);
        assert_relative_eq!(b, 0.0, epsilon = 1e-2);
    }

    #[test]
    fn test_rough_surfaces_lose_energy() {
        let [a_smooth, b_smooth] = integrate_brdf(0.5, 0.1, 512);
        let [a_rough, b_rough] = integrate_brdf(0.5, 1.0, 512);
        assert!(a_rough + b_rough < a_smooth + b_smooth);
    }
}
