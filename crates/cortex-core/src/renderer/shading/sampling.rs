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

//! Low-discrepancy sequences and GGX importance sampling.

use crate::math::{Vec2, Vec3, TAU};

/// Van der Corput radical inverse in base 2.
#[inline]
pub fn radical_inverse_vdc(bits: u32) -> f32 {
    bits.reverse_bits() as f32 * 2.328_306_4e-10
}

/// The `i`-th of `n` Hammersley points in `[0, 1)^2`.
#[inline]
pub fn hammersley(i: u32, n: u32) -> Vec2 {
    Vec2::new(i as f32 / n as f32, radical_inverse_vdc(i))
}

/// An orthonormal tangent and bitangent completing `n`.
pub fn tangent_frame(n: Vec3) -> (Vec3, Vec3) {
    let up = if n.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = up.cross(n).normalize();
    let bitangent = n.cross(tangent);
    (tangent, bitangent)
}

/// A GGX-distributed half vector around `n` for the sample `xi`.
pub fn importance_sample_ggx(xi: Vec2, n: Vec3, roughness: f32) -> Vec3 {
    let a = roughness * roughness;
    let phi = TAU * xi.x;
    let cos_theta = ((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y)).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let (tangent, bitangent) = tangent_frame(n);
    (tangent * (phi.cos() * sin_theta) + bitangent * (phi.sin() * sin_theta) + n * cos_theta)
        .normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_radical_inverse() {
        assert_eq!(radical_inverse_vdc(0), 0.0);
        assert_relative_eq!(radical_inverse_vdc(1), 0.5);
        assert_relative_eq!(radical_inverse_vdc(2), 0.25);
        assert_relative_eq!(radical_inverse_vdc(3), 0.75);
    }

    #[test]
    fn test_smooth_ggx_samples_hug_the_normal() {
        let n = Vec3::new(0.0, 1.0, 0.0);
        for i in 0..64 {
            let h = importance_sample_ggx(hammersley(i, 64), n, 0.01);
            assert!(h.dot(n) > 0.999);
        }
    }

    #[test]
    fn test_tangent_frame_is_orthonormal() {
        for n in [Vec3::Z, Vec3::new(1.0, 2.0, 3.0).normalize()] {
            let (t, b) = tangent_frame(n);
            assert_relative_eq!(t.dot(n), 0.0, epsilon = 1e-6);
            assert_relative_eq!(b.dot(t), 0.0, epsilon = 1e-6);
            assert_relative_eq!(b.length(), 1.0, epsilon = 1e-5);
        }
    }
}
