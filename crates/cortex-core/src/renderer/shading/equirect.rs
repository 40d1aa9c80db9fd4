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

//! Equirectangular (latitude-longitude) environment mapping.

use crate::math::{Vec2, Vec3, PI, TAU};

/// Texture coordinate of a world direction. `v = 0` is straight up.
#[inline]
pub fn direction_to_uv(dir: Vec3) -> Vec2 {
    let d = dir.normalize();
    let u = d.z.atan2(d.x) / TAU + 0.5;
    let v = d.y.clamp(-1.0, 1.0).acos() / PI;
    Vec2::new(u, v)
}

/// World direction of a texture coordinate.
#[inline]
pub fn uv_to_direction(uv: Vec2) -> Vec3 {
    let phi = (uv.x - 0.5) * TAU;
    let theta = uv.y * PI;
    let (sin_theta, cos_theta) = theta.sin_cos();
    Vec3::new(sin_theta * phi.cos(), cos_theta, sin_theta * phi.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_poles_and_horizon() {
        assert_relative_eq!(direction_to_uv(Vec3::Y).y, 0.0);
        assert_relative_eq!(direction_to_uv(Vec3::new(0.0, -1.0, 0.0)).y, 1.0);
        let east = direction_to_uv(Vec3::X);
        assert_relative_eq!(east.x, 0.5);
        assert_relative_eq!(east.y, 0.5);
    }

    #[test]
    fn test_direction_survives_the_mapping() {
        let dir = Vec3::new(0.3, -0.4, -0.8).normalize();
        let back = uv_to_direction(direction_to_uv(dir));
        assert_relative_eq!(back.x, dir.x, epsilon = 1e-5);
        assert_relative_eq!(back.y, dir.y, epsilon = 1e-5);
        assert_relative_eq!(back.z, dir.z, epsilon = 1e-5);
    }
}
