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

//! Scene lights and their GPU form.

use super::gpu_types::{GpuLight, LIGHT_TYPE_DIRECTIONAL, LIGHT_TYPE_POINT, LIGHT_TYPE_SPOT};
use crate::math::Vec3;

/// The kind of a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    /// Infinitely distant; lights the whole scene along `direction`.
    Directional,
    /// Omnidirectional, attenuated to zero at `range`.
    Point,
    /// A cone along `direction` between `inner_cone` and `outer_cone`.
    Spot,
}

/// A light of the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// Kind of light.
    pub kind: LightKind,
    /// World position (point and spot).
    pub position: Vec3,
    /// Direction the light travels (directional and spot).
    pub direction: Vec3,
    /// Linear color.
    pub color: Vec3,
    /// Radiance scale.
    pub intensity: f32,
    /// Distance of zero attenuation (point and spot).
    pub range: f32,
    /// Inner cone half-angle in radians (spot).
    pub inner_cone: f32,
    /// Outer cone half-angle in radians (spot).
    pub outer_cone: f32,
    /// Slot in the shadow map array, if the light casts shadows.
    pub shadow_index: Option<u32>,
}

impl Light {
    /// A directional light.
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional,
            position: Vec3::ZERO,
            direction: direction.normalize(),
            color,
            intensity,
            range: 0.0,
            inner_cone: 0.0,
            outer_cone: 0.0,
            shadow_index: None,
        }
    }

    /// A point light.
    pub fn point(position: Vec3, color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            kind: LightKind::Point,
            position,
            direction: Vec3::new(0.0, -1.0, 0.0),
            color,
            intensity,
            range,
            inner_cone: 0.0,
            outer_cone: 0.0,
            shadow_index: None,
        }
    }

    /// A spot light.
    #[allow(clippy::too_many_arguments)]
    pub fn spot(
        position: Vec3,
        direction: Vec3,
        color: Vec3,
        intensity: f32,
        range: f32,
        inner_cone: f32,
        outer_cone: f32,
    ) -> Self {
        Self {
            kind: LightKind::Spot,
            position,
            direction: direction.normalize(),
            color,
            intensity,
            range,
            inner_cone,
            outer_cone,
            shadow_index: None,
        }
    }

    /// `true` for lights that go through clustered culling.
    pub fn is_local(&self) -> bool {
        self.kind != LightKind::Directional
    }

    /// Packs the light into four vectors.
    pub fn to_gpu(&self) -> GpuLight {
        let ty = match self.kind {
            LightKind::Directional => LIGHT_TYPE_DIRECTIONAL,
            LightKind::Point => LIGHT_TYPE_POINT,
            LightKind::Spot => LIGHT_TYPE_SPOT,
        };
        let radiance = self.color * self.intensity;
        let shadow = self.shadow_index.map_or(-1.0, |i| i as f32);
        GpuLight {
            position_type: [self.position.x, self.position.y, self.position.z, ty],
            direction_cos_inner: [
                self.direction.x,
                self.direction.y,
                self.direction.z,
                self.inner_cone.cos(),
            ],
            color_range: [radiance.x, radiance.y, radiance.z, self.range],
            params: [self.outer_cone.cos(), shadow, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_spot_packing() {
        let light = Light::spot(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(0.0, -2.0, 0.0),
            Vec3::new(1.0, 0.5, 0.25),
            4.0,
            10.0,
            0.0,
            std::f32::consts::FRAC_PI_3,
        );
        let gpu = light.to_gpu();
        assert_eq!(gpu.position_type, [1.0, 2.0, 3.0, LIGHT_TYPE_SPOT]);
        assert_eq!(&gpu.direction_cos_inner[..3], &[0.0, -1.0, 0.0]);
        assert_relative_eq!(gpu.direction_cos_inner[3], 1.0);
        assert_eq!(gpu.color_range, [4.0, 2.0, 1.0, 10.0]);
        assert_relative_eq!(gpu.params[0], 0.5, epsilon = 1e-6);
        assert_eq!(gpu.params[1], -1.0);
        assert!(light.is_local());
    }
}
