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

//! Cook-Torrance microfacet terms, a clearcoat lobe and split-sum IBL.

use crate::math::{lerp, saturate, Vec3, PI};

/// Roughness floor that keeps the GGX lobe finite.
pub const MIN_ROUGHNESS: f32 = 0.045;

/// Reflectance of the clearcoat layer at normal incidence (IOR 1.5).
pub const CLEARCOAT_F0: f32 = 0.04;

/// GGX normal distribution, with `alpha = roughness^2`.
#[inline]
pub fn d_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let d = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    a2 / (PI * d * d)
}

/// Height-correlated Smith visibility, `G / (4 n.l n.v)`.
#[inline]
pub fn v_smith_ggx_correlated(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let gv = n_dot_l * (n_dot_v * n_dot_v * (1.0 - a2) + a2).sqrt();
    let gl = n_dot_v * (n_dot_l * n_dot_l * (1.0 - a2) + a2).sqrt();
    0.5 / (gv + gl).max(1e-7)
}

/// Separable Smith-GGX masking-shadowing with the IBL remapping `k = a / 2`.
#[inline]
pub fn g_smith_ibl(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    let k = roughness * roughness * 0.5;
    let g1 = |x: f32| x / (x * (1.0 - k) + k);
    g1(n_dot_v) * g1(n_dot_l)
}

/// Kelemen visibility used by the clearcoat lobe.
#[inline]
pub fn v_kelemen(l_dot_h: f32) -> f32 {
    0.25 / (l_dot_h * l_dot_h).max(1e-4)
}

/// Schlick's Fresnel approximation.
#[inline]
pub fn f_schlick(f0: Vec3, v_dot_h: f32) -> Vec3 {
    let f = (1.0 - v_dot_h).clamp(0.0, 1.0).powi(5);
    f0 + (Vec3::ONE - f0) * f
}

/// Scalar Schlick Fresnel.
#[inline]
pub fn f_schlick_scalar(f0: f32, v_dot_h: f32) -> f32 {
    f0 + (1.0 - f0) * (1.0 - v_dot_h).clamp(0.0, 1.0).powi(5)
}

/// Reflectance at normal incidence of a dielectric of index `ior` in air.
#[inline]
pub fn f0_from_ior(ior: f32) -> f32 {
    let r = (ior - 1.0) / (ior + 1.0);
    r * r
}

/// Material inputs at a shading point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    /// Linear base color.
    pub base_color: Vec3,
    /// Metallic factor.
    pub metallic: f32,
    /// Perceptual roughness.
    pub roughness: f32,
    /// Specular factor, 0.5 leaves the IOR reflectance unchanged.
    pub specular: f32,
    /// Index of refraction.
    pub ior: f32,
    /// Specular tint of dielectrics.
    pub specular_color: Vec3,
    /// Clearcoat intensity.
    pub clearcoat: f32,
    /// Clearcoat roughness.
    pub clearcoat_roughness: f32,
    /// Diffuse transmission factor.
    pub transmission: f32,
}

impl Default for Surface {
    fn default() -> Self {
        Self {
            base_color: Vec3::ONE,
            metallic: 0.0,
            roughness: 0.5,
            specular: 0.5,
            ior: 1.5,
            specular_color: Vec3::ONE,
            clearcoat: 0.0,
            clearcoat_roughness: 0.0,
            transmission: 0.0,
        }
    }
}

impl Surface {
    /// Specular reflectance at normal incidence.
    pub fn f0(&self) -> Vec3 {
        let dielectric = f0_from_ior(self.ior) * (self.specular * 2.0);
        let dielectric = (self.specular_color * dielectric).min(Vec3::ONE);
        dielectric.lerp(self.base_color, self.metallic)
    }

    /// Lambertian albedo.
    pub fn diffuse_color(&self) -> Vec3 {
        self.base_color * (1.0 - self.metallic)
    }

    fn clamped_roughness(&self) -> f32 {
        self.roughness.clamp(MIN_ROUGHNESS, 1.0)
    }

    /// Outgoing radiance towards `v` from a light arriving along `l`.
    ///
    /// `n`, `v` and `l` are unit vectors pointing away from the surface.
    pub fn shade(&self, n: Vec3, v: Vec3, l: Vec3, radiance: Vec3) -> Vec3 {
        let n_dot_l = n.dot(l);
        let diffuse_color = self.diffuse_color();
        if n_dot_l <= 0.0 {
            // Light behind the surface only reaches the viewer through
            // diffuse transmission.
            return diffuse_color * (self.transmission * -n_dot_l / PI) * radiance;
        }
        let n_dot_v = n.dot(v).max(1e-4);
        let h = (v + l).normalize();
        let n_dot_h = saturate(n.dot(h));
        let l_dot_h = saturate(l.dot(h));
        let v_dot_h = saturate(v.dot(h));
        let roughness = self.clamped_roughness();

        let f = f_schlick(self.f0(), v_dot_h);
        let specular = f * (d_ggx(n_dot_h, roughness) * v_smith_ggx_correlated(n_dot_v, n_dot_l, roughness));
        let kd = (Vec3::ONE - f) * (1.0 - self.transmission);
        let diffuse = kd * diffuse_color * (1.0 / PI);

        let mut color = diffuse + specular;
        if self.clearcoat > 0.0 {
            let cc_roughness = self.clearcoat_roughness.clamp(MIN_ROUGHNESS, 1.0);
            let fc = f_schlick_scalar(CLEARCOAT_F0, v_dot_h) * self.clearcoat;
            let coat = d_ggx(n_dot_h, cc_roughness) * v_kelemen(l_dot_h) * fc;
            color = color * (1.0 - fc) + Vec3::splat(coat);
        }
        color * radiance * n_dot_l
    }

    /// Image-based lighting with the split-sum approximation.
    ///
    /// `brdf` is the LUT sample `(scale, bias)` at `(n.v, roughness)`.
    pub fn ambient(&self, n_dot_v: f32, irradiance: Vec3, prefiltered: Vec3, brdf: [f32; 2]) -> Vec3 {
        let specular = prefiltered * (self.f0() * brdf[0] + Vec3::splat(brdf[1]));
        let diffuse = irradiance * self.diffuse_color() * (1.0 - self.transmission * 0.5);
        let mut color = diffuse + specular;
        if self.clearcoat > 0.0 {
            let fc = f_schlick_scalar(CLEARCOAT_F0, saturate(n_dot_v)) * self.clearcoat;
            color = color * (1.0 - fc) + prefiltered * fc;
        }
        color
    }

    /// Prefiltered mip to sample for this roughness.
    pub fn specular_mip(&self, max_mip: f32) -> f32 {
        lerp(0.0, max_mip, saturate(self.roughness))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ggx_integrates_to_one_over_projected_hemisphere() {
        // D(h) (n.h) over the hemisphere is 1.
        let roughness = 0.6;
        let steps = 2048;
        let mut sum = 0.0;
        for i in 0..steps {
            let theta = (i as f32 + 0.5) / steps as f32 * (PI / 2.0);
            let (s, c) = theta.sin_cos();
            sum += d_ggx(c, roughness) * c * s * (PI / 2.0) / steps as f32 * 2.0 * PI;
        }
        assert_relative_eq!(sum, 1.0, epsilon = 1e-2);
    }

    #[test]
    fn test_fresnel_limits() {
        let f0 = Vec3::splat(0.04);
        assert_relative_eq!(f_schlick(f0, 1.0).x, 0.04);
        assert_relative_eq!(f_schlick(f0, 0.0).x, 1.0);
        assert_relative_eq!(f0_from_ior(1.5), 0.04, epsilon = 1e-6);
    }

    #[test]
    fn test_metal_has_no_diffuse_and_tinted_f0() {
        let gold = Surface {
            base_color: Vec3::new(1.0, 0.8, 0.3),
            metallic: 1.0,
            ..Default::default()
        };
        assert_eq!(gold.diffuse_color(), Vec3::ZERO);
        assert_relative_eq!(gold.f0().y, 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_backlit_surface_is_black_without_transmission() {
        let n = Vec3::Z;
        let v = Vec3::Z;
        let l = Vec3::new(0.0, 0.0, -1.0);
        let opaque = Surface::default();
        assert_eq!(opaque.shade(n, v, l, Vec3::ONE), Vec3::ZERO);
        let leaf = Surface {
            transmission: 1.0,
            ..Default::default()
        };
        assert!(leaf.shade(n, v, l, Vec3::ONE).x > 0.0);
    }

    #[test]
    fn test_frontlit_lambert_dominates_for_rough_dielectric() {
        let surface = Surface {
            roughness: 1.0,
            ..Default::default()
        };
        let c = surface.shade(Vec3::Z, Vec3::Z, Vec3::Z, Vec3::ONE);
        // Lambert alone is 1/pi, the specular lobe adds a little.
        assert!(c.x > 0.9 / PI && c.x < 1.5 / PI);
    }
}
