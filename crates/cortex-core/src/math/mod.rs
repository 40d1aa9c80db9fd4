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

//! Linear algebra used by the renderer: vectors, column-major matrices, and
//! the few bounding volumes the light and instance cullers need.
//!
//! Conventions: right-handed view space looking down `-Z`, clip-space depth in
//! `[0, 1]`, column vectors (`m * v`), angles in radians.

/// Tolerance used for degenerate-geometry checks.
pub const EPSILON: f32 = 1e-6;

pub use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

pub mod geometry;
pub mod matrix;
pub mod vector;

pub use self::geometry::{Aabb, Frustum, Sphere};
pub use self::matrix::Mat4;
pub use self::vector::{Vec2, Vec3, Vec4};

/// Clamps `x` to `[0, 1]`.
#[inline]
pub fn saturate(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

/// Linear interpolation between `a` and `b`.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
