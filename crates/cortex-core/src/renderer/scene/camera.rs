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

//! The scene camera.

use crate::math::{Mat4, Vec3};
use crate::renderer::error::RenderError;

/// A view and a projection, right-handed with `[0, 1]` depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// World to view.
    pub view: Mat4,
    /// View to clip.
    pub projection: Mat4,
    /// Near plane distance.
    pub near: f32,
    /// Far plane distance.
    pub far: f32,
}

impl Camera {
    /// A perspective camera at `eye` looking at `target`.
    pub fn look_at(
        eye: Vec3,
        target: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Result<Self, RenderError> {
        let view = Mat4::look_at_rh(eye, target, Vec3::Y)
            .or_else(|| Mat4::look_at_rh(eye, target, Vec3::Z))
            .ok_or_else(|| RenderError::InvalidScene("degenerate view".into()))?;
        let projection = Mat4::perspective_rh_zo(fov_y, aspect, near, far)
            .ok_or_else(|| RenderError::InvalidScene("degenerate projection".into()))?;
        Ok(Self {
            view,
            projection,
            near,
            far,
        })
    }

    /// World to clip.
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Clip to world.
    pub fn inverse_view_projection(&self) -> Result<Mat4, RenderError> {
        self.view_projection()
            .inverse()
            .ok_or_else(|| RenderError::InvalidScene("singular view-projection".into()))
    }

    /// Clip to view.
    pub fn inverse_projection(&self) -> Result<Mat4, RenderError> {
        self.projection
            .inverse()
            .ok_or_else(|| RenderError::InvalidScene("singular projection".into()))
    }

    /// World-space eye position.
    pub fn position(&self) -> Vec3 {
        self.view
            .inverse()
            .map_or(Vec3::ZERO, |m| m.cols[3].truncate())
    }
}

impl Default for Camera {
    fn default() -> Self {
        let near = 0.1;
        let far = 1000.0;
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::perspective_rh_zo(std::f32::consts::FRAC_PI_3, 16.0 / 9.0, near, far)
                .unwrap_or(Mat4::IDENTITY),
            near,
            far,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_position_round_trips_through_the_view() {
        let eye = Vec3::new(3.0, 2.0, 5.0);
        let camera = Camera::look_at(eye, Vec3::ZERO, 1.0, 1.5, 0.1, 100.0).unwrap();
        let p = camera.position();
        assert_relative_eq!(p.x, eye.x, epsilon = 1e-4);
        assert_relative_eq!(p.y, eye.y, epsilon = 1e-4);
        assert_relative_eq!(p.z, eye.z, epsilon = 1e-4);
    }

    #[test]
    fn test_straight_down_view_is_accepted() {
        let camera = Camera::look_at(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO, 1.0, 1.0, 0.1, 50.0);
        assert!(camera.is_ok());
    }

    #[test]
    fn test_target_projects_to_screen_center() {
        let camera =
            Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 1.0, 1.0, 0.1, 100.0).unwrap();
        let ndc = camera.view_projection().project_point3(Vec3::ZERO);
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }
}
