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

//! Falloff of punctual lights.

use crate::math::saturate;

/// Inverse-square falloff windowed to reach zero at `range`.
#[inline]
pub fn distance(distance: f32, range: f32) -> f32 {
    if range <= 0.0 {
        return 0.0;
    }
    let ratio = distance / range;
    let window = saturate(1.0 - ratio * ratio * ratio * ratio);
    window * window / (distance * distance).max(1e-4)
}

/// Smooth cone falloff between the outer and inner cone cosines.
#[inline]
pub fn spot(cos_angle: f32, cos_inner: f32, cos_outer: f32) -> f32 {
    let t = saturate((cos_angle - cos_outer) / (cos_inner - cos_outer).max(1e-4));
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_falloff_reaches_zero_at_range() {
        assert_eq!(distance(5.0, 5.0), 0.0);
        assert_eq!(distance(6.0, 5.0), 0.0);
        assert!(distance(1.0, 5.0) > distance(2.0, 5.0));
        assert_eq!(distance(1.0, 0.0), 0.0);
    }

    #[test]
    fn test_spot_cone() {
        assert_eq!(spot(1.0, 0.9, 0.8), 1.0);
        assert_eq!(spot(0.7, 0.9, 0.8), 0.0);
        let mid = spot(0.85, 0.9, 0.8);
        assert!(mid > 0.0 && mid < 1.0);
    }
}
