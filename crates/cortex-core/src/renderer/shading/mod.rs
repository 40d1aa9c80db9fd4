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

//! CPU formulations of the shading math the pipeline's shaders evaluate.
//!
//! The reference device runs its kernels on these functions, which keeps the
//! software path and the HLSL in lockstep.

pub mod attenuation;
pub mod barycentrics;
pub mod brdf;
pub mod brdf_lut;
pub mod equirect;
pub mod sampling;

pub use self::barycentrics::Barycentrics;
pub use self::brdf::Surface;
