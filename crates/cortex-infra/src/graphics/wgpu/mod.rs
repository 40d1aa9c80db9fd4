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

//! The `wgpu` device.
//!
//! Command lists are recorded like on the software device and translated to
//! `wgpu` passes by one worker thread per queue. Shader programs are WGSL
//! modules looked up by file stem and entry point; the shader-visible heap
//! becomes a bind group of binding arrays.

mod backend;
mod context;
mod conversions;
mod device;
mod executor;
mod heap;
mod pipeline;
mod queue;
mod shaders;
mod state;
mod views;

pub use self::backend::WgpuBackend;
pub use self::device::WgpuDevice;
