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

//! The software reference device.
//!
//! Command lists are recorded on the calling thread and interpreted by one
//! worker thread per queue. Shader programs are CPU kernels looked up by
//! file stem and entry point.

mod backend;
mod bindings;
mod device;
mod executor;
mod kernels;
mod memory;
mod pipeline;
mod queue;
mod raster;
mod sampler;
mod state;
mod validation;

pub use self::backend::SoftwareBackend;
pub use self::device::SoftwareDevice;
