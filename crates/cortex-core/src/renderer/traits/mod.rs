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

//! Defines the core architectural traits for the rendering subsystem.
//!
//! These contracts decouple the renderer from the concrete device backend.
//!
//! - [`GpuDevice`]: creates resources, views, pipelines, queues and fences.
//! - [`GpuBackend`]: enumerates adapters and creates devices.
//! - [`CommandList`]: records GPU commands for one queue family.

mod command_list;
mod graphics_device;

pub use self::command_list::CommandList;
pub use self::graphics_device::{compute_copyable_footprints, GpuBackend, GpuDevice};
