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

//! The device-agnostic core of the Cortex renderer.
//!
//! Layers, bottom-up:
//! - `api` and `traits` define the explicit GPU contract that a backend in
//!   `cortex-infra` implements.
//! - `device`, `descriptors`, `bindless` and `upload` manage queues, heaps,
//!   bindless slots and CPU-to-GPU transfers on top of that contract.
//! - `graph` turns per-frame pass declarations into barrier plans.
//! - `scene` and `shading` hold the GPU data model and the shading math
//!   shared by every pipeline stage in `cortex-lanes`.

pub mod api;
pub mod bindless;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod graph;
pub mod scene;
pub mod shading;
pub mod traits;
pub mod upload;

#[cfg(test)]
pub(crate) mod mock;

pub use self::bindless::{BindlessRegistry, BindlessSlot, Placeholder, PlaceholderTextures};
pub use self::descriptors::DescriptorHeapManager;
pub use self::device::{CommandQueue, RenderDevice};
pub use self::error::{
    BindlessError, DescriptorError, DeviceError, GraphError, PipelineError, RenderError,
    ResourceError, UploadError,
};
pub use self::graph::{PassBuilder, PassContext, PassType, RenderGraph, RgHandle, RgUsage};
pub use self::traits::{CommandList, GpuBackend, GpuDevice};
pub use self::upload::{ConstantBuffer, MappedBuffer, MappedTable, Uploader};
