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

//! # Cortex Infra
//!
//! Concrete implementations of the contracts defined in `cortex-core`.
//!
//! The crate ships the `wgpu` device, which runs the renderer's WGSL programs
//! on a real adapter, the software reference device, a CPU interpreter of the
//! same API, and the logging bootstrap shared by binaries and tests.

#![warn(missing_docs)]

pub mod graphics;
pub mod logging;

pub use graphics::software::{SoftwareBackend, SoftwareDevice};
pub use graphics::wgpu::{WgpuBackend, WgpuDevice};
