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

//! Graphics backends.
//!
//! [`wgpu`] drives a real adapter; [`software`] interprets the same API on
//! the CPU and serves as the reference the GPU kernels are tested against.

pub(crate) mod checks;
pub(crate) mod debug;
pub(crate) mod descriptors;
pub(crate) mod recording;
pub mod software;
pub(crate) mod swap_chain;
pub(crate) mod texel;
pub mod wgpu;
