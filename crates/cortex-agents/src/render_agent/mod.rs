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

//! Acts as the **[A]gent** for the rendering subsystem.
//!
//! The agent decides what a frame contains and in which order its passes run,
//! but leaves the command recording to the lanes. Each call to
//! [`RenderAgent::render`]:
//! - waits for the frame slot it is about to reuse and retires deferred
//!   bindless releases;
//! - partitions the scene's instances into per-mesh pipeline ranges and fills
//!   the persistently mapped scene tables;
//! - imports the persistent targets with the states the previous frame left
//!   them in, declares shadow, visibility, material resolve, cluster culling,
//!   deferred lighting, motion vectors, post-process and presentation;
//! - compiles, executes, presents and signals the slot fence.
//!
//! Shadow rendering and post-processing are extension points, see
//! [`ShadowHook`] and [`PostProcessHook`].

mod agent;
mod frame;
mod hooks;
mod targets;

pub use agent::*;
pub use frame::*;
pub use hooks::*;
