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

//! # Cortex Agents
//!
//! The frame orchestrator of the deferred visibility-buffer renderer. The
//! [`RenderAgent`] owns the device-level state of the pipeline (heaps, upload
//! tables, persistent targets and frame fences) and drives the lanes of
//! `cortex-lanes` through one render graph per frame.

#![warn(missing_docs)]

pub mod render_agent;

pub use render_agent::*;
