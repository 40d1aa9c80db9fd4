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

//! # Cortex Lanes
//!
//! The passes of the deferred visibility-buffer pipeline. Each lane owns the
//! root signature and pipeline states of one stage and declares its passes
//! into the frame's [`RenderGraph`](cortex_core::renderer::RenderGraph).
//! Recording happens later, inside the graph's execution, through
//! value-captured closures.

#![warn(missing_docs)]

pub mod render_lane;

pub use render_lane::*;
