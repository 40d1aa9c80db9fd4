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

//! The `CORTEX_RG_DUMP` report of a compiled frame.

use super::compiler::{CompiledPass, PassStatus};
use super::pass::RgPass;
use super::resource::{Origin, ResourceTable};

/// Logs the resources, their final states, the pass count and the barrier
/// count of a compiled frame.
pub(crate) fn log_dump(table: &ResourceTable, passes: &[RgPass], plan: &[CompiledPass]) {
    log::info!("--- Render graph (generation {}) ---", table.generation);
    for (index, resource) in table.entries.iter().enumerate() {
        let origin = match resource.origin {
            Origin::Imported => "imported",
            Origin::Transient => "transient",
        };
        log::info!(
            "  [{index}] '{}' {origin} {:?} {}x{} {:?} -> {:?}{}",
            resource.name,
            resource.desc.dimension,
            resource.desc.width,
            resource.desc.height,
            resource.desc.format,
            resource.states,
            if resource.failed { " (FAILED)" } else { "" }
        );
    }
    for (pass, compiled) in passes.iter().zip(plan) {
        match compiled.status {
            PassStatus::Live => {
                log::info!("  pass '{}' ({} barriers)", pass.name, compiled.barriers.len())
            }
            status => log::info!("  pass '{}' {status:?}", pass.name),
        }
    }
    let barriers: usize = plan.iter().map(|p| p.barriers.len()).sum();
    log::info!("  {} passes, {barriers} barriers", passes.len());
}
