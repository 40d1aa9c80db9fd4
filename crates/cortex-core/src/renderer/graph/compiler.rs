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

//! Validation, culling and barrier planning.

use std::collections::HashSet;

use super::pass::{Access, RgPass};
use super::resource::{Origin, ResourceTable, RgHandle};
use super::usage::RgUsage;
use crate::renderer::api::{ResourceBarrier, ResourceStates, ALL_SUBRESOURCES};
use crate::renderer::error::GraphError;

/// What compilation decided for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
    /// Recorded this frame.
    Live,
    /// Dropped because nothing consumes its outputs.
    Culled,
    /// Dropped because a transient it touches could not be created.
    Skipped,
}

/// A pass's compiled form: its status and the barriers recorded before it.
#[derive(Debug, Clone)]
pub(crate) struct CompiledPass {
    pub(crate) status: PassStatus,
    pub(crate) barriers: Vec<ResourceBarrier>,
}

fn overlapping_subresource(a: &Access, b: &Access) -> Option<u32> {
    if a.handle != b.handle {
        return None;
    }
    match (a.subresource, b.subresource) {
        (ALL_SUBRESOURCES, s) | (s, ALL_SUBRESOURCES) => Some(s),
        (x, y) if x == y => Some(x),
        _ => None,
    }
}

/// Checks handles, usages, subresource ranges and the read-write rule.
pub(crate) fn validate(table: &ResourceTable, pass: &RgPass) -> Result<(), GraphError> {
    for access in &pass.accesses {
        let resource = table.get(access.handle)?;
        if access.usage.is_empty() {
            return Err(GraphError::EmptyUsage {
                pass: pass.name.clone(),
                resource: resource.name.clone(),
            });
        }
        if !access.usage.is_well_formed() {
            return Err(GraphError::ConflictingUsage {
                pass: pass.name.clone(),
                resource: resource.name.clone(),
                usage: format!("{:?}", access.usage),
            });
        }
        let count = resource.subresource_count();
        if access.subresource != ALL_SUBRESOURCES && access.subresource >= count {
            return Err(GraphError::InvalidSubresource {
                pass: pass.name.clone(),
                resource: resource.name.clone(),
                subresource: access.subresource,
                count,
            });
        }
    }
    for &(before, after) in &pass.aliases {
        table.check(before)?;
        table.check(after)?;
    }

    for (i, a) in pass.accesses.iter().enumerate() {
        for b in &pass.accesses[i + 1..] {
            let Some(subresource) = overlapping_subresource(a, b) else {
                continue;
            };
            let resource = &table.get(a.handle)?.name;
            let split_read_write = (a.kind.reads() && !a.kind.writes() && b.kind.writes())
                || (b.kind.reads() && !b.kind.writes() && a.kind.writes());
            if split_read_write {
                return Err(GraphError::ReadWriteWithoutDeclaration {
                    pass: pass.name.clone(),
                    resource: resource.clone(),
                    subresource,
                });
            }
            let merged = a.usage | b.usage;
            if !merged.is_well_formed() {
                return Err(GraphError::ConflictingUsage {
                    pass: pass.name.clone(),
                    resource: resource.clone(),
                    usage: format!("{merged:?}"),
                });
            }
        }
    }
    Ok(())
}

/// Marks opted-in passes whose outputs nothing consumes as culled.
///
/// Walks the passes backwards. A pass stays live if it did not opt in, or if
/// it writes an imported resource or one a later live pass reads.
pub(crate) fn cull(table: &ResourceTable, passes: &[RgPass]) -> Vec<PassStatus> {
    let mut needed = HashSet::new();
    let mut statuses = vec![PassStatus::Live; passes.len()];
    for (index, pass) in passes.iter().enumerate().rev() {
        let live = !pass.allow_culling
            || pass.writes().any(|handle| {
                needed.contains(&handle)
                    || table
                        .get(handle)
                        .map(|r| r.origin == Origin::Imported)
                        .unwrap_or(false)
            });
        if live {
            needed.extend(pass.reads());
        } else {
            log::debug!("Culling pass '{}'", pass.name);
            statuses[index] = PassStatus::Culled;
        }
    }
    statuses
}

/// Required usage and write flag per subresource of one resource in one pass.
fn requirements(pass: &RgPass, handle_index: usize, table: &ResourceTable, count: u32) -> Vec<Option<(RgUsage, bool)>> {
    let mut required: Vec<Option<(RgUsage, bool)>> = vec![None; count as usize];
    for access in pass
        .accesses
        .iter()
        .filter(|a| a.handle.index() == handle_index && table.check(a.handle).is_ok())
    {
        for (subresource, slot) in required.iter_mut().enumerate() {
            if !access.covers(subresource as u32) {
                continue;
            }
            let (usage, writes) = slot.get_or_insert((RgUsage::EMPTY, false));
            *usage |= access.usage;
            *writes |= access.kind.writes();
        }
    }
    required
}

/// Emits the barriers a live pass needs and advances the state table.
///
/// Order: aliasing, then transitions, then UAV barriers.
pub(crate) fn plan_barriers(table: &mut ResourceTable, pass: &RgPass) -> Vec<ResourceBarrier> {
    let mut barriers = Vec::new();

    for &(before, after) in &pass.aliases {
        let physical = |h: RgHandle| table.get(h).ok().and_then(|r| r.physical);
        barriers.push(ResourceBarrier::Aliasing {
            before: physical(before),
            after: physical(after),
        });
    }

    let mut touched: Vec<usize> = Vec::new();
    for access in &pass.accesses {
        let index = access.handle.index();
        if !touched.contains(&index) {
            touched.push(index);
        }
    }

    let mut uav_barriers = Vec::new();
    for index in touched {
        let count = table.entries[index].subresource_count();
        let required = requirements(pass, index, table, count);
        let resource = &mut table.entries[index];
        let Some(physical) = resource.physical else {
            continue;
        };

        let needs_uav = required.iter().enumerate().any(|(s, req)| {
            matches!(req, Some((usage, _)) if usage.contains(RgUsage::UNORDERED_ACCESS))
                && resource.states[s] == ResourceStates::UNORDERED_ACCESS
                && resource.last_write[s]
        });
        if needs_uav {
            uav_barriers.push(ResourceBarrier::uav(physical));
        }

        // Target state per subresource, `None` where nothing changes.
        let targets: Vec<Option<ResourceStates>> = required
            .iter()
            .enumerate()
            .map(|(s, req)| {
                let (usage, writes) = (*req)?;
                let wanted = usage.required_state();
                let current = resource.states[s];
                let satisfied = current == wanted
                    || (!writes && !wanted.is_write() && !current.is_write() && current.contains(wanted));
                (!satisfied).then_some(wanted)
            })
            .collect();

        let all_touched = required.iter().all(Option::is_some);
        let uniform_before = resource.states.windows(2).all(|w| w[0] == w[1]);
        let uniform_after = targets.windows(2).all(|w| w[0] == w[1]);
        match targets[0] {
            Some(after) if all_touched && uniform_before && uniform_after => {
                barriers.push(ResourceBarrier::transition(physical, resource.states[0], after));
            }
            _ => {
                for (s, target) in targets.iter().enumerate() {
                    if let Some(after) = *target {
                        barriers.push(ResourceBarrier::Transition {
                            resource: physical,
                            subresource: s as u32,
                            before: resource.states[s],
                            after,
                        });
                    }
                }
            }
        }

        for (s, req) in required.iter().enumerate() {
            if let Some((_, writes)) = req {
                if let Some(after) = targets[s] {
                    resource.states[s] = after;
                }
                resource.last_write[s] = *writes;
            }
        }
    }
    barriers.extend(uav_barriers);
    barriers
}
