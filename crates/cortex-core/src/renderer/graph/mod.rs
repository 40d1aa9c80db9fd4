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

//! The per-frame render graph.
//!
//! A frame declares its resources (imported or transient) and its passes,
//! each with the usages it needs. [`RenderGraph::compile`] validates the
//! declarations, culls opted-in passes nobody consumes, leases transients from
//! a pool and turns usage changes into barriers. [`RenderGraph::execute`]
//! then records each pass behind its barriers, in declaration order.
//!
//! ```ignore
//! graph.begin_frame();
//! let color = graph.create_transient(desc, "color");
//! graph
//!     .add_pass("draw", PassType::Graphics)
//!     .write(color, RgUsage::RENDER_TARGET)
//!     .execute(move |ctx| { /* record */ Ok(()) });
//! graph.compile()?;
//! graph.execute(cmd, &mut descriptors)?;
//! graph.end_frame();
//! ```

mod compiler;
mod dump;
mod pass;
mod pool;
mod resource;
mod usage;

use std::sync::Arc;

pub use self::compiler::PassStatus;
pub use self::pass::{PassBuilder, PassCallback, PassContext, PassType};
pub use self::resource::{RgHandle, RgResolver};
pub use self::usage::RgUsage;

use self::compiler::CompiledPass;
use self::pass::RgPass;
use self::pool::TransientPool;
use self::resource::{Origin, ResourceTable, RgResource};
use crate::config::RendererConfig;
use crate::renderer::api::{ResourceDesc, ResourceId, ResourceStates};
use crate::renderer::descriptors::DescriptorHeapManager;
use crate::renderer::error::{GraphError, RenderError, ResourceError};
use crate::renderer::traits::{CommandList, GpuDevice};

/// Counters of the last compiled frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Passes declared.
    pub passes: u32,
    /// Passes culled.
    pub culled: u32,
    /// Passes skipped after a transient creation failure.
    pub skipped: u32,
    /// Barriers planned.
    pub barriers: u32,
    /// Transients served from the pool.
    pub pool_hits: u32,
    /// Transients created.
    pub pool_misses: u32,
    /// Resources owned by the pool, leased or free.
    pub pool_size: u32,
}

/// A render graph rebuilt every frame over a persistent transient pool.
pub struct RenderGraph {
    device: Arc<dyn GpuDevice>,
    table: ResourceTable,
    passes: Vec<RgPass>,
    plan: Option<Vec<CompiledPass>>,
    pool: TransientPool,
    executed: bool,
    dump: bool,
    stats: GraphStats,
}

impl RenderGraph {
    /// Creates an empty graph. The dump flag and pool policy come from
    /// `config`.
    pub fn new(device: Arc<dyn GpuDevice>, config: &RendererConfig) -> Self {
        Self {
            device,
            table: ResourceTable::default(),
            passes: Vec::new(),
            plan: None,
            pool: TransientPool::new(config.render_graph.pool_max_idle_frames),
            executed: false,
            dump: config.render_graph_dump_enabled(),
            stats: GraphStats::default(),
        }
    }

    /// Starts a new frame.
    ///
    /// Returns last frame's transients to the pool, evicts long-idle pool
    /// entries and invalidates every handle issued so far.
    pub fn begin_frame(&mut self) {
        for resource in &self.table.entries {
            if resource.origin != Origin::Transient {
                continue;
            }
            if let Some(physical) = resource.physical {
                let states = if self.executed {
                    &resource.states
                } else {
                    &resource.initial
                };
                self.pool.give_back(physical, states);
            }
        }
        self.pool.age(self.device.as_ref());
        self.pool.reset_counters();
        self.table.reset();
        self.passes.clear();
        self.plan = None;
        self.executed = false;
        self.stats = GraphStats::default();
    }

    /// Imports an externally owned resource whose subresources are all in
    /// `state`.
    pub fn import(
        &mut self,
        resource: ResourceId,
        state: ResourceStates,
        name: &str,
    ) -> Result<RgHandle, RenderError> {
        let desc = self.device.resource_desc(resource)?;
        let states = vec![state; desc.subresource_count() as usize];
        Ok(self
            .table
            .push(RgResource::imported(name.to_owned(), desc, resource, states)))
    }

    /// Imports an externally owned resource with one state per subresource.
    pub fn import_with_states(
        &mut self,
        resource: ResourceId,
        states: Vec<ResourceStates>,
        name: &str,
    ) -> Result<RgHandle, RenderError> {
        let desc = self.device.resource_desc(resource)?;
        if states.len() != desc.subresource_count() as usize {
            return Err(ResourceError::InvalidDesc(format!(
                "'{name}' has {} subresources but {} states were given",
                desc.subresource_count(),
                states.len()
            ))
            .into());
        }
        Ok(self
            .table
            .push(RgResource::imported(name.to_owned(), desc, resource, states)))
    }

    /// Declares a resource realized from the transient pool at compile time.
    pub fn create_transient(&mut self, desc: ResourceDesc, name: &str) -> RgHandle {
        self.table.push(RgResource::transient(name.to_owned(), desc))
    }

    /// Starts declaring a pass.
    pub fn add_pass(&mut self, name: &str, ty: PassType) -> PassBuilder<'_> {
        PassBuilder {
            graph: self,
            pass: RgPass {
                name: name.to_owned(),
                ty,
                accesses: Vec::new(),
                aliases: Vec::new(),
                allow_culling: false,
                callback: None,
            },
        }
    }

    pub(crate) fn push_pass(&mut self, pass: RgPass) {
        self.plan = None;
        self.passes.push(pass);
    }

    /// Validates the frame, culls, realizes transients and plans barriers.
    ///
    /// Declaration errors abort the frame. A transient that cannot be created
    /// only skips the passes that touch it.
    pub fn compile(&mut self) -> Result<(), GraphError> {
        if self.plan.is_some() {
            return Ok(());
        }
        for pass in &self.passes {
            compiler::validate(&self.table, pass)?;
        }

        let mut statuses = compiler::cull(&self.table, &self.passes);
        self.realize_transients(&statuses);

        for (pass, status) in self.passes.iter().zip(statuses.iter_mut()) {
            if *status != PassStatus::Live {
                continue;
            }
            let failed = self
                .table
                .entries
                .iter()
                .enumerate()
                .any(|(i, r)| r.failed && pass.touches(self.table.handle_of(i)));
            if failed {
                log::warn!("Skipping pass '{}': a transient it uses is unavailable", pass.name);
                *status = PassStatus::Skipped;
            }
        }

        let mut plan = Vec::with_capacity(self.passes.len());
        for (pass, status) in self.passes.iter().zip(statuses) {
            let barriers = if status == PassStatus::Live {
                compiler::plan_barriers(&mut self.table, pass)
            } else {
                Vec::new()
            };
            plan.push(CompiledPass { status, barriers });
        }

        self.stats = GraphStats {
            passes: self.passes.len() as u32,
            culled: count(&plan, PassStatus::Culled),
            skipped: count(&plan, PassStatus::Skipped),
            barriers: plan.iter().map(|p| p.barriers.len() as u32).sum(),
            pool_hits: self.pool.hits,
            pool_misses: self.pool.misses,
            pool_size: self.pool.len() as u32,
        };
        self.plan = Some(plan);
        Ok(())
    }

    fn realize_transients(&mut self, statuses: &[PassStatus]) {
        for index in 0..self.table.entries.len() {
            let handle = self.table.handle_of(index);
            let resource = &self.table.entries[index];
            if resource.origin != Origin::Transient || resource.physical.is_some() || resource.failed {
                continue;
            }
            let used = self
                .passes
                .iter()
                .zip(statuses)
                .any(|(pass, status)| *status == PassStatus::Live && pass.touches(handle));
            if !used {
                continue;
            }
            let desc = resource.desc;
            match self.pool.acquire(self.device.as_ref(), &desc, &resource.name) {
                Ok((physical, states)) => self.table.entries[index].realize(physical, states),
                Err(err) => {
                    let resource = &mut self.table.entries[index];
                    log::warn!("Failed to create transient '{}': {err}", resource.name);
                    resource.failed = true;
                }
            }
        }
    }

    /// Records every live pass, each wrapped in a debug event and preceded by
    /// its barriers.
    ///
    /// A failing pass is logged and the frame goes on; only fatal errors
    /// such as a removed device are returned.
    pub fn execute(
        &mut self,
        cmd: &mut dyn CommandList,
        descriptors: &mut DescriptorHeapManager,
    ) -> Result<(), RenderError> {
        let Self {
            device,
            table,
            passes,
            plan,
            ..
        } = &mut *self;
        let plan = plan.as_ref().ok_or(GraphError::NotCompiled)?;
        for (pass, compiled) in passes.iter_mut().zip(plan) {
            if compiled.status != PassStatus::Live {
                continue;
            }
            cmd.begin_event(&pass.name);
            if !compiled.barriers.is_empty() {
                cmd.resource_barrier(&compiled.barriers);
            }
            let result = match pass.callback.take() {
                Some(callback) => {
                    let mut ctx = PassContext {
                        cmd: &mut *cmd,
                        device: &*device,
                        descriptors: &mut *descriptors,
                        resources: RgResolver { table: &*table },
                        pass_name: &pass.name,
                    };
                    callback(&mut ctx)
                }
                None => Ok(()),
            };
            cmd.end_event();
            if let Err(err) = result {
                if err.is_fatal() {
                    return Err(err);
                }
                log::error!("Pass '{}' ({:?}) failed: {err}", pass.name, pass.ty);
            }
        }
        self.executed = true;
        Ok(())
    }

    /// Closes the frame. Transients stay leased until the next
    /// [`RenderGraph::begin_frame`].
    pub fn end_frame(&mut self) {
        if self.dump {
            if let Some(plan) = &self.plan {
                dump::log_dump(&self.table, &self.passes, plan);
            }
        }
    }

    /// The state each subresource of `handle` is left in by the compiled
    /// frame.
    pub fn final_state(&self, handle: RgHandle) -> Result<&[ResourceStates], GraphError> {
        if self.plan.is_none() {
            return Err(GraphError::NotCompiled);
        }
        Ok(&self.table.get(handle)?.states)
    }

    /// Final states of every resource, in handle order.
    pub fn final_states(&self) -> Vec<(RgHandle, &str, &[ResourceStates])> {
        self.table
            .entries
            .iter()
            .enumerate()
            .map(|(i, r)| (self.table.handle_of(i), r.name.as_str(), r.states.as_slice()))
            .collect()
    }

    /// The device resource behind `handle`, once realized.
    pub fn resource(&self, handle: RgHandle) -> Result<ResourceId, GraphError> {
        RgResolver { table: &self.table }.resource(handle)
    }

    /// What compilation decided for each pass, in declaration order.
    pub fn pass_statuses(&self) -> Vec<(&str, PassStatus)> {
        match &self.plan {
            Some(plan) => self
                .passes
                .iter()
                .zip(plan)
                .map(|(pass, compiled)| (pass.name.as_str(), compiled.status))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Counters of the last compiled frame.
    pub fn stats(&self) -> GraphStats {
        self.stats
    }

    /// Destroys every pooled transient. The GPU must be idle.
    pub fn clear_pool(&mut self) {
        self.pool.clear(self.device.as_ref());
        for resource in &mut self.table.entries {
            if resource.origin == Origin::Transient {
                resource.physical = None;
            }
        }
    }
}

fn count(plan: &[CompiledPass], status: PassStatus) -> u32 {
    plan.iter().filter(|p| p.status == status).count() as u32
}

impl Drop for RenderGraph {
    fn drop(&mut self) {
        self.pool.clear(self.device.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::{
        Format, HeapType, QueueId, QueueType, ResourceBarrier, ResourceFlags, ALL_SUBRESOURCES,
    };
    use crate::renderer::mock::{MockCommand, MockDevice};

    struct Harness {
        mock: Arc<MockDevice>,
        device: Arc<dyn GpuDevice>,
        graph: RenderGraph,
        heaps: DescriptorHeapManager,
    }

    fn harness() -> Harness {
        let mock = MockDevice::new();
        let device: Arc<dyn GpuDevice> = mock.clone();
        let config = RendererConfig::default();
        let graph = RenderGraph::new(device.clone(), &config);
        let heaps = DescriptorHeapManager::new(&device, &config).unwrap();
        Harness {
            mock,
            device,
            graph,
            heaps,
        }
    }

    impl Harness {
        fn target(&self, desc: &ResourceDesc, state: ResourceStates, name: &str) -> ResourceId {
            self.device
                .create_committed_resource(HeapType::Default, desc, state, None, name)
                .unwrap()
        }

        fn run(&mut self) -> Result<(), RenderError> {
            let mut cmd = self.device.create_command_list(QueueType::Graphics)?;
            let result = self.graph.execute(cmd.as_mut(), &mut self.heaps);
            let id = cmd.close()?;
            self.device.execute_command_lists(QueueId(0), &[id])?;
            result
        }
    }

    fn rt_desc() -> ResourceDesc {
        ResourceDesc::texture_2d(64, 64, Format::Rgba16Float).with_flags(
            ResourceFlags::ALLOW_RENDER_TARGET | ResourceFlags::ALLOW_UNORDERED_ACCESS,
        )
    }

    fn noop(_: &mut PassContext<'_>) -> Result<(), RenderError> {
        Ok(())
    }

    fn transitions(barriers: &[ResourceBarrier]) -> Vec<(u32, ResourceStates, ResourceStates)> {
        barriers
            .iter()
            .filter_map(|b| match *b {
                ResourceBarrier::Transition {
                    subresource,
                    before,
                    after,
                    ..
                } => Some((subresource, before, after)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_render_target_then_sample_then_uav_needs_two_transitions() {
        let mut h = harness();
        let texture = h.target(&rt_desc(), ResourceStates::RENDER_TARGET, "hdr");
        h.graph.begin_frame();
        let hdr = h
            .graph
            .import(texture, ResourceStates::RENDER_TARGET, "hdr")
            .unwrap();
        h.graph
            .add_pass("A", PassType::Graphics)
            .write(hdr, RgUsage::RENDER_TARGET)
            .execute(noop);
        h.graph
            .add_pass("B", PassType::Graphics)
            .read(hdr, RgUsage::SHADER_RESOURCE)
            .execute(noop);
        h.graph
            .add_pass("C", PassType::Compute)
            .read_write(hdr, RgUsage::UNORDERED_ACCESS)
            .execute(noop);
        h.graph.compile().unwrap();
        assert_eq!(h.graph.stats().barriers, 2);
        h.run().unwrap();

        let barriers = h.mock.executed_barriers();
        assert_eq!(
            transitions(&barriers),
            vec![
                (
                    ALL_SUBRESOURCES,
                    ResourceStates::RENDER_TARGET,
                    ResourceStates::ALL_SHADER_RESOURCE
                ),
                (
                    ALL_SUBRESOURCES,
                    ResourceStates::ALL_SHADER_RESOURCE,
                    ResourceStates::UNORDERED_ACCESS
                ),
            ]
        );
        assert_eq!(
            h.graph.final_state(hdr).unwrap(),
            &[ResourceStates::UNORDERED_ACCESS]
        );
    }

    #[test]
    fn test_consecutive_uav_writes_need_one_uav_barrier() {
        let mut h = harness();
        let desc = ResourceDesc::buffer(4096).with_flags(ResourceFlags::ALLOW_UNORDERED_ACCESS);
        let buffer = h.target(&desc, ResourceStates::UNORDERED_ACCESS, "ranges");
        h.graph.begin_frame();
        let ranges = h
            .graph
            .import(buffer, ResourceStates::UNORDERED_ACCESS, "ranges")
            .unwrap();
        h.graph
            .add_pass("clear", PassType::Compute)
            .write(ranges, RgUsage::UNORDERED_ACCESS)
            .execute(noop);
        h.graph
            .add_pass("cull", PassType::Compute)
            .read_write(ranges, RgUsage::UNORDERED_ACCESS)
            .execute(noop);
        h.graph.compile().unwrap();
        h.run().unwrap();

        let barriers = h.mock.executed_barriers();
        assert_eq!(barriers, vec![ResourceBarrier::uav(buffer)]);
    }

    #[test]
    fn test_partial_writes_transition_single_subresources() {
        let mut h = harness();
        let desc = rt_desc().with_mips(4);
        let texture = h.target(&desc, ResourceStates::ALL_SHADER_RESOURCE, "chain");
        h.graph.begin_frame();
        let chain = h
            .graph
            .import(texture, ResourceStates::ALL_SHADER_RESOURCE, "chain")
            .unwrap();
        h.graph
            .add_pass("downsample", PassType::Graphics)
            .read_subresource(chain, RgUsage::SHADER_RESOURCE, 0)
            .write_subresource(chain, RgUsage::RENDER_TARGET, 1)
            .execute(noop);
        h.graph
            .add_pass("sample", PassType::Graphics)
            .read(chain, RgUsage::SHADER_RESOURCE)
            .execute(noop);
        h.graph.compile().unwrap();
        h.run().unwrap();

        let barriers = h.mock.executed_barriers();
        assert_eq!(
            transitions(&barriers),
            vec![
                (
                    1,
                    ResourceStates::ALL_SHADER_RESOURCE,
                    ResourceStates::RENDER_TARGET
                ),
                (
                    1,
                    ResourceStates::RENDER_TARGET,
                    ResourceStates::ALL_SHADER_RESOURCE
                ),
            ]
        );
        assert!(transitions(&barriers).iter().all(|(_, b, a)| b != a));
    }

    #[test]
    fn test_split_read_and_write_is_rejected() {
        let mut h = harness();
        h.graph.begin_frame();
        let color = h.graph.create_transient(rt_desc(), "color");
        h.graph
            .add_pass("feedback", PassType::Graphics)
            .read(color, RgUsage::SHADER_RESOURCE)
            .write(color, RgUsage::RENDER_TARGET)
            .execute(noop);
        assert!(matches!(
            h.graph.compile(),
            Err(GraphError::ReadWriteWithoutDeclaration { .. })
        ));
    }

    #[test]
    fn test_declaration_errors() {
        let mut h = harness();
        h.graph.begin_frame();
        let color = h.graph.create_transient(rt_desc(), "color");
        h.graph
            .add_pass("mixed", PassType::Graphics)
            .write(color, RgUsage::RENDER_TARGET | RgUsage::SHADER_RESOURCE)
            .execute(noop);
        assert!(matches!(
            h.graph.compile(),
            Err(GraphError::ConflictingUsage { .. })
        ));

        h.graph.begin_frame();
        let color = h.graph.create_transient(rt_desc(), "color");
        h.graph
            .add_pass("out of range", PassType::Graphics)
            .write_subresource(color, RgUsage::RENDER_TARGET, 3)
            .execute(noop);
        assert_eq!(
            h.graph.compile(),
            Err(GraphError::InvalidSubresource {
                pass: "out of range".into(),
                resource: "color".into(),
                subresource: 3,
                count: 1,
            })
        );
    }

    #[test]
    fn test_handles_do_not_survive_the_frame() {
        let mut h = harness();
        h.graph.begin_frame();
        let old = h.graph.create_transient(rt_desc(), "color");
        h.graph.begin_frame();
        h.graph.create_transient(rt_desc(), "color");
        h.graph
            .add_pass("late", PassType::Graphics)
            .write(old, RgUsage::RENDER_TARGET)
            .execute(noop);
        assert_eq!(
            h.graph.compile(),
            Err(GraphError::StaleHandle { handle: old.raw() })
        );
    }

    #[test]
    fn test_culling_is_opt_in() {
        let mut h = harness();
        h.graph.begin_frame();
        let unused = h.graph.create_transient(rt_desc(), "unused");
        let kept = h.graph.create_transient(rt_desc(), "kept");
        h.graph
            .add_pass("optional", PassType::Graphics)
            .write(unused, RgUsage::RENDER_TARGET)
            .allow_culling()
            .execute(noop);
        h.graph
            .add_pass("mandatory", PassType::Graphics)
            .write(kept, RgUsage::RENDER_TARGET)
            .execute(noop);
        h.graph.compile().unwrap();
        assert_eq!(
            h.graph.pass_statuses(),
            vec![("optional", PassStatus::Culled), ("mandatory", PassStatus::Live)]
        );
        assert_eq!(h.graph.stats().culled, 1);
        assert!(h.graph.resource(unused).is_err());
        assert!(h.graph.resource(kept).is_ok());
    }

    #[test]
    fn test_culled_pass_kept_when_output_is_consumed() {
        let mut h = harness();
        h.graph.begin_frame();
        let lut = h.graph.create_transient(rt_desc(), "lut");
        h.graph
            .add_pass("bake", PassType::Compute)
            .write(lut, RgUsage::UNORDERED_ACCESS)
            .allow_culling()
            .execute(noop);
        h.graph
            .add_pass("use", PassType::Graphics)
            .read(lut, RgUsage::SHADER_RESOURCE)
            .execute(noop);
        h.graph.compile().unwrap();
        assert_eq!(h.graph.stats().culled, 0);
    }

    #[test]
    fn test_failed_transient_skips_dependent_passes() {
        let mut h = harness();
        h.mock.fail_resources_named("broken");
        h.graph.begin_frame();
        let broken = h.graph.create_transient(rt_desc(), "broken");
        let fine = h.graph.create_transient(rt_desc(), "fine");
        h.graph
            .add_pass("needs broken", PassType::Graphics)
            .write(broken, RgUsage::RENDER_TARGET)
            .execute(|_| panic!("skipped passes never run"));
        h.graph
            .add_pass("needs fine", PassType::Graphics)
            .write(fine, RgUsage::RENDER_TARGET)
            .execute(noop);
        h.graph.compile().unwrap();
        assert_eq!(h.graph.stats().skipped, 1);
        h.run().unwrap();
        let events: Vec<_> = h
            .mock
            .executed()
            .concat()
            .into_iter()
            .filter(|c| matches!(c, MockCommand::BeginEvent(_)))
            .collect();
        assert_eq!(events, vec![MockCommand::BeginEvent("needs fine".into())]);
    }

    #[test]
    fn test_pool_reuses_transients_and_keeps_their_state() {
        let mut h = harness();
        for frame in 0..2 {
            h.graph.begin_frame();
            let color = h.graph.create_transient(rt_desc(), "color");
            h.graph
                .add_pass("draw", PassType::Graphics)
                .write(color, RgUsage::RENDER_TARGET)
                .execute(noop);
            h.graph.compile().unwrap();
            h.run().unwrap();
            h.graph.end_frame();
            let stats = h.graph.stats();
            if frame == 0 {
                assert_eq!((stats.pool_hits, stats.pool_misses, stats.barriers), (0, 1, 1));
            } else {
                assert_eq!((stats.pool_hits, stats.pool_misses, stats.barriers), (1, 0, 0));
            }
            assert_eq!(stats.pool_size, 1);
        }
        assert_eq!(h.mock.live_resources(), 1);
    }

    #[test]
    fn test_passes_run_in_order_inside_events() {
        let mut h = harness();
        h.graph.begin_frame();
        let color = h.graph.create_transient(rt_desc(), "color");
        h.graph
            .add_pass("first", PassType::Graphics)
            .write(color, RgUsage::RENDER_TARGET)
            .execute(|ctx| {
                ctx.cmd.draw_instanced(3, 1, 0, 0);
                Ok(())
            });
        h.graph
            .add_pass("second", PassType::Compute)
            .read_write(color, RgUsage::UNORDERED_ACCESS)
            .execute(move |ctx| {
                assert_eq!(ctx.pass_name(), "second");
                ctx.resources.resource(color)?;
                ctx.cmd.dispatch(8, 8, 1);
                Ok(())
            });
        h.graph.compile().unwrap();
        h.run().unwrap();

        let commands: Vec<_> = h
            .mock
            .executed()
            .concat()
            .into_iter()
            .filter(|c| !matches!(c, MockCommand::Barrier(_)))
            .collect();
        assert_eq!(
            commands,
            vec![
                MockCommand::BeginEvent("first".into()),
                MockCommand::Draw,
                MockCommand::EndEvent,
                MockCommand::BeginEvent("second".into()),
                MockCommand::Dispatch([8, 8, 1]),
                MockCommand::EndEvent,
            ]
        );
    }

    #[test]
    fn test_execute_requires_compile() {
        let mut h = harness();
        h.graph.begin_frame();
        assert!(matches!(
            h.run(),
            Err(RenderError::Graph(GraphError::NotCompiled))
        ));
    }

    #[test]
    fn test_only_fatal_pass_errors_abort_execution() {
        let mut h = harness();
        h.graph.begin_frame();
        h.graph
            .add_pass("recoverable", PassType::Graphics)
            .execute(|_| Err(RenderError::InvalidScene("empty".into())));
        h.graph.add_pass("after", PassType::Graphics).execute(noop);
        h.graph.compile().unwrap();
        assert!(h.run().is_ok());

        h.graph.begin_frame();
        h.graph
            .add_pass("lost", PassType::Graphics)
            .execute(|_| {
                Err(RenderError::DeviceRemoved {
                    reason: "hung".into(),
                })
            });
        h.graph.compile().unwrap();
        assert!(matches!(h.run(), Err(RenderError::DeviceRemoved { .. })));
    }
}
