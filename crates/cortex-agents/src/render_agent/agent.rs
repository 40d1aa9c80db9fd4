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

//! Defines the RenderAgent, the frame orchestrator of the deferred pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use super::frame::{FrameOutput, FrameOutputs, FrameStats, InstancePlan};
use super::hooks::{ClearShadowMap, PostProcessContext, PostProcessHook, ShadowContext, ShadowHook};
use super::targets::{ScreenHandles, ScreenTargets, Tracked, UniformSky};
use cortex_core::config::RendererConfig;
use cortex_core::math::{Frustum, Mat4, Vec3};
use cortex_core::renderer::api::{
    QueueType, ResourceDesc, ResourceFlags, ResourceId, ResourceStates, SwapChainDesc, SwapChainId,
};
use cortex_core::renderer::bindless::INVALID_BINDLESS_INDEX;
use cortex_core::renderer::scene::{
    GpuLight, GpuMesh, InstanceId, MeshData, RenderScene, VBInstanceData, VBMaterialConstants,
    VBMeshTableEntry, VBReflectionProbe,
};
use cortex_core::renderer::{
    BindlessRegistry, DescriptorHeapManager, DeviceError, GpuDevice, MappedTable, PassType,
    PlaceholderTextures, RenderDevice, RenderError, RenderGraph, RgHandle, RgUsage, Uploader,
};
use cortex_lanes::{
    BrdfLutLane, ClusterCullLane, ClusterHandles, DeferredLightingInputs, DeferredLightingLane,
    FrameTables, FrameView, LightingEnvironment, MaterialResolveInputs, MaterialResolveLane,
    MotionVectorInputs, MotionVectorLane, RenderLane, VisibilityDraw, VisibilityInputs,
    VisibilityLane, DEPTH_FORMAT, HDR_FORMAT, MAX_SHADOW_MATRICES, VELOCITY_FORMAT,
    VISIBILITY_FORMAT,
};

/// Fence values a frame slot must reach before it is reused.
#[derive(Debug, Clone, Copy, Default)]
struct SlotFence {
    graphics: u64,
    compute: u64,
}

/// The persistent cluster buffers.
#[derive(Debug)]
struct ClusterTargets {
    ranges: Tracked,
    indices: Tracked,
}

impl ClusterTargets {
    fn create(lane: &ClusterCullLane, device: &dyn GpuDevice) -> Result<Self, RenderError> {
        let buffers = lane.create_buffers(device)?;
        Ok(Self {
            ranges: Tracked::new(
                device,
                buffers.ranges,
                ResourceStates::UNORDERED_ACCESS,
                "Cluster Ranges",
            )?,
            indices: Tracked::new(
                device,
                buffers.indices,
                ResourceStates::UNORDERED_ACCESS,
                "Cluster Light Indices",
            )?,
        })
    }

    fn import(&self, graph: &mut RenderGraph) -> Result<ClusterHandles, RenderError> {
        Ok(ClusterHandles {
            ranges: self.ranges.import(graph)?,
            indices: self.indices.import(graph)?,
        })
    }

    fn update(&mut self, graph: &RenderGraph, handles: &ClusterHandles) -> Result<(), RenderError> {
        self.ranges.update(graph, handles.ranges)?;
        self.indices.update(graph, handles.indices)
    }

    fn destroy(&self, device: &dyn GpuDevice) {
        self.ranges.destroy(device);
        self.indices.destroy(device);
    }
}

/// The upload tables, one region per frame slot.
struct SceneTables {
    instances: MappedTable<VBInstanceData>,
    materials: MappedTable<VBMaterialConstants>,
    meshes: MappedTable<VBMeshTableEntry>,
    lights: MappedTable<GpuLight>,
    probes: MappedTable<VBReflectionProbe>,
}

impl SceneTables {
    fn new(
        device: &Arc<dyn GpuDevice>,
        bindless: &Arc<BindlessRegistry>,
        config: &RendererConfig,
    ) -> Result<Self, RenderError> {
        let frames = config.frames_in_flight;
        let tables = &config.tables;
        Ok(Self {
            instances: MappedTable::new(
                device.clone(),
                bindless.clone(),
                "instance",
                tables.max_instances,
                frames,
            )?,
            materials: MappedTable::new(
                device.clone(),
                bindless.clone(),
                "material",
                tables.max_materials,
                frames,
            )?,
            meshes: MappedTable::new(
                device.clone(),
                bindless.clone(),
                "mesh",
                tables.max_meshes,
                frames,
            )?,
            lights: MappedTable::new(
                device.clone(),
                bindless.clone(),
                "light",
                tables.max_local_lights,
                frames,
            )?,
            probes: MappedTable::new(
                device.clone(),
                bindless.clone(),
                "probe",
                tables.max_probes,
                frames,
            )?,
        })
    }

    fn addresses(&self, frame_slot: u32) -> FrameTables {
        FrameTables {
            instances: self.instances.gpu_address(frame_slot),
            materials: self.materials.gpu_address(frame_slot),
            meshes: self.meshes.gpu_address(frame_slot),
            lights: self.lights.gpu_address(frame_slot),
            probes: self.probes.gpu_address(frame_slot),
        }
    }
}

/// The agent driving one frame of the visibility-buffer deferred pipeline
/// per call to [`RenderAgent::render`].
pub struct RenderAgent {
    // Device, queues and their fences.
    device: RenderDevice,
    config: RendererConfig,
    // Uploads on the copy queue.
    uploader: Uploader,
    descriptors: DescriptorHeapManager,
    bindless: Arc<BindlessRegistry>,
    // Textures behind the reserved bindless slots. Taken on drop.
    placeholders: Option<PlaceholderTextures>,
    // Graph recorded on the graphics queue.
    graph: RenderGraph,
    // Graph recorded on the compute queue when culling runs asynchronously.
    compute_graph: RenderGraph,
    brdf_lut_lane: BrdfLutLane,
    visibility_lane: VisibilityLane,
    resolve_lane: MaterialResolveLane,
    cull_lane: ClusterCullLane,
    lighting_lane: DeferredLightingLane,
    motion_lane: MotionVectorLane,
    tables: SceneTables,
    // --- Persistent targets ---
    screen: ScreenTargets,
    clusters: ClusterTargets,
    shadow_map: Tracked,
    brdf_lut: Tracked,
    brdf_lut_built: bool,
    sky: Option<UniformSky>,
    swap_chain: SwapChainId,
    back_buffers: Vec<Tracked>,
    // --- Frame pacing ---
    slot_fences: Vec<SlotFence>,
    frame_index: u64,
    prev_view_proj: Option<Mat4>,
    prev_transforms: HashMap<InstanceId, Mat4>,
    // --- Extension points ---
    shadow_hook: Box<dyn ShadowHook>,
    post_process_hook: Option<Box<dyn PostProcessHook>>,
    // --- Last frame ---
    last_stats: FrameStats,
    outputs: Option<FrameOutputs>,
}

impl RenderAgent {
    /// Creates every heap, pipeline, table and persistent target of the
    /// pipeline, sized from `config`.
    pub fn new(device: RenderDevice, config: RendererConfig) -> Result<Self, RenderError> {
        let gpu = device.device().clone();
        let uploader = Uploader::new(gpu.clone(), device.graphics_queue().clone());
        let descriptors = DescriptorHeapManager::new(&gpu, &config)?;
        let bindless = BindlessRegistry::new(gpu.clone(), descriptors.bindless_region());
        let queues = [
            device.graphics_queue().clone(),
            device.compute_queue().clone(),
            device.copy_queue().clone(),
        ];
        bindless.set_flush_callback(Arc::new(move || {
            for queue in &queues {
                queue.flush()?;
            }
            Ok(())
        }));
        let placeholders = PlaceholderTextures::create(&uploader)?;
        bindless.install_placeholders(&placeholders)?;

        let brdf_lut_lane = BrdfLutLane::new(&gpu, &config)?;
        let visibility_lane = VisibilityLane::new(&gpu, &config)?;
        let resolve_lane = MaterialResolveLane::new(&gpu, &config)?;
        let cull_lane = ClusterCullLane::new(&gpu, &config)?;
        let lighting_lane = DeferredLightingLane::new(&gpu, &config)?;
        let motion_lane = MotionVectorLane::new(&gpu, &config)?;
        log::info!(
            "RenderAgent: lanes [{}, {}, {}, {}, {}, {}]",
            brdf_lut_lane.strategy_name(),
            visibility_lane.strategy_name(),
            resolve_lane.strategy_name(),
            cull_lane.strategy_name(),
            lighting_lane.strategy_name(),
            motion_lane.strategy_name()
        );

        let tables = SceneTables::new(&gpu, &bindless, &config)?;
        let (width, height) = (config.viewport.width, config.viewport.height);
        let screen = ScreenTargets::create(gpu.as_ref(), width, height)?;
        let clusters = ClusterTargets::create(&cull_lane, gpu.as_ref())?;
        let cascades = config.shadows.cascades.clamp(1, MAX_SHADOW_MATRICES as u32);
        let map_size = config.shadows.map_size;
        let shadow_map = Tracked::create(
            gpu.as_ref(),
            &ResourceDesc::texture_2d(map_size, map_size, DEPTH_FORMAT)
                .with_array_size(cascades)
                .with_flags(ResourceFlags::ALLOW_DEPTH_STENCIL),
            ResourceStates::DEPTH_WRITE,
            "Shadow Map",
        )?;
        let brdf_lut = Tracked::new(
            gpu.as_ref(),
            brdf_lut_lane.create_target(gpu.as_ref())?,
            ResourceStates::UNORDERED_ACCESS,
            "BRDF LUT",
        )?;

        let frames = config.frames_in_flight.max(1);
        let swap_chain = gpu.create_swap_chain(
            device.graphics_queue().id(),
            &SwapChainDesc {
                width,
                height,
                buffer_count: frames.max(2),
            },
        )?;
        let back_buffers = Self::fetch_back_buffers(gpu.as_ref(), swap_chain, frames.max(2))?;

        log::info!(
            "RenderAgent: {width}x{height}, {frames} frame(s) in flight, async compute {}",
            if config.pipeline.async_compute { "on" } else { "off" }
        );
        Ok(Self {
            graph: RenderGraph::new(gpu.clone(), &config),
            compute_graph: RenderGraph::new(gpu, &config),
            device,
            uploader,
            descriptors,
            bindless,
            placeholders: Some(placeholders),
            brdf_lut_lane,
            visibility_lane,
            resolve_lane,
            cull_lane,
            lighting_lane,
            motion_lane,
            tables,
            screen,
            clusters,
            shadow_map,
            brdf_lut,
            brdf_lut_built: false,
            sky: None,
            swap_chain,
            back_buffers,
            slot_fences: vec![SlotFence::default(); frames as usize],
            frame_index: 0,
            prev_view_proj: None,
            prev_transforms: HashMap::new(),
            shadow_hook: Box::new(ClearShadowMap),
            post_process_hook: None,
            last_stats: FrameStats::default(),
            outputs: None,
            config,
        })
    }

    fn fetch_back_buffers(
        device: &dyn GpuDevice,
        swap_chain: SwapChainId,
        count: u32,
    ) -> Result<Vec<Tracked>, RenderError> {
        (0..count)
            .map(|i| {
                let buffer = device.swap_chain_buffer(swap_chain, i)?;
                Tracked::new(device, buffer, ResourceStates::PRESENT, "Back Buffer")
            })
            .collect()
    }

    /// Renders and presents one frame of `scene`.
    pub fn render(&mut self, scene: &RenderScene) -> Result<FrameStats, RenderError> {
        self.device.check_removed()?;
        let gpu = self.device.device().clone();
        let graphics = self.device.graphics_queue().clone();
        let compute = self.device.compute_queue().clone();

        // Reuse of a frame slot waits for the frame that last used it.
        let frames = self.slot_fences.len() as u64;
        let slot = (self.frame_index % frames) as u32;
        let fence = self.slot_fences[slot as usize];
        graphics.wait_cpu(fence.graphics)?;
        compute.wait_cpu(fence.compute)?;
        let retired = self.bindless.retire(graphics.completed_value()?);
        if retired > 0 {
            log::trace!("RenderAgent: retired {retired} bindless slot(s)");
        }
        self.bindless
            .set_release_fence(graphics.last_signaled_value() + 1);
        self.descriptors.begin_frame(slot);

        // --- Scene tables ---
        let (width, height) = (self.config.viewport.width, self.config.viewport.height);
        let view = FrameView::new(&scene.camera, self.prev_view_proj, width, height)?;
        let frustum = Frustum::from_view_proj(&view.view_proj);
        let plan = InstancePlan::build(scene, &frustum, &self.prev_transforms)?;
        if plan.blended > 0 {
            log::trace!("RenderAgent: {} blended instance(s) not drawn", plan.blended);
        }
        if !plan.culled.is_empty() {
            log::trace!("RenderAgent: {} instance(s) outside the frustum", plan.culled.len());
        }
        let table_growths = self.write_tables(scene, &plan, slot)?;
        let tables = self.tables.addresses(slot);
        let local_light_count = self.tables.lights.len();

        // --- Environment ---
        let env = &scene.environment;
        let (diffuse, specular) = match (env.diffuse, env.specular) {
            (Some(diffuse), Some(specular)) => (diffuse, specular),
            (diffuse, specular) => {
                let (sky_diffuse, sky_specular) = self.uniform_sky(env.sky_color)?;
                (diffuse.unwrap_or(sky_diffuse), specular.unwrap_or(sky_specular))
            }
        };
        let scale = env.intensity * self.config.pipeline.ibl_intensity;
        let environment = LightingEnvironment {
            diffuse_scale: scale,
            specular_scale: scale,
            specular_max_mip: gpu.resource_desc(specular)?.mip_levels.saturating_sub(1) as f32,
            enabled: true,
        };

        // --- Async culling ---
        let mut dispatches = 0;
        let mut compute_fence = None;
        let async_cull = self.config.pipeline.async_compute && local_light_count > 0;
        if async_cull {
            self.compute_graph.begin_frame();
            let clusters = self.clusters.import(&mut self.compute_graph)?;
            self.cull_lane.declare(
                &mut self.compute_graph,
                slot,
                &view,
                tables.lights,
                local_light_count,
                clusters,
            )?;
            self.compute_graph.compile()?;
            let mut cmd = gpu.create_command_list(QueueType::Compute)?;
            self.compute_graph
                .execute(cmd.as_mut(), &mut self.descriptors)?;
            let list = cmd.close()?;
            // Last frame's lighting still reads the cluster buffers.
            compute.wait_gpu(&graphics, graphics.last_signaled_value())?;
            compute.execute_command_lists(&[list])?;
            compute_fence = Some(compute.signal()?);
            self.clusters.update(&self.compute_graph, &clusters)?;
            self.compute_graph.end_frame();
            dispatches += 1;
        }

        // --- Main graph ---
        self.graph.begin_frame();
        let graph = &mut self.graph;
        let back_buffer_index = gpu.current_back_buffer_index(self.swap_chain)? as usize;
        let back_buffer_target = self
            .back_buffers
            .get(back_buffer_index)
            .ok_or(DeviceError::InvalidHandle("back buffer"))?;
        let back_buffer = back_buffer_target.import(graph)?;
        let screen = self.screen.import(graph)?;
        let clusters = self.clusters.import(graph)?;
        let shadow_map = self.shadow_map.import(graph)?;
        let brdf_lut = self.brdf_lut.import(graph)?;
        let env_diffuse =
            graph.import(diffuse, ResourceStates::ALL_SHADER_RESOURCE, "Env Diffuse")?;
        let env_specular =
            graph.import(specular, ResourceStates::ALL_SHADER_RESOURCE, "Env Specular")?;
        let visibility = graph.create_transient(
            ResourceDesc::texture_2d(width, height, VISIBILITY_FORMAT).with_flags(
                ResourceFlags::ALLOW_RENDER_TARGET | ResourceFlags::ALLOW_UNORDERED_ACCESS,
            ),
            "Visibility",
        );
        let hdr = graph.create_transient(
            ResourceDesc::texture_2d(width, height, HDR_FORMAT)
                .with_flags(ResourceFlags::ALLOW_RENDER_TARGET),
            "HDR",
        );
        let velocity = graph.create_transient(
            ResourceDesc::texture_2d(width, height, VELOCITY_FORMAT)
                .with_flags(ResourceFlags::ALLOW_UNORDERED_ACCESS),
            "Velocity",
        );

        let building_lut = !self.brdf_lut_built;
        if building_lut {
            self.brdf_lut_lane.declare(graph, brdf_lut);
            dispatches += 1;
        }

        let shadow_cascades = self.config.shadows.cascades.clamp(1, MAX_SHADOW_MATRICES as u32);
        let shadow = self.shadow_hook.declare(
            graph,
            &ShadowContext {
                scene,
                view: &view,
                shadow_map,
                map_size: self.config.shadows.map_size,
                cascades: shadow_cascades,
            },
        )?;

        let mut draws = Vec::with_capacity(plan.ranges.len());
        for range in &plan.ranges {
            let mesh = &scene.meshes[range.mesh as usize];
            draws.push(VisibilityDraw {
                mesh: range.mesh,
                variant: range.variant,
                first_instance: range.first,
                instance_count: range.count,
                index_count: mesh.index_count(),
                vertex_buffer: mesh.vertex_buffer_view(gpu.as_ref())?,
                index_buffer: mesh.index_buffer_view(gpu.as_ref())?,
            });
        }
        let draw_calls = draws.len() as u32 + 1;
        self.visibility_lane.declare(
            graph,
            VisibilityInputs {
                visibility,
                depth: screen.depth,
                view_proj: view.view_proj,
                instances: tables.instances,
                materials: tables.materials,
                draws,
                width,
                height,
            },
        );

        self.resolve_lane.declare(
            graph,
            slot,
            &view,
            &tables,
            MaterialResolveInputs {
                visibility,
                depth: screen.depth,
                gbuffer: screen.gbuffer,
            },
        )?;
        dispatches += 1;

        if !async_cull
            && self.cull_lane.declare(
                graph,
                slot,
                &view,
                tables.lights,
                local_light_count,
                clusters,
            )?
        {
            dispatches += 1;
        }

        self.lighting_lane.declare(
            graph,
            slot,
            &view,
            &tables,
            DeferredLightingInputs {
                gbuffer: screen.gbuffer,
                depth: screen.depth,
                hdr,
                env_diffuse,
                env_specular,
                brdf_lut,
                shadow_map,
                clusters,
                sun: scene.sun().copied(),
                shadow,
                shadow_map_size: self.config.shadows.map_size,
                shadow_cascades,
                environment,
                local_light_count,
                probe_count: self.tables.probes.len(),
            },
        )?;

        self.motion_lane.declare(
            graph,
            slot,
            &view,
            &tables,
            MotionVectorInputs {
                visibility,
                depth: screen.depth,
                velocity,
            },
        )?;
        dispatches += 1;

        if let Some(hook) = self.post_process_hook.as_mut() {
            hook.declare(
                graph,
                &PostProcessContext {
                    hdr,
                    velocity,
                    depth: screen.depth,
                    back_buffer,
                    width,
                    height,
                },
            )?;
        }

        graph
            .add_pass("Present", PassType::Graphics)
            .write(back_buffer, RgUsage::PRESENT)
            .execute(|_| Ok(()));

        // --- Submit ---
        graph.compile()?;
        let mut cmd = gpu.create_command_list(QueueType::Graphics)?;
        graph.execute(cmd.as_mut(), &mut self.descriptors)?;
        let list = cmd.close()?;
        if let Some(value) = compute_fence {
            graphics.wait_gpu(&compute, value)?;
        }
        graphics.execute_command_lists(&[list])?;
        gpu.present(self.swap_chain)?;
        let graphics_fence = graphics.signal()?;
        self.slot_fences[slot as usize] = SlotFence {
            graphics: graphics_fence,
            compute: compute_fence.unwrap_or(fence.compute),
        };

        // --- Bookkeeping ---
        self.record_states(
            &screen,
            &clusters,
            shadow_map,
            brdf_lut,
            (back_buffer, back_buffer_index),
        )?;
        let graph = &self.graph;
        let output = |handle: RgHandle| -> Result<FrameOutput, RenderError> {
            Ok(FrameOutput {
                resource: graph.resource(handle)?,
                state: graph
                    .final_state(handle)?
                    .first()
                    .copied()
                    .unwrap_or(ResourceStates::COMMON),
            })
        };
        let planes = screen.gbuffer.planes();
        self.outputs = Some(FrameOutputs {
            visibility: output(visibility)?,
            hdr: output(hdr)?,
            velocity: output(velocity)?,
            depth: output(screen.depth)?,
            gbuffer: [
                output(planes[0])?,
                output(planes[1])?,
                output(planes[2])?,
                output(planes[3])?,
                output(planes[4])?,
            ],
        });
        if building_lut {
            self.brdf_lut_built = true;
            log::info!(
                "RenderAgent: built {0}x{0} BRDF LUT",
                self.brdf_lut_lane.size()
            );
        }

        let stats = FrameStats {
            frame_index: self.frame_index,
            draw_calls,
            dispatches,
            instances: plan.records.len() as u32,
            visible_meshes: plan.visible_meshes,
            culled: plan.culled.len() as u32,
            local_lights: local_light_count,
            table_growths,
            async_compute: async_cull,
            graph: self.graph.stats(),
        };
        log::debug!(
            "RenderAgent: frame {}: {} draws, {} dispatches, {} instances, {} meshes, \
             {} lights, {} barriers",
            stats.frame_index,
            stats.draw_calls,
            stats.dispatches,
            stats.instances,
            stats.visible_meshes,
            stats.local_lights,
            stats.graph.barriers
        );
        self.graph.end_frame();

        self.prev_view_proj = Some(view.view_proj);
        self.prev_transforms = plan.transforms();
        self.last_stats = stats;
        self.frame_index += 1;
        Ok(stats)
    }

    /// Fills this frame slot of every table, returning how many grew.
    fn write_tables(
        &mut self,
        scene: &RenderScene,
        plan: &InstancePlan,
        slot: u32,
    ) -> Result<u32, RenderError> {
        let meshes: Vec<VBMeshTableEntry> = scene.meshes.iter().map(GpuMesh::table_entry).collect();
        for (i, entry) in meshes.iter().enumerate() {
            if entry.vertex_buffer_index == INVALID_BINDLESS_INDEX
                || entry.index_buffer_index == INVALID_BINDLESS_INDEX
            {
                return Err(RenderError::InvalidMeshTable {
                    mesh: i as u32,
                    detail: "buffer SRV is not registered".into(),
                });
            }
        }
        let materials: Vec<_> = scene.materials.iter().map(|m| m.to_gpu()).collect();
        let lights: Vec<_> = scene.local_lights().map(|l| l.to_gpu()).collect();
        let probes: Vec<_> = scene.probes.iter().map(|p| p.to_gpu()).collect();

        let device = &self.device;
        let flush = || device.wait_idle();
        let tables = &mut self.tables;
        let grew = [
            tables.instances.write(slot, &plan.records, &flush)?,
            tables.materials.write(slot, &materials, &flush)?,
            tables.meshes.write(slot, &meshes, &flush)?,
            tables.lights.write(slot, &lights, &flush)?,
            tables.probes.write(slot, &probes, &flush)?,
        ];
        Ok(grew.into_iter().filter(|&g| g).count() as u32)
    }

    /// The uniform sky maps for `color`, re-uploaded when it changes.
    fn uniform_sky(&mut self, color: Vec3) -> Result<(ResourceId, ResourceId), RenderError> {
        if let Some(sky) = &self.sky {
            if sky.color == color {
                return Ok((sky.diffuse, sky.specular));
            }
        }
        if let Some(old) = self.sky.take() {
            self.device.wait_idle()?;
            old.destroy(self.device.device().as_ref());
        }
        let sky = UniformSky::upload(&self.uploader, color)?;
        let maps = (sky.diffuse, sky.specular);
        self.sky = Some(sky);
        Ok(maps)
    }

    fn record_states(
        &mut self,
        screen: &ScreenHandles,
        clusters: &ClusterHandles,
        shadow_map: RgHandle,
        brdf_lut: RgHandle,
        (back_buffer, back_buffer_index): (RgHandle, usize),
    ) -> Result<(), RenderError> {
        let graph = &self.graph;
        self.screen.update(graph, screen)?;
        self.clusters.update(graph, clusters)?;
        self.shadow_map.update(graph, shadow_map)?;
        self.brdf_lut.update(graph, brdf_lut)?;
        if let Some(target) = self.back_buffers.get_mut(back_buffer_index) {
            target.update(graph, back_buffer)?;
        }
        Ok(())
    }

    /// Resizes the swap chain and every screen-sized target. Zero sizes are
    /// ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            log::warn!("RenderAgent: ignoring resize to {width}x{height}");
            return Ok(());
        }
        if (width, height) == (self.config.viewport.width, self.config.viewport.height) {
            return Ok(());
        }
        self.device.wait_idle()?;
        let gpu = self.device.device().clone();
        gpu.resize_swap_chain(self.swap_chain, width, height)?;
        let count = self.back_buffers.len() as u32;
        self.back_buffers = Self::fetch_back_buffers(gpu.as_ref(), self.swap_chain, count)?;

        let screen = ScreenTargets::create(gpu.as_ref(), width, height)?;
        std::mem::replace(&mut self.screen, screen).destroy(gpu.as_ref());
        let clusters = ClusterTargets::create(&self.cull_lane, gpu.as_ref())?;
        std::mem::replace(&mut self.clusters, clusters).destroy(gpu.as_ref());
        self.graph.clear_pool();
        self.compute_graph.clear_pool();

        self.config.viewport.width = width;
        self.config.viewport.height = height;
        self.outputs = None;
        log::info!("RenderAgent: resized to {width}x{height}");
        Ok(())
    }

    /// Uploads a mesh and registers its buffers for the resolve passes.
    pub fn upload_mesh(&self, data: &MeshData, label: &str) -> Result<GpuMesh, RenderError> {
        GpuMesh::upload(&self.uploader, &self.bindless, data, label)
    }

    /// Replaces the pass that fills the shadow map.
    pub fn set_shadow_hook(&mut self, hook: Box<dyn ShadowHook>) {
        self.shadow_hook = hook;
    }

    /// Installs a pass group between motion vectors and presentation.
    pub fn set_post_process_hook(&mut self, hook: Option<Box<dyn PostProcessHook>>) {
        self.post_process_hook = hook;
    }

    /// Blocks until every queue is idle.
    pub fn wait_idle(&self) -> Result<(), RenderError> {
        Ok(self.device.wait_idle()?)
    }

    /// The device and its queues.
    pub fn render_device(&self) -> &RenderDevice {
        &self.device
    }

    /// The GPU device.
    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        self.device.device()
    }

    /// The copy-queue uploader.
    pub fn uploader(&self) -> &Uploader {
        &self.uploader
    }

    /// The bindless registry scene textures register into.
    pub fn bindless(&self) -> &Arc<BindlessRegistry> {
        &self.bindless
    }

    /// The configuration, with the viewport of the last resize.
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Frames rendered so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Stats of the last rendered frame.
    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// Resources of the last rendered frame, valid until the next
    /// [`RenderAgent::render`] or [`RenderAgent::resize`].
    pub fn outputs(&self) -> Option<&FrameOutputs> {
        self.outputs.as_ref()
    }

    /// Table capacities, in records: instances, materials, meshes, lights
    /// and probes.
    pub fn table_capacities(&self) -> [u32; 5] {
        [
            self.tables.instances.capacity(),
            self.tables.materials.capacity(),
            self.tables.meshes.capacity(),
            self.tables.lights.capacity(),
            self.tables.probes.capacity(),
        ]
    }
}

impl Drop for RenderAgent {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::warn!("RenderAgent: failed to drain the GPU on shutdown: {err}");
        }
        let gpu = self.device.device().clone();
        self.screen.destroy(gpu.as_ref());
        self.clusters.destroy(gpu.as_ref());
        self.shadow_map.destroy(gpu.as_ref());
        self.brdf_lut.destroy(gpu.as_ref());
        if let Some(sky) = self.sky.take() {
            sky.destroy(gpu.as_ref());
        }
        if let Some(placeholders) = self.placeholders.take() {
            placeholders.destroy(gpu.as_ref());
        }
        log::info!("RenderAgent: shut down after {} frame(s)", self.frame_index);
    }
}
