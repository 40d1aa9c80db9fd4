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

//! Lanes driven through a render graph on the software device.

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use cortex_core::config::RendererConfig;
use cortex_core::math::Vec3;
use cortex_core::renderer::api::*;
use cortex_core::renderer::scene::bindings::brdf_lut;
use cortex_core::renderer::scene::payload::BACKGROUND;
use cortex_core::renderer::scene::{Camera, Light};
use cortex_core::renderer::shading::brdf_lut::generate;
use cortex_core::renderer::{
    DescriptorHeapManager, GpuDevice, MappedBuffer, RenderDevice, RenderGraph, RgHandle, Uploader,
};
use cortex_infra::{logging, SoftwareBackend};
use cortex_lanes::*;

const WIDTH: u32 = 32;
const HEIGHT: u32 = 24;

struct Harness {
    rd: RenderDevice,
    config: RendererConfig,
    descriptors: DescriptorHeapManager,
    graph: RenderGraph,
}

impl Harness {
    fn new() -> Self {
        logging::init();
        let mut config = RendererConfig::default();
        config.viewport.width = WIDTH;
        config.viewport.height = HEIGHT;
        let rd = RenderDevice::create(&SoftwareBackend::new(), &config).expect("software device");
        let descriptors = DescriptorHeapManager::new(rd.device(), &config).unwrap();
        let graph = RenderGraph::new(rd.device().clone(), &config);
        Self {
            rd,
            config,
            descriptors,
            graph,
        }
    }

    fn device(&self) -> &Arc<dyn GpuDevice> {
        self.rd.device()
    }

    /// Compiles, records and waits for the declared frame.
    fn submit(&mut self) {
        self.graph.compile().unwrap();
        let mut cmd = self.device().create_command_list(QueueType::Graphics).unwrap();
        self.graph.execute(cmd.as_mut(), &mut self.descriptors).unwrap();
        let list = cmd.close().unwrap();
        let queue = self.rd.graphics_queue();
        queue.execute_command_lists(&[list]).unwrap();
        queue.flush().unwrap();
    }

    fn state(&self, handle: RgHandle) -> ResourceStates {
        self.graph.final_state(handle).unwrap()[0]
    }

    fn readback(&self, handle: RgHandle) -> Vec<u8> {
        let uploader = Uploader::new(self.device().clone(), self.rd.graphics_queue().clone());
        let resource = self.graph.resource(handle).unwrap();
        let desc = self.device().resource_desc(resource).unwrap();
        if desc.is_buffer() {
            uploader.readback_buffer(resource, self.state(handle)).unwrap()
        } else {
            uploader
                .readback_texture(resource, 0, self.state(handle))
                .unwrap()
        }
    }

    fn assert_no_validation_errors(&self) {
        let errors: Vec<_> = self
            .device()
            .take_debug_messages()
            .into_iter()
            .filter(|m| m.is_error())
            .collect();
        assert!(errors.is_empty(), "validation errors: {errors:#?}");
    }

    fn depth(&mut self) -> RgHandle {
        let depth = self
            .device()
            .create_committed_resource(
                HeapType::Default,
                &ResourceDesc::texture_2d(WIDTH, HEIGHT, DEPTH_FORMAT)
                    .with_flags(ResourceFlags::ALLOW_DEPTH_STENCIL),
                ResourceStates::DEPTH_WRITE,
                None,
                "Depth",
            )
            .unwrap();
        self.graph
            .import(depth, ResourceStates::DEPTH_WRITE, "Depth")
            .unwrap()
    }

    fn table(&self, bytes: u64, label: &str) -> MappedBuffer {
        MappedBuffer::new(self.device().clone(), bytes, label).unwrap()
    }
}

fn camera() -> Camera {
    Camera::look_at(
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(0.0, 0.0, -1.0),
        60f32.to_radians(),
        WIDTH as f32 / HEIGHT as f32,
        0.1,
        100.0,
    )
    .unwrap()
}

fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn texture_desc(format: Format, flags: ResourceFlags) -> ResourceDesc {
    ResourceDesc::texture_2d(WIDTH, HEIGHT, format).with_flags(flags)
}

#[test]
fn test_brdf_lut_matches_cpu_integration() {
    let mut h = Harness::new();
    let lane = BrdfLutLane::new(h.device(), &h.config).unwrap();
    let target = lane.create_target(h.device().as_ref()).unwrap();
    h.graph.begin_frame();
    let lut = h
        .graph
        .import(target, ResourceStates::UNORDERED_ACCESS, "BRDF LUT")
        .unwrap();
    lane.declare(&mut h.graph, lut);
    h.submit();

    let texels: Vec<half::f16> = h
        .readback(lut)
        .chunks_exact(2)
        .map(|b| half::f16::from_le_bytes([b[0], b[1]]))
        .collect();
    let expected = generate(brdf_lut::SIZE, brdf_lut::SAMPLE_COUNT);
    assert_eq!(texels.len(), expected.len() * 2);
    for (texel, reference) in texels.chunks_exact(2).zip(&expected) {
        assert_abs_diff_eq!(texel[0].to_f32(), reference[0], epsilon = 2e-3);
        assert_abs_diff_eq!(texel[1].to_f32(), reference[1], epsilon = 2e-3);
    }
    h.graph.end_frame();
    h.assert_no_validation_errors();
}

#[test]
fn test_empty_visibility_frame_resolves_to_background() {
    let mut h = Harness::new();
    let visibility_lane = VisibilityLane::new(h.device(), &h.config).unwrap();
    let resolve_lane = MaterialResolveLane::new(h.device(), &h.config).unwrap();
    let motion_lane = MotionVectorLane::new(h.device(), &h.config).unwrap();

    let tables_buffer = h.table(64 * 1024, "Tables");
    let address = tables_buffer.gpu_address();
    let tables = FrameTables {
        instances: address,
        materials: address,
        meshes: address,
        lights: address,
        probes: address,
    };
    let view = FrameView::new(&camera(), None, WIDTH, HEIGHT).unwrap();

    h.graph.begin_frame();
    let depth = h.depth();
    let visibility = h.graph.create_transient(
        texture_desc(
            VISIBILITY_FORMAT,
            ResourceFlags::ALLOW_RENDER_TARGET | ResourceFlags::ALLOW_UNORDERED_ACCESS,
        ),
        "Visibility",
    );
    let mut planes = Vec::new();
    for (format, name) in GBUFFER_FORMATS.into_iter().zip(GBUFFER_NAMES) {
        planes.push(h.graph.create_transient(
            texture_desc(format, ResourceFlags::ALLOW_UNORDERED_ACCESS),
            name,
        ));
    }
    let gbuffer = GBuffer::from_planes([planes[0], planes[1], planes[2], planes[3], planes[4]]);
    let velocity = h.graph.create_transient(
        texture_desc(VELOCITY_FORMAT, ResourceFlags::ALLOW_UNORDERED_ACCESS),
        "Velocity",
    );

    visibility_lane.declare(
        &mut h.graph,
        VisibilityInputs {
            visibility,
            depth,
            view_proj: view.view_proj,
            instances: tables.instances,
            materials: tables.materials,
            draws: Vec::new(),
            width: WIDTH,
            height: HEIGHT,
        },
    );
    resolve_lane
        .declare(
            &mut h.graph,
            0,
            &view,
            &tables,
            MaterialResolveInputs {
                visibility,
                depth,
                gbuffer,
            },
        )
        .unwrap();
    motion_lane
        .declare(
            &mut h.graph,
            0,
            &view,
            &tables,
            MotionVectorInputs {
                visibility,
                depth,
                velocity,
            },
        )
        .unwrap();
    h.submit();

    let payloads = words(&h.readback(visibility));
    assert_eq!(payloads.len() as u32, WIDTH * HEIGHT * 2);
    assert!(payloads.iter().all(|&p| p == BACKGROUND));
    let depths = words(&h.readback(depth));
    assert!(depths.iter().all(|&d| f32::from_bits(d) == 1.0));
    assert!(h.readback(gbuffer.normal_roughness).iter().all(|&b| b == 0));
    assert!(h.readback(velocity).iter().all(|&b| b == 0));
    h.graph.end_frame();
    h.assert_no_validation_errors();
}

#[test]
fn test_cluster_cull_skipped_without_local_lights() {
    let mut h = Harness::new();
    let lane = ClusterCullLane::new(h.device(), &h.config).unwrap();
    let buffers = lane.create_buffers(h.device().as_ref()).unwrap();
    let view = FrameView::new(&camera(), None, WIDTH, HEIGHT).unwrap();
    let lights = h.table(1024, "Lights");

    h.graph.begin_frame();
    let clusters = ClusterHandles {
        ranges: h
            .graph
            .import(buffers.ranges, ResourceStates::UNORDERED_ACCESS, "Ranges")
            .unwrap(),
        indices: h
            .graph
            .import(buffers.indices, ResourceStates::UNORDERED_ACCESS, "Indices")
            .unwrap(),
    };
    let declared = lane
        .declare(&mut h.graph, 0, &view, lights.gpu_address(), 0, clusters)
        .unwrap();
    assert!(!declared);
    h.submit();
    assert_eq!(h.graph.stats().passes, 0);
    h.graph.end_frame();
}

#[test]
fn test_cluster_cull_assigns_light_in_front_of_camera() {
    let mut h = Harness::new();
    let lane = ClusterCullLane::new(h.device(), &h.config).unwrap();
    let buffers = lane.create_buffers(h.device().as_ref()).unwrap();
    let view = FrameView::new(&camera(), None, WIDTH, HEIGHT).unwrap();
    let lights = h.table(1024, "Lights");
    let light = Light::point(Vec3::new(0.0, 0.0, -5.0), Vec3::ONE, 10.0, 2.0);
    lights.write_pod(0, &[light.to_gpu()]).unwrap();

    h.graph.begin_frame();
    let clusters = ClusterHandles {
        ranges: h
            .graph
            .import(buffers.ranges, ResourceStates::UNORDERED_ACCESS, "Ranges")
            .unwrap(),
        indices: h
            .graph
            .import(buffers.indices, ResourceStates::UNORDERED_ACCESS, "Indices")
            .unwrap(),
    };
    let declared = lane
        .declare(&mut h.graph, 0, &view, lights.gpu_address(), 1, clusters)
        .unwrap();
    assert!(declared);
    h.submit();

    let ranges: Vec<[u32; 2]> = words(&h.readback(clusters.ranges))
        .chunks_exact(2)
        .map(|r| [r[0], r[1]])
        .collect();
    let indices = words(&h.readback(clusters.indices));
    assert_eq!(ranges.len() as u32, lane.grid().cluster_count());
    let lit: Vec<_> = ranges.iter().filter(|r| r[1] > 0).collect();
    assert!(!lit.is_empty());
    assert!(lit.len() < ranges.len());
    for range in lit {
        assert_eq!(range[1], 1);
        assert_eq!(indices[range[0] as usize], 0);
    }
    h.graph.end_frame();
    h.assert_no_validation_errors();
}

#[test]
fn test_lanes_report_strategy_names() {
    let h = Harness::new();
    let lanes: Vec<Box<dyn RenderLane>> = vec![
        Box::new(VisibilityLane::new(h.device(), &h.config).unwrap()),
        Box::new(MaterialResolveLane::new(h.device(), &h.config).unwrap()),
        Box::new(ClusterCullLane::new(h.device(), &h.config).unwrap()),
        Box::new(DeferredLightingLane::new(h.device(), &h.config).unwrap()),
        Box::new(MotionVectorLane::new(h.device(), &h.config).unwrap()),
        Box::new(BrdfLutLane::new(h.device(), &h.config).unwrap()),
    ];
    let mut names: Vec<_> = lanes.iter().map(|l| l.strategy_name()).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), 6);
}
