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

//! Whole frames rendered by the agent on the software device, and on a
//! `wgpu` adapter when the machine has one.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use cortex_agents::*;
use cortex_core::config::RendererConfig;
use cortex_core::math::{Mat4, Vec3};
use cortex_core::renderer::api::{Format, ResourceDesc, ResourceStates, ShaderResourceViewDesc};
use cortex_core::renderer::scene::{
    AlphaMode, Camera, Light, Material, MeshData, RenderScene, VisibilityPayload,
};
use cortex_core::renderer::{PassType, RenderDevice, RenderError, RenderGraph, RgUsage, Uploader};
use cortex_infra::{logging, SoftwareBackend, WgpuBackend};
use cortex_lanes::SunShadow;

const WIDTH: u32 = 32;
const HEIGHT: u32 = 24;

fn config() -> RendererConfig {
    logging::init();
    let mut config = RendererConfig::default();
    config.viewport.width = WIDTH;
    config.viewport.height = HEIGHT;
    config.cluster.x = 8;
    config.cluster.y = 6;
    config.cluster.z = 16;
    config.cluster.max_lights_per_cluster = 16;
    config.tables.max_instances = 4;
    config.tables.max_materials = 8;
    config.tables.max_meshes = 8;
    config.tables.max_probes = 4;
    config.tables.max_local_lights = 8;
    config.shadows.map_size = 16;
    config
}

fn agent(config: RendererConfig) -> RenderAgent {
    let rd = RenderDevice::create(&SoftwareBackend::new(), &config).expect("software device");
    RenderAgent::new(rd, config).expect("render agent")
}

fn camera() -> Camera {
    Camera::look_at(
        Vec3::new(0.0, 0.0, 3.0),
        Vec3::ZERO,
        60f32.to_radians(),
        WIDTH as f32 / HEIGHT as f32,
        0.1,
        100.0,
    )
    .unwrap()
}

fn sun() -> Light {
    Light::directional(Vec3::new(0.0, -0.7071, -0.7071), Vec3::ONE, 3.0)
}

/// A scene with one instance of `mesh` per transform, all sharing `material`.
fn scene(
    agent: &RenderAgent,
    mesh: &MeshData,
    material: Material,
    transforms: &[Mat4],
) -> RenderScene {
    let mut scene = RenderScene::new();
    scene.camera = camera();
    scene.lights.push(sun());
    if !transforms.is_empty() {
        let mesh = scene.add_mesh(agent.upload_mesh(mesh, "Test Mesh").unwrap());
        let material = scene.add_material(material);
        for transform in transforms {
            scene.add_instance(mesh, material, *transform);
        }
    }
    scene
}

fn release(agent: &RenderAgent, mut scene: RenderScene) {
    agent.wait_idle().unwrap();
    scene.destroy_meshes(agent.device().as_ref());
}

fn readback(agent: &RenderAgent, output: FrameOutput) -> Vec<u8> {
    let uploader = Uploader::new(
        agent.device().clone(),
        agent.render_device().graphics_queue().clone(),
    );
    uploader
        .readback_texture(output.resource, 0, output.state)
        .unwrap()
}

fn visibility(agent: &RenderAgent) -> Vec<Option<VisibilityPayload>> {
    let outputs = *agent.outputs().expect("a rendered frame");
    readback(agent, outputs.visibility)
        .chunks_exact(8)
        .map(|p| {
            let word = |i: usize| u32::from_le_bytes([p[i], p[i + 1], p[i + 2], p[i + 3]]);
            VisibilityPayload::unpack([word(0), word(4)])
        })
        .collect()
}

fn half_pairs(bytes: &[u8], components: usize) -> Vec<Vec<f32>> {
    bytes
        .chunks_exact(2 * components)
        .map(|texel| {
            texel
                .chunks_exact(2)
                .map(|h| half::f16::from_le_bytes([h[0], h[1]]).to_f32())
                .collect()
        })
        .collect()
}

fn assert_no_validation_errors(agent: &RenderAgent) {
    let errors: Vec<_> = agent
        .device()
        .take_debug_messages()
        .into_iter()
        .filter(|m| m.is_error())
        .collect();
    assert!(errors.is_empty(), "validation errors: {errors:#?}");
}

fn covered(pixels: &[Option<VisibilityPayload>]) -> usize {
    pixels.iter().filter(|p| p.is_some()).count()
}

#[test]
fn test_empty_scene_renders_sky() {
    let mut agent = agent(config());
    let mut scene = RenderScene::new();
    scene.camera = camera();

    let stats = agent.render(&scene).unwrap();
    assert_eq!(stats.frame_index, 0);
    assert_eq!(stats.instances, 0);
    assert_eq!(stats.visible_meshes, 0);
    assert_eq!(stats.draw_calls, 1, "only the lighting triangle");
    assert!(!stats.async_compute);
    assert_no_validation_errors(&agent);

    let pixels = visibility(&agent);
    assert_eq!(pixels.len(), (WIDTH * HEIGHT) as usize);
    assert_eq!(covered(&pixels), 0);

    let outputs = *agent.outputs().unwrap();
    let depth = readback(&agent, outputs.depth);
    for texel in depth.chunks_exact(4) {
        assert_eq!(f32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]), 1.0);
    }
    let sky = scene.environment.sky_color;
    for texel in half_pairs(&readback(&agent, outputs.hdr), 4) {
        assert_abs_diff_eq!(texel[0], sky.x, epsilon = 2e-3);
        assert_abs_diff_eq!(texel[1], sky.y, epsilon = 2e-3);
        assert_abs_diff_eq!(texel[2], sky.z, epsilon = 2e-3);
    }
}

#[test]
fn test_opaque_cube_is_visible_and_lit() {
    let mut agent = agent(config());
    let scene = scene(&agent, &MeshData::cube(), Material::default(), &[Mat4::IDENTITY]);

    let stats = agent.render(&scene).unwrap();
    assert_eq!(stats.instances, 1);
    assert_eq!(stats.visible_meshes, 1);
    assert_eq!(stats.draw_calls, 2);
    assert_no_validation_errors(&agent);

    let pixels = visibility(&agent);
    let center = pixels[(HEIGHT / 2 * WIDTH + WIDTH / 2) as usize].expect("cube at the center");
    assert_eq!(center.instance, 0);
    assert_eq!(center.draw, 0);
    assert!(covered(&pixels) > 0);
    assert!(pixels[0].is_none(), "corner shows the sky");

    let outputs = *agent.outputs().unwrap();
    let hdr = half_pairs(&readback(&agent, outputs.hdr), 4);
    let lit = &hdr[(HEIGHT / 2 * WIDTH + WIDTH / 2) as usize];
    assert!(lit.iter().take(3).all(|c| c.is_finite()));
    assert!(lit[0] > scene.environment.sky_color.x, "front face faces the sun");

    let normals = half_pairs(&readback(&agent, outputs.gbuffer[1]), 4);
    let n = &normals[(HEIGHT / 2 * WIDTH + WIDTH / 2) as usize];
    assert_abs_diff_eq!(n[2], 1.0, epsilon = 1e-2);

    release(&agent, scene);
}

#[test]
fn test_alpha_cutout_discards_transparent_texels() {
    let mut agent = agent(config());
    // Left texel opaque, right texel fully transparent.
    let leaf = agent
        .uploader()
        .upload_texture_2d(
            &ResourceDesc::texture_2d(2, 1, Format::Rgba8Unorm),
            &[&[255, 255, 255, 255, 255, 255, 255, 0]],
            ResourceStates::ALL_SHADER_RESOURCE,
            "Leaf",
        )
        .unwrap();
    let slot = agent
        .bindless()
        .register_texture(leaf, &ShaderResourceViewDesc::texture_2d(Format::Rgba8Unorm))
        .unwrap();

    let solid = Material {
        double_sided: true,
        ..Material::default()
    };
    let mut foliage = Material {
        alpha_mode: AlphaMode::Mask,
        alpha_cutoff: 0.5,
        ..solid
    };
    foliage.textures.base_color = Some(slot.index());

    let quad = MeshData::quad(2.0);
    let opaque_scene = scene(&agent, &quad, solid, &[Mat4::IDENTITY]);
    agent.render(&opaque_scene).unwrap();
    let full = covered(&visibility(&agent));
    release(&agent, opaque_scene);

    let foliage_scene = scene(&agent, &quad, foliage, &[Mat4::IDENTITY]);
    agent.render(&foliage_scene).unwrap();
    let pixels = visibility(&agent);
    let kept = covered(&pixels);
    assert_no_validation_errors(&agent);

    assert!(full > 0);
    assert!(kept > full * 3 / 10 && kept < full * 7 / 10, "{kept} of {full} kept");
    for (i, pixel) in pixels.iter().enumerate() {
        if pixel.is_some() {
            assert!((i as u32 % WIDTH) <= WIDTH / 2, "pixel {i} right of the cut");
        }
    }

    release(&agent, foliage_scene);
    drop(slot);
    agent.wait_idle().unwrap();
    agent.device().destroy_resource(leaf).unwrap();
}

#[test]
fn test_instance_table_grows_then_stays() {
    let mut agent = agent(config());
    let transforms: Vec<_> = (0..10)
        .map(|i| Mat4::from_translation(Vec3::new(i as f32 * 0.3 - 1.5, 0.0, -2.0)))
        .collect();
    let scene = scene(&agent, &MeshData::cube(), Material::default(), &transforms);

    let first = agent.render(&scene).unwrap();
    assert_eq!(first.instances, 10);
    assert!(first.table_growths >= 1);
    assert!(agent.table_capacities()[0] >= 10);
    assert_eq!(agent.table_capacities()[0], 16);

    let second = agent.render(&scene).unwrap();
    assert_eq!(second.table_growths, 0);
    assert_eq!(second.instances, 10);
    assert_eq!(second.draw_calls, 2, "one mesh, one variant, one draw");
    assert_no_validation_errors(&agent);

    release(&agent, scene);
}

#[test]
fn test_empty_frames_are_idempotent() {
    let mut agent = agent(config());
    let mut scene = RenderScene::new();
    scene.camera = camera();

    agent.render(&scene).unwrap();
    let warm = agent.render(&scene).unwrap();
    let bindless = agent.bindless().stats();

    let again = agent.render(&scene).unwrap();
    assert_eq!(agent.bindless().stats(), bindless);
    assert_eq!(again.graph.pool_size, warm.graph.pool_size);
    assert_eq!(again.graph.pool_misses, 0);
    assert_eq!(again.graph.passes, warm.graph.passes);
    assert_eq!(again.graph.barriers, warm.graph.barriers);
    assert_eq!(again.dispatches, warm.dispatches);
    assert_eq!(again.frame_index, warm.frame_index + 1);
    assert_no_validation_errors(&agent);
}

#[test]
fn test_brdf_lut_is_built_once() {
    let mut agent = agent(config());
    let mut scene = RenderScene::new();
    scene.camera = camera();

    let first = agent.render(&scene).unwrap();
    let second = agent.render(&scene).unwrap();
    assert_eq!(first.dispatches, second.dispatches + 1);
    assert_eq!(first.graph.passes, second.graph.passes + 1);
}

#[test]
fn test_local_light_triggers_cluster_culling() {
    let mut agent = agent(config());
    let mut scene = scene(&agent, &MeshData::cube(), Material::default(), &[Mat4::IDENTITY]);
    // Frame 0 also builds the BRDF LUT.
    agent.render(&scene).unwrap();
    let dark = agent.render(&scene).unwrap();
    assert_eq!(dark.local_lights, 0);

    scene
        .lights
        .push(Light::point(Vec3::new(0.0, 0.0, 1.5), Vec3::ONE, 10.0, 5.0));
    let lit = agent.render(&scene).unwrap();
    assert_eq!(lit.local_lights, 1);
    assert_eq!(lit.dispatches, dark.dispatches + 1);
    assert_no_validation_errors(&agent);

    release(&agent, scene);
}

#[test]
fn test_async_compute_matches_single_queue() {
    let render = |async_compute: bool| {
        let mut config = config();
        config.pipeline.async_compute = async_compute;
        let mut agent = agent(config);
        let mut scene = scene(&agent, &MeshData::cube(), Material::default(), &[Mat4::IDENTITY]);
        scene
            .lights
            .push(Light::point(Vec3::new(0.5, 0.5, 1.5), Vec3::ONE, 10.0, 5.0));
        agent.render(&scene).unwrap();
        let stats = agent.render(&scene).unwrap();
        assert_no_validation_errors(&agent);
        let hdr = readback(&agent, agent.outputs().unwrap().hdr);
        release(&agent, scene);
        (stats, hdr)
    };

    let (sync_stats, sync_hdr) = render(false);
    let (async_stats, async_hdr) = render(true);
    assert!(!sync_stats.async_compute);
    assert!(async_stats.async_compute);
    assert_eq!(sync_stats.dispatches, async_stats.dispatches);
    assert_eq!(sync_hdr, async_hdr);
}

#[test]
fn test_async_compute_without_lights_stays_on_graphics() {
    let mut config = config();
    config.pipeline.async_compute = true;
    let mut agent = agent(config);
    let scene = scene(&agent, &MeshData::cube(), Material::default(), &[Mat4::IDENTITY]);
    let stats = agent.render(&scene).unwrap();
    assert!(!stats.async_compute);
    release(&agent, scene);
}

#[test]
fn test_translated_instance_has_motion() {
    let mut agent = agent(config());
    let mut scene = scene(&agent, &MeshData::cube(), Material::default(), &[Mat4::IDENTITY]);
    let id = scene.instances[0].id;

    agent.render(&scene).unwrap();
    let still = half_pairs(&readback(&agent, agent.outputs().unwrap().velocity), 2);
    for v in &still {
        assert_abs_diff_eq!(v[0], 0.0, epsilon = 1e-2);
        assert_abs_diff_eq!(v[1], 0.0, epsilon = 1e-2);
    }

    scene.instance_mut(id).unwrap().transform = Mat4::from_translation(Vec3::new(0.2, 0.0, 0.0));
    agent.render(&scene).unwrap();
    let pixels = visibility(&agent);
    let velocity = half_pairs(&readback(&agent, agent.outputs().unwrap().velocity), 2);
    assert_no_validation_errors(&agent);

    let mut moving = 0;
    for (pixel, motion) in pixels.iter().zip(&velocity) {
        if pixel.is_some() {
            assert!(motion[0] > 0.5, "cube moves right: {motion:?}");
            assert_abs_diff_eq!(motion[1], 0.0, epsilon = 0.25);
            moving += 1;
        } else {
            assert_eq!(motion[0], 0.0);
        }
    }
    assert!(moving > 0);

    release(&agent, scene);
}

#[test]
fn test_blended_materials_are_not_drawn() {
    let mut agent = agent(config());
    let glass = Material {
        alpha_mode: AlphaMode::Blend,
        base_color: [1.0, 1.0, 1.0, 0.3],
        ..Material::default()
    };
    let scene = scene(&agent, &MeshData::cube(), glass, &[Mat4::IDENTITY]);

    let stats = agent.render(&scene).unwrap();
    assert_eq!(stats.instances, 0);
    assert_eq!(stats.visible_meshes, 0);
    assert_eq!(covered(&visibility(&agent)), 0);
    assert_no_validation_errors(&agent);

    release(&agent, scene);
}

#[test]
fn test_offscreen_instance_is_culled() {
    let mut agent = agent(config());
    let behind = Mat4::from_translation(Vec3::new(0.0, 0.0, 10.0));
    let aside = Mat4::from_translation(Vec3::new(50.0, 0.0, 0.0));
    let scene = scene(&agent, &MeshData::cube(), Material::default(), &[Mat4::IDENTITY, behind, aside]);

    let stats = agent.render(&scene).unwrap();
    assert_eq!(stats.instances, 1);
    assert_eq!(stats.culled, 2);
    assert_eq!(stats.draw_calls, 2);
    let pixels = visibility(&agent);
    assert!(pixels.iter().flatten().all(|p| p.instance == 0));
    assert_no_validation_errors(&agent);

    release(&agent, scene);
}

#[test]
fn test_culled_instance_keeps_its_previous_transform() {
    let mut agent = agent(config());
    let aside = Mat4::from_translation(Vec3::new(50.0, 0.0, 0.0));
    let mut scene = scene(&agent, &MeshData::cube(), Material::default(), &[aside]);
    let id = scene.instances[0].id;
    let stats = agent.render(&scene).unwrap();
    assert_eq!((stats.instances, stats.culled), (0, 1));

    // Back in view, the first visible frame reprojects from off screen.
    scene.instance_mut(id).unwrap().transform = Mat4::IDENTITY;
    let stats = agent.render(&scene).unwrap();
    assert_eq!((stats.instances, stats.culled), (1, 0));
    let outputs = *agent.outputs().unwrap();
    let motion = half_pairs(&readback(&agent, outputs.velocity), 2);
    let center = &motion[(HEIGHT / 2 * WIDTH + WIDTH / 2) as usize];
    assert!(center[0].abs() > 1.0, "motion {center:?}");

    release(&agent, scene);
}

#[test]
fn test_mesh_without_views_is_a_fatal_table_error() {
    let mut agent = agent(config());
    let mut scene = scene(&agent, &MeshData::cube(), Material::default(), &[Mat4::IDENTITY]);
    scene.meshes[0].release_views();

    let err = agent.render(&scene).unwrap_err();
    assert!(matches!(err, RenderError::InvalidMeshTable { mesh: 0, .. }), "{err:?}");
    assert!(err.is_fatal());

    release(&agent, scene);
}

#[test]
fn test_wgpu_frame_covers_the_same_pixels() {
    let config = config();
    let Ok(rd) = RenderDevice::create(&WgpuBackend::new(), &config) else {
        println!("Skipping wgpu frame test: could not create test device.");
        return;
    };
    let mut gpu = RenderAgent::new(rd, config.clone()).expect("render agent");
    let mut cpu = agent(config);
    let gpu_scene = scene(&gpu, &MeshData::cube(), Material::default(), &[Mat4::IDENTITY]);
    let cpu_scene = scene(&cpu, &MeshData::cube(), Material::default(), &[Mat4::IDENTITY]);

    let stats = gpu.render(&gpu_scene).unwrap();
    assert_eq!(stats, FrameStats { graph: stats.graph, ..cpu.render(&cpu_scene).unwrap() });
    assert_no_validation_errors(&gpu);

    // Rasterizers may disagree on pixels along the silhouette.
    let (a, b) = (visibility(&gpu), visibility(&cpu));
    let differing = a.iter().zip(&b).filter(|(x, y)| x.is_some() != y.is_some()).count();
    assert!(differing <= (WIDTH + HEIGHT) as usize, "{differing} pixels differ");
    assert!(a[(HEIGHT / 2 * WIDTH + WIDTH / 2) as usize].is_some());

    release(&gpu, gpu_scene);
    release(&cpu, cpu_scene);
}

#[test]
fn test_invalid_scene_aborts_the_frame() {
    let mut agent = agent(config());
    let mut scene = RenderScene::new();
    scene.add_material(Material::default());
    scene.add_instance(0, 0, Mat4::IDENTITY);
    assert!(matches!(agent.render(&scene), Err(RenderError::InvalidScene(_))));

    // The agent recovers once the scene is fixed.
    scene.instances.clear();
    assert!(agent.render(&scene).is_ok());
}

#[test]
fn test_resize_recreates_screen_targets() {
    let mut agent = agent(config());
    let scene = scene(&agent, &MeshData::cube(), Material::default(), &[Mat4::IDENTITY]);
    agent.render(&scene).unwrap();

    agent.resize(0, 12).unwrap();
    assert_eq!(agent.config().viewport.width, WIDTH);

    agent.resize(16, 12).unwrap();
    assert!(agent.outputs().is_none());
    agent.render(&scene).unwrap();
    assert_no_validation_errors(&agent);

    let outputs = *agent.outputs().unwrap();
    for output in [outputs.visibility, outputs.hdr, outputs.depth, outputs.gbuffer[0]] {
        let desc = agent.device().resource_desc(output.resource).unwrap();
        assert_eq!((desc.width as u32, desc.height), (16, 12));
    }
    assert_eq!(visibility(&agent).len(), 16 * 12);

    release(&agent, scene);
}

struct CountingShadows(Arc<AtomicU32>);

impl ShadowHook for CountingShadows {
    fn declare(
        &mut self,
        graph: &mut RenderGraph,
        ctx: &ShadowContext<'_>,
    ) -> Result<Option<SunShadow>, RenderError> {
        self.0.fetch_add(1, Ordering::Relaxed);
        ClearShadowMap.declare(graph, ctx)
    }
}

struct Tonemap(Arc<AtomicU32>);

impl PostProcessHook for Tonemap {
    fn declare(
        &mut self,
        graph: &mut RenderGraph,
        ctx: &PostProcessContext,
    ) -> Result<(), RenderError> {
        let runs = self.0.clone();
        graph
            .add_pass("Tonemap", PassType::Graphics)
            .read(ctx.hdr, RgUsage::SHADER_RESOURCE)
            .execute(move |_| {
                runs.fetch_add(1, Ordering::Relaxed);
                Ok(())
            });
        Ok(())
    }
}

#[test]
fn test_hooks_run_every_frame() {
    let mut agent = agent(config());
    let mut scene = RenderScene::new();
    scene.camera = camera();
    let shadows = Arc::new(AtomicU32::new(0));
    let tonemaps = Arc::new(AtomicU32::new(0));

    let without = agent.render(&scene).unwrap();
    agent.set_shadow_hook(Box::new(CountingShadows(shadows.clone())));
    agent.set_post_process_hook(Some(Box::new(Tonemap(tonemaps.clone()))));
    agent.render(&scene).unwrap();
    let with = agent.render(&scene).unwrap();

    assert_eq!(shadows.load(Ordering::Relaxed), 2);
    assert_eq!(tonemaps.load(Ordering::Relaxed), 2);
    assert_eq!(with.graph.passes, without.graph.passes, "LUT pass replaced by tonemap");
    assert_no_validation_errors(&agent);
}
