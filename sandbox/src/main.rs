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

// Cortex Sandbox
// Renders a small scene on the first wgpu adapter, or the software device
// when none is usable, and saves the last frame.
//
// Usage: sandbox [config.json] [frames] [output.png]

use anyhow::{Context, Result};
use cortex_agents::RenderAgent;
use cortex_core::config::RendererConfig;
use cortex_core::math::{Mat4, Vec3};
use cortex_core::renderer::scene::{AlphaMode, Camera, Light, Material, MeshData, RenderScene};
use cortex_core::renderer::{RenderDevice, Uploader};
use cortex_infra::{logging, SoftwareBackend, WgpuBackend};

const DEFAULT_FRAMES: u32 = 8;
const DEFAULT_OUTPUT: &str = "cortex_frame.png";

fn main() -> Result<()> {
    logging::init();
    let mut args = std::env::args().skip(1);

    let config = match args.next() {
        Some(path) => RendererConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => {
            // Keep the default demo small in case it falls back to the CPU.
            let mut config = RendererConfig::default();
            config.viewport.width = 320;
            config.viewport.height = 180;
            config
        }
    };
    let frames = match args.next() {
        Some(n) => n.parse().with_context(|| format!("invalid frame count '{n}'"))?,
        None => DEFAULT_FRAMES,
    };
    let output = args.next().unwrap_or_else(|| DEFAULT_OUTPUT.to_owned());

    let device = match RenderDevice::create(&WgpuBackend::new(), &config) {
        Ok(device) => device,
        Err(e) => {
            log::warn!("No usable wgpu adapter ({e}), falling back to the software device");
            RenderDevice::create(&SoftwareBackend::new(), &config)
                .context("creating the software device")?
        }
    };
    let mut agent = RenderAgent::new(device, config).context("creating the render agent")?;
    let mut scene = build_scene(&agent)?;
    let spinner = scene.instances[0].id;

    for frame in 0..frames {
        let angle = frame as f32 * 0.15;
        if let Some(instance) = scene.instance_mut(spinner) {
            instance.transform =
                Mat4::from_translation(Vec3::new(0.0, 0.5, 0.0)) * Mat4::from_rotation_y(angle);
        }
        let stats = agent
            .render(&scene)
            .with_context(|| format!("rendering frame {frame}"))?;
        log::info!(
            "Frame {}: {} draws, {} dispatches, {} instances, {} lights, {} barriers",
            stats.frame_index,
            stats.draw_calls,
            stats.dispatches,
            stats.instances,
            stats.local_lights,
            stats.graph.barriers
        );
    }

    if frames > 0 {
        save_hdr(&agent, &output)?;
        log::info!("Wrote {output}");
    }

    agent.wait_idle()?;
    scene.destroy_meshes(agent.device().as_ref());
    Ok(())
}

fn build_scene(agent: &RenderAgent) -> Result<RenderScene> {
    let viewport = agent.config().viewport;
    let mut scene = RenderScene::new();
    scene.camera = Camera::look_at(
        Vec3::new(0.0, 3.0, 7.0),
        Vec3::new(0.0, 0.5, 0.0),
        50f32.to_radians(),
        viewport.width as f32 / viewport.height as f32,
        0.1,
        100.0,
    )?;

    let cube = scene.add_mesh(agent.upload_mesh(&MeshData::cube(), "Cube")?);
    let ground = scene.add_mesh(agent.upload_mesh(&MeshData::quad(1.0), "Ground")?);

    let gold = scene.add_material(Material {
        base_color: [1.0, 0.78, 0.34, 1.0],
        metallic: 1.0,
        roughness: 0.3,
        ..Material::default()
    });
    let clay = scene.add_material(Material {
        base_color: [0.8, 0.3, 0.25, 1.0],
        roughness: 0.8,
        ..Material::default()
    });
    let floor = scene.add_material(Material {
        base_color: [0.6, 0.6, 0.6, 1.0],
        roughness: 0.9,
        double_sided: true,
        ..Material::default()
    });
    let cutout = scene.add_material(Material {
        base_color: [0.3, 0.7, 0.3, 1.0],
        alpha_mode: AlphaMode::Mask,
        double_sided: true,
        ..Material::default()
    });

    // The first instance spins.
    scene.add_instance(cube, gold, Mat4::IDENTITY);
    for i in 0..3 {
        let x = i as f32 * 1.5 - 1.5;
        scene.add_instance(
            cube,
            clay,
            Mat4::from_translation(Vec3::new(x, 0.25, -2.0)) * Mat4::from_scale(Vec3::splat(0.5)),
        );
    }
    scene.add_instance(
        ground,
        floor,
        Mat4::from_scale(Vec3::splat(12.0)) * Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2),
    );
    scene.add_instance(
        ground,
        cutout,
        Mat4::from_translation(Vec3::new(2.5, 0.75, 0.5)) * Mat4::from_scale(Vec3::splat(1.5)),
    );

    scene.lights.push(Light::directional(
        Vec3::new(-0.4, -1.0, -0.3),
        Vec3::new(1.0, 0.96, 0.9),
        3.0,
    ));
    scene.lights.push(Light::point(
        Vec3::new(-2.0, 1.5, 1.0),
        Vec3::new(0.3, 0.5, 1.0),
        20.0,
        6.0,
    ));
    scene.lights.push(Light::point(
        Vec3::new(2.0, 1.0, -1.0),
        Vec3::new(1.0, 0.4, 0.2),
        15.0,
        5.0,
    ));
    Ok(scene)
}

/// Reads the last frame's HDR target back, tonemaps it and writes a PNG.
fn save_hdr(agent: &RenderAgent, path: &str) -> Result<()> {
    let outputs = *agent.outputs().context("no frame was rendered")?;
    let uploader = Uploader::new(
        agent.device().clone(),
        agent.render_device().graphics_queue().clone(),
    );
    let texels = uploader.readback_texture(outputs.hdr.resource, 0, outputs.hdr.state)?;
    let viewport = agent.config().viewport;

    let tonemap = |c: f32| {
        let mapped = c.max(0.0) / (1.0 + c.max(0.0));
        (mapped.powf(1.0 / 2.2) * 255.0 + 0.5) as u8
    };
    let mut rgba = Vec::with_capacity(texels.len() / 2);
    for texel in texels.chunks_exact(8) {
        for (i, channel) in texel.chunks_exact(2).enumerate() {
            let value = half::f16::from_le_bytes([channel[0], channel[1]]).to_f32();
            rgba.push(if i == 3 { 255 } else { tonemap(value) });
        }
    }
    let image = image::RgbaImage::from_raw(viewport.width, viewport.height, rgba)
        .context("HDR readback does not match the viewport")?;
    image.save(path).with_context(|| format!("writing {path}"))?;
    Ok(())
}
