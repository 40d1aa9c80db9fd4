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

//! The `wgpu` device on whatever adapter the machine has. Every test skips
//! when no adapter with bindless support is available.

use std::path::Path;

use cortex_core::config::RendererConfig;
use cortex_core::renderer::api::*;
use cortex_core::renderer::scene::bindings::{self, entry_points, programs};
use cortex_core::renderer::{DeviceError, GpuBackend, RenderDevice, Uploader};
use cortex_infra::{logging, WgpuBackend};

// Returns None if a suitable adapter cannot be found.
fn create_test_device(breadcrumbs: bool) -> Option<RenderDevice> {
    logging::init();
    let backend = WgpuBackend::new();
    if backend.enumerate_adapters().is_empty() {
        return None;
    }
    let mut config = RendererConfig::default();
    config.device.allow_software_adapter = true;
    config.debug.gpu_breadcrumbs = breadcrumbs;
    RenderDevice::create(&backend, &config).ok()
}

macro_rules! device_or_skip {
    () => {
        device_or_skip!(false)
    };
    ($breadcrumbs:expr) => {
        match create_test_device($breadcrumbs) {
            Some(rd) => rd,
            None => {
                println!("Skipping wgpu test: could not create test device.");
                return;
            }
        }
    };
}

#[test]
fn test_flush_completes_last_signal() {
    let rd = device_or_skip!();
    for queue in [QueueType::Graphics, QueueType::Compute, QueueType::Copy] {
        let queue = rd.queue(queue);
        queue.signal().unwrap();
        assert_eq!(queue.flush().unwrap(), queue.last_signaled_value());
        assert!(queue.completed_value().unwrap() >= queue.last_signaled_value());
    }
}

#[test]
fn test_buffer_upload_then_readback() {
    let rd = device_or_skip!();
    let uploader = Uploader::new(rd.device().clone(), rd.graphics_queue().clone());
    let data: Vec<u8> = (0..=255).collect();
    let buffer = uploader
        .upload_buffer(&data, ResourceStates::ALL_SHADER_RESOURCE, "Bytes")
        .unwrap();
    let back = uploader
        .readback_buffer(buffer, ResourceStates::ALL_SHADER_RESOURCE)
        .unwrap();
    assert_eq!(back, data);
}

#[test]
fn test_texture_upload_then_readback() {
    let rd = device_or_skip!();
    let uploader = Uploader::new(rd.device().clone(), rd.copy_queue().clone());
    let desc = ResourceDesc::texture_2d(5, 3, Format::Rgba8Unorm).with_mips(2);
    let mip0: Vec<u8> = (0..5 * 3 * 4).map(|i| i as u8).collect();
    let mip1: Vec<u8> = (0..2 * 4).map(|i| 200 + i as u8).collect();
    let texture = uploader
        .upload_texture_2d(
            &desc,
            &[mip0.as_slice(), mip1.as_slice()],
            ResourceStates::COPY_SOURCE,
            "Checker",
        )
        .unwrap();
    assert_eq!(
        uploader
            .readback_texture(texture, 0, ResourceStates::COPY_SOURCE)
            .unwrap(),
        mip0
    );
    assert_eq!(
        uploader
            .readback_texture(texture, 1, ResourceStates::COPY_SOURCE)
            .unwrap(),
        mip1
    );
}

#[test]
fn test_uav_clear_is_visible_across_queues() {
    let rd = device_or_skip!();
    let device = rd.device();
    let buffer = device
        .create_committed_resource(
            HeapType::Default,
            &ResourceDesc::buffer(64).with_flags(ResourceFlags::ALLOW_UNORDERED_ACCESS),
            ResourceStates::UNORDERED_ACCESS,
            None,
            "Cleared",
        )
        .unwrap();
    let readback = device
        .create_committed_resource(
            HeapType::Readback,
            &ResourceDesc::buffer(64),
            ResourceStates::COPY_DEST,
            None,
            "Readback",
        )
        .unwrap();
    let uav = UnorderedAccessViewDesc::Buffer {
        first_element: 0,
        num_elements: 16,
        stride: 0,
    };
    let heaps = [false, true].map(|shader_visible| {
        device
            .create_descriptor_heap(&DescriptorHeapDesc {
                ty: DescriptorHeapType::CbvSrvUav,
                capacity: 1,
                shader_visible,
            })
            .unwrap()
    });
    for heap in &heaps {
        device
            .create_unordered_access_view(buffer, &uav, heap.cpu_start)
            .unwrap();
    }

    let mut compute = device.create_command_list(QueueType::Compute).unwrap();
    compute.set_descriptor_heaps(&[heaps[1].id]);
    compute.clear_unordered_access_view_uint(heaps[1].gpu_start, heaps[0].cpu_start, buffer, [9; 4]);
    let list = compute.close().unwrap();
    rd.compute_queue().execute_command_lists(&[list]).unwrap();
    let cleared = rd.compute_queue().signal().unwrap();

    rd.graphics_queue().wait_gpu(rd.compute_queue(), cleared).unwrap();
    let mut graphics = device.create_command_list(QueueType::Graphics).unwrap();
    graphics.resource_barrier(&[ResourceBarrier::transition(
        buffer,
        ResourceStates::UNORDERED_ACCESS,
        ResourceStates::COPY_SOURCE,
    )]);
    graphics.copy_buffer_region(readback, 0, buffer, 0, 64);
    let list = graphics.close().unwrap();
    rd.graphics_queue().execute_command_lists(&[list]).unwrap();
    rd.graphics_queue().flush().unwrap();

    let mut bytes = [0u8; 64];
    device.read_mapped(readback, 0, &mut bytes).unwrap();
    let words: &[u32] = bytemuck::cast_slice(&bytes);
    assert!(words.iter().all(|w| *w == 9));
}

#[test]
fn test_every_program_builds() {
    let rd = device_or_skip!();
    let device = rd.device();
    let compute = [
        (programs::BRDF_LUT, bindings::brdf_lut_root_signature()),
        (programs::CLUSTER_CULL, bindings::cluster_cull_root_signature()),
        (programs::MATERIAL_RESOLVE, bindings::material_resolve_root_signature()),
        (programs::DEFERRED_LIGHTING, bindings::deferred_lighting_root_signature()),
    ];
    for (program, signature) in compute {
        let root_signature = device.create_root_signature(&signature).unwrap();
        device
            .create_compute_pipeline(&ComputePipelineDesc {
                label: program.into(),
                root_signature,
                shader: ShaderSource::new(
                    Path::new("assets/shaders"),
                    program,
                    entry_points::CS_MAIN,
                    ShaderStage::Compute,
                ),
            })
            .unwrap_or_else(|e| panic!("{program}: {e}"));
    }
}

#[test]
fn test_fault_removes_device_and_keeps_breadcrumbs() {
    let rd = device_or_skip!(true);
    let device = rd.device();
    let root_signature = device
        .create_root_signature(&bindings::brdf_lut_root_signature())
        .unwrap();
    let pipeline = device
        .create_compute_pipeline(&ComputePipelineDesc {
            label: "BRDF LUT".into(),
            root_signature,
            shader: ShaderSource::new(
                Path::new("assets/shaders"),
                programs::BRDF_LUT,
                entry_points::CS_MAIN,
                ShaderStage::Compute,
            ),
        })
        .unwrap();

    // The output table is never bound.
    let mut cmd = device.create_command_list(QueueType::Compute).unwrap();
    cmd.begin_event("Broken LUT");
    cmd.set_pipeline(pipeline);
    cmd.set_root_signature(PipelineBindPoint::Compute, root_signature);
    cmd.set_root_constants(PipelineBindPoint::Compute, bindings::brdf_lut::CONSTANTS, &[8, 4], 0);
    cmd.dispatch(1, 1, 1);
    cmd.end_event();
    let list = cmd.close().unwrap();
    rd.compute_queue().execute_command_lists(&[list]).unwrap();

    assert!(matches!(rd.compute_queue().flush(), Err(DeviceError::Removed { .. })));
    assert!(device.create_command_list(QueueType::Graphics).is_err());
    let trail = device.breadcrumbs();
    assert!(trail.iter().any(|marker| marker.ends_with("Broken LUT")));
}
