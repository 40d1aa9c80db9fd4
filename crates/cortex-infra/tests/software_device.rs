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

//! Queue, fence, upload and validation behavior of the software device.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cortex_core::config::RendererConfig;
use cortex_core::renderer::api::*;
use cortex_core::renderer::scene::bindings::{self, entry_points, programs};
use cortex_core::renderer::{DeviceError, GpuDevice, PipelineError, RenderDevice, Uploader};
use cortex_infra::{logging, SoftwareBackend};

fn render_device(breadcrumbs: bool) -> RenderDevice {
    logging::init();
    let mut config = RendererConfig::default();
    config.debug.gpu_breadcrumbs = breadcrumbs;
    RenderDevice::create(&SoftwareBackend::new(), &config).expect("software device")
}

fn assert_no_validation_errors(device: &Arc<dyn GpuDevice>) {
    let errors: Vec<_> = device
        .take_debug_messages()
        .into_iter()
        .filter(|m| m.is_error())
        .collect();
    assert!(errors.is_empty(), "validation errors: {errors:#?}");
}

#[test]
fn test_adapter_reports_software() {
    let rd = render_device(false);
    assert!(rd.adapter().is_software);
    assert!(rd.adapter().supports_bindless);
    assert_eq!(rd.adapter().dedicated_video_memory_mb(), 2048);
}

#[test]
fn test_flush_completes_last_signal() {
    let rd = render_device(false);
    for queue in [QueueType::Graphics, QueueType::Compute, QueueType::Copy] {
        let queue = rd.queue(queue);
        queue.signal().unwrap();
        let flushed = queue.flush().unwrap();
        assert_eq!(flushed, queue.last_signaled_value());
        assert!(queue.completed_value().unwrap() >= queue.last_signaled_value());
    }
}

#[test]
fn test_texture_upload_then_readback() {
    let rd = render_device(false);
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
    assert_no_validation_errors(rd.device());
}

#[test]
fn test_buffer_upload_then_readback() {
    let rd = render_device(false);
    let uploader = Uploader::new(rd.device().clone(), rd.graphics_queue().clone());
    let data: Vec<u8> = (0..=255).collect();
    let buffer = uploader
        .upload_buffer(&data, ResourceStates::ALL_SHADER_RESOURCE, "Bytes")
        .unwrap();
    let back = uploader
        .readback_buffer(buffer, ResourceStates::ALL_SHADER_RESOURCE)
        .unwrap();
    assert_eq!(back, data);
    assert_no_validation_errors(rd.device());
}

#[test]
fn test_mismatched_before_state_is_reported() {
    let rd = render_device(false);
    let device = rd.device();
    let texture = device
        .create_committed_resource(
            HeapType::Default,
            &ResourceDesc::texture_2d(4, 4, Format::Rgba16Float)
                .with_flags(ResourceFlags::ALLOW_RENDER_TARGET),
            ResourceStates::RENDER_TARGET,
            None,
            "Target",
        )
        .unwrap();
    let mut cmd = device.create_command_list(QueueType::Graphics).unwrap();
    cmd.resource_barrier(&[ResourceBarrier::transition(
        texture,
        ResourceStates::PIXEL_SHADER_RESOURCE,
        ResourceStates::COPY_SOURCE,
    )]);
    let list = cmd.close().unwrap();
    rd.graphics_queue().execute_command_lists(&[list]).unwrap();
    rd.graphics_queue().flush().unwrap();

    let messages = device.take_debug_messages();
    assert_eq!(messages.iter().filter(|m| m.is_error()).count(), 1);
    assert!(messages[0].text.contains("Target"));
}

#[test]
fn test_identity_transition_is_reported() {
    let rd = render_device(false);
    let device = rd.device();
    let buffer = device
        .create_committed_resource(
            HeapType::Default,
            &ResourceDesc::buffer(64),
            ResourceStates::COPY_DEST,
            None,
            "Buffer",
        )
        .unwrap();
    let mut cmd = device.create_command_list(QueueType::Copy).unwrap();
    cmd.resource_barrier(&[ResourceBarrier::transition(
        buffer,
        ResourceStates::COPY_DEST,
        ResourceStates::COPY_DEST,
    )]);
    let list = cmd.close().unwrap();
    rd.copy_queue().execute_command_lists(&[list]).unwrap();
    rd.copy_queue().flush().unwrap();
    assert!(device.take_debug_messages().iter().any(|m| m.is_error()));
}

#[test]
fn test_lists_run_only_on_their_queue_family() {
    let rd = render_device(false);
    let device = rd.device();

    let mut cmd = device.create_command_list(QueueType::Compute).unwrap();
    cmd.draw_instanced(3, 1, 0, 0);
    assert!(matches!(cmd.close(), Err(DeviceError::InvalidCommandList(_))));

    let cmd = device.create_command_list(QueueType::Copy).unwrap();
    let list = cmd.close().unwrap();
    assert!(matches!(
        rd.graphics_queue().execute_command_lists(&[list]),
        Err(DeviceError::InvalidCommandList(_))
    ));
}

#[test]
fn test_copy_lists_only_transition_between_copy_states() {
    let rd = render_device(false);
    let device = rd.device();
    let buffer = device
        .create_committed_resource(
            HeapType::Default,
            &ResourceDesc::buffer(64),
            ResourceStates::COPY_DEST,
            None,
            "Buffer",
        )
        .unwrap();

    let mut cmd = device.create_command_list(QueueType::Copy).unwrap();
    cmd.resource_barrier(&[ResourceBarrier::transition(
        buffer,
        ResourceStates::COPY_DEST,
        ResourceStates::ALL_SHADER_RESOURCE,
    )]);
    assert!(matches!(cmd.close(), Err(DeviceError::InvalidCommandList(_))));
    assert!(device.take_debug_messages().iter().any(|m| m.is_error()));

    let mut cmd = device.create_command_list(QueueType::Copy).unwrap();
    cmd.resource_barrier(&[ResourceBarrier::transition(
        buffer,
        ResourceStates::COPY_DEST,
        ResourceStates::COPY_SOURCE,
    )]);
    let list = cmd.close().unwrap();
    rd.copy_queue().execute_command_lists(&[list]).unwrap();
    rd.copy_queue().flush().unwrap();
    assert_no_validation_errors(device);
}

#[test]
fn test_unknown_shader_program_is_rejected() {
    let rd = render_device(false);
    let device = rd.device();
    let root_signature = device
        .create_root_signature(&bindings::brdf_lut_root_signature())
        .unwrap();
    let err = device
        .create_compute_pipeline(&ComputePipelineDesc {
            label: "Missing".into(),
            root_signature,
            shader: ShaderSource::new(
                Path::new("assets/shaders"),
                "DoesNotExist",
                entry_points::CS_MAIN,
                ShaderStage::Compute,
            ),
        })
        .unwrap_err();
    assert!(matches!(err, PipelineError::ShaderNotFound { .. }));
}

#[test]
fn test_mismatched_root_signature_is_rejected() {
    let rd = render_device(false);
    let device = rd.device();
    let root_signature = device
        .create_root_signature(&bindings::cluster_cull_root_signature())
        .unwrap();
    let err = device
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
        .unwrap_err();
    assert!(matches!(err, PipelineError::CompilationFailed { .. }));
}

/// One raw UAV over a 16-word buffer, in a CPU-only heap and in a
/// shader-visible heap, as `ClearUnorderedAccessViewUint` wants.
struct ClearTarget {
    buffer: ResourceId,
    visible_heap: DescriptorHeapId,
    gpu: GpuDescriptorHandle,
    cpu: CpuDescriptorHandle,
}

fn clear_target(device: &Arc<dyn GpuDevice>) -> ClearTarget {
    let buffer = device
        .create_committed_resource(
            HeapType::Default,
            &ResourceDesc::buffer(64).with_flags(ResourceFlags::ALLOW_UNORDERED_ACCESS),
            ResourceStates::UNORDERED_ACCESS,
            None,
            "Cleared",
        )
        .unwrap();
    let uav = UnorderedAccessViewDesc::Buffer {
        first_element: 0,
        num_elements: 16,
        stride: 0,
    };
    let infos = [false, true].map(|shader_visible| {
        device
            .create_descriptor_heap(&DescriptorHeapDesc {
                ty: DescriptorHeapType::CbvSrvUav,
                capacity: 1,
                shader_visible,
            })
            .unwrap()
    });
    for info in &infos {
        device
            .create_unordered_access_view(buffer, &uav, info.cpu_start)
            .unwrap();
    }
    ClearTarget {
        buffer,
        visible_heap: infos[1].id,
        gpu: infos[1].gpu_start,
        cpu: infos[0].cpu_start,
    }
}

#[test]
fn test_cross_queue_wait_orders_compute_before_graphics() {
    let rd = render_device(false);
    let device = rd.device();
    let target = clear_target(device);
    let readback = device
        .create_committed_resource(
            HeapType::Readback,
            &ResourceDesc::buffer(64),
            ResourceStates::COPY_DEST,
            None,
            "Readback",
        )
        .unwrap();

    // Hold the compute queue until the copy queue signals.
    rd.compute_queue().wait_gpu(rd.copy_queue(), 1).unwrap();
    let mut compute = device.create_command_list(QueueType::Compute).unwrap();
    compute.set_descriptor_heaps(&[target.visible_heap]);
    compute.clear_unordered_access_view_uint(target.gpu, target.cpu, target.buffer, [7; 4]);
    let list = compute.close().unwrap();
    rd.compute_queue().execute_command_lists(&[list]).unwrap();
    let compute_done = rd.compute_queue().signal().unwrap();

    rd.graphics_queue().wait_gpu(rd.compute_queue(), compute_done).unwrap();
    let mut graphics = device.create_command_list(QueueType::Graphics).unwrap();
    graphics.resource_barrier(&[ResourceBarrier::transition(
        target.buffer,
        ResourceStates::UNORDERED_ACCESS,
        ResourceStates::COPY_SOURCE,
    )]);
    graphics.copy_buffer_region(readback, 0, target.buffer, 0, 64);
    let list = graphics.close().unwrap();
    rd.graphics_queue().execute_command_lists(&[list]).unwrap();
    let graphics_done = rd.graphics_queue().signal().unwrap();

    thread::sleep(Duration::from_millis(20));
    assert!(!rd.graphics_queue().is_fence_complete(graphics_done).unwrap());

    assert_eq!(rd.copy_queue().signal().unwrap(), 1);
    rd.graphics_queue().wait_cpu(graphics_done).unwrap();

    let mut bytes = [0u8; 64];
    device.read_mapped(readback, 0, &mut bytes).unwrap();
    let words: &[u32] = bytemuck::cast_slice(&bytes);
    assert!(words.iter().all(|w| *w == 7));
    assert_no_validation_errors(device);
}

#[test]
fn test_uav_clear_needs_a_cpu_only_handle() {
    let rd = render_device(false);
    let device = rd.device();
    let target = clear_target(device);
    let visible_cpu = device
        .create_descriptor_heap(&DescriptorHeapDesc {
            ty: DescriptorHeapType::CbvSrvUav,
            capacity: 1,
            shader_visible: true,
        })
        .unwrap();
    device
        .create_unordered_access_view(
            target.buffer,
            &UnorderedAccessViewDesc::Buffer {
                first_element: 0,
                num_elements: 16,
                stride: 0,
            },
            visible_cpu.cpu_start,
        )
        .unwrap();
    let mut cmd = device.create_command_list(QueueType::Compute).unwrap();
    cmd.set_descriptor_heaps(&[target.visible_heap]);
    cmd.clear_unordered_access_view_uint(target.gpu, visible_cpu.cpu_start, target.buffer, [1; 4]);
    let list = cmd.close().unwrap();
    rd.compute_queue().execute_command_lists(&[list]).unwrap();
    rd.compute_queue().flush().unwrap();
    assert!(device.take_debug_messages().iter().any(|m| m.is_error()));
}

#[test]
fn test_fault_removes_device_and_keeps_breadcrumbs() {
    let rd = render_device(true);
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
    assert!(matches!(rd.check_removed(), Err(DeviceError::Removed { .. })));
    let trail = device.breadcrumbs();
    assert!(trail.iter().any(|marker| marker.ends_with("Broken LUT")));
}
