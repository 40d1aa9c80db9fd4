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

//! Argument checks every device applies before touching its backend.
//!
//! These mirror the rules of the explicit API: a device reports the same
//! errors for the same misuse whether it interprets commands on the CPU or
//! forwards them to a GPU.

use cortex_core::renderer::api::*;
use cortex_core::renderer::scene::bindings::{self, programs};
use cortex_core::renderer::{PipelineError, ResourceError};

use super::descriptors::DescriptorHeap;

/// Root signatures are limited to 64 DWORDs.
pub(crate) const MAX_ROOT_DWORDS: u32 = 64;
/// Constant buffer views must be 256-byte aligned.
pub(crate) const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// The parts of a resource a view is checked against.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ViewedResource<'a> {
    pub id: ResourceId,
    pub label: &'a str,
    pub desc: &'a ResourceDesc,
}

fn invalid(message: impl Into<String>) -> ResourceError {
    ResourceError::InvalidDesc(message.into())
}

fn invalid_view(message: impl Into<String>) -> ResourceError {
    ResourceError::InvalidView(message.into())
}

/// Checks a committed resource description against its heap and initial
/// state.
pub(crate) fn validate_desc(
    heap: HeapType,
    desc: &ResourceDesc,
    initial: ResourceStates,
) -> Result<(), ResourceError> {
    if desc.width == 0 || desc.height == 0 {
        return Err(invalid("zero-sized resource"));
    }
    if desc.is_buffer() {
        if desc.format != Format::Unknown || desc.mip_levels != 1 || desc.height != 1 {
            return Err(invalid("buffers are untyped, single-mip and one row high"));
        }
        if desc
            .flags
            .intersects(ResourceFlags::ALLOW_RENDER_TARGET | ResourceFlags::ALLOW_DEPTH_STENCIL)
        {
            return Err(invalid("buffers cannot be render or depth targets"));
        }
    } else {
        if heap != HeapType::Default {
            return Err(invalid("textures can only live in the default heap"));
        }
        if desc.format == Format::Unknown {
            return Err(invalid("textures need a format"));
        }
        let full = ResourceDesc::full_mip_count(desc.width as u32, desc.height);
        if desc.mip_levels == 0 || desc.mip_levels > full || desc.array_size == 0 {
            return Err(invalid(format!(
                "{} mips x {} slices for a {}x{} texture",
                desc.mip_levels, desc.array_size, desc.width, desc.height
            )));
        }
        let depth_capable = matches!(desc.format, Format::D32Float | Format::R32Typeless);
        if desc.flags.contains(ResourceFlags::ALLOW_DEPTH_STENCIL) && !depth_capable {
            return Err(invalid(format!("{:?} cannot hold depth", desc.format)));
        }
        if desc.flags.contains(ResourceFlags::ALLOW_RENDER_TARGET) && desc.format.is_depth() {
            return Err(invalid("depth formats cannot be render targets"));
        }
    }
    match heap {
        HeapType::Upload if initial != ResourceStates::GENERIC_READ => {
            Err(invalid("upload heap resources start in GENERIC_READ"))
        }
        HeapType::Readback if initial != ResourceStates::COPY_DEST => {
            Err(invalid("readback heap resources start in COPY_DEST"))
        }
        HeapType::Default if !initial.is_valid_combination() => {
            Err(invalid(format!("invalid initial state {initial:?}")))
        }
        _ => Ok(()),
    }
}

/// Checks a buffer view range, `stride == 0` meaning raw 32-bit words.
pub(crate) fn check_buffer_range(
    resource: ViewedResource<'_>,
    first_element: u64,
    num_elements: u32,
    stride: u32,
) -> Result<(), ResourceError> {
    if !resource.desc.is_buffer() {
        return Err(invalid_view(format!(
            "'{}' is a texture viewed as a buffer",
            resource.label
        )));
    }
    let element = if stride == 0 { 4 } else { u64::from(stride) };
    let end = (first_element + u64::from(num_elements)) * element;
    if end > resource.desc.width {
        return Err(ResourceError::OutOfBounds {
            resource: resource.id,
            offset: first_element * element,
            len: u64::from(num_elements) * element,
            size: resource.desc.width,
        });
    }
    Ok(())
}

/// Checks a texture view's format and mip against its resource.
pub(crate) fn check_texture_view(
    resource: ViewedResource<'_>,
    format: Format,
    mip: u32,
) -> Result<(), ResourceError> {
    let desc = resource.desc;
    if desc.is_buffer() {
        return Err(invalid_view(format!(
            "'{}' is a buffer viewed as a texture",
            resource.label
        )));
    }
    let effective = if format == Format::Unknown { desc.format } else { format };
    if !desc.format.is_view_compatible(format) || effective.is_typeless() {
        return Err(invalid_view(format!(
            "{format:?} view of '{}' ({:?})",
            resource.label, desc.format
        )));
    }
    if mip >= desc.mip_levels {
        return Err(invalid_view(format!(
            "mip {mip} of '{}', which has {}",
            resource.label, desc.mip_levels
        )));
    }
    Ok(())
}

/// Checks a shader resource view. Depth is read through `R32Float`.
pub(crate) fn check_srv(
    resource: ViewedResource<'_>,
    desc: &ShaderResourceViewDesc,
) -> Result<(), ResourceError> {
    if resource.desc.flags.contains(ResourceFlags::DENY_SHADER_RESOURCE) {
        return Err(invalid_view(format!(
            "'{}' denies shader resource views",
            resource.label
        )));
    }
    match *desc {
        ShaderResourceViewDesc::Texture2D {
            format,
            most_detailed_mip,
            ..
        } => check_texture_view(resource, format, most_detailed_mip)?,
        ShaderResourceViewDesc::Texture2DArray {
            format,
            most_detailed_mip,
            first_slice,
            array_size,
            ..
        } => {
            check_texture_view(resource, format, most_detailed_mip)?;
            if first_slice + array_size > resource.desc.array_size {
                return Err(invalid_view(format!(
                    "slices {first_slice}..{} of '{}', which has {}",
                    first_slice + array_size,
                    resource.label,
                    resource.desc.array_size
                )));
            }
        }
        ShaderResourceViewDesc::Buffer {
            first_element,
            num_elements,
            stride,
        } => check_buffer_range(resource, first_element, num_elements, stride)?,
    }
    if let ShaderResourceViewDesc::Texture2D { format, .. }
    | ShaderResourceViewDesc::Texture2DArray { format, .. } = *desc
    {
        if format.is_depth() || (format == Format::Unknown && resource.desc.format.is_depth()) {
            return Err(invalid_view(format!(
                "depth format SRV of '{}'; read depth through R32Float",
                resource.label
            )));
        }
    }
    Ok(())
}

/// Checks an unordered access view.
pub(crate) fn check_uav(
    resource: ViewedResource<'_>,
    desc: &UnorderedAccessViewDesc,
) -> Result<(), ResourceError> {
    if !resource.desc.flags.contains(ResourceFlags::ALLOW_UNORDERED_ACCESS) {
        return Err(invalid_view(format!(
            "'{}' was not created with ALLOW_UNORDERED_ACCESS",
            resource.label
        )));
    }
    match *desc {
        UnorderedAccessViewDesc::Texture2D { format, mip_slice } => {
            check_texture_view(resource, format, mip_slice)
        }
        UnorderedAccessViewDesc::Buffer {
            first_element,
            num_elements,
            stride,
        } => check_buffer_range(resource, first_element, num_elements, stride),
    }
}

/// Checks a render-target view and fills in an unknown format.
pub(crate) fn resolve_rtv(
    resource: ViewedResource<'_>,
    desc: &RenderTargetViewDesc,
) -> Result<RenderTargetViewDesc, ResourceError> {
    if !resource.desc.flags.contains(ResourceFlags::ALLOW_RENDER_TARGET) {
        return Err(invalid_view(format!(
            "'{}' was not created with ALLOW_RENDER_TARGET",
            resource.label
        )));
    }
    check_texture_view(resource, desc.format, desc.mip_slice)?;
    let mut desc = *desc;
    if desc.format == Format::Unknown {
        desc.format = resource.desc.format;
    }
    Ok(desc)
}

/// Checks a depth-stencil view and fills in an unknown format.
pub(crate) fn resolve_dsv(
    resource: ViewedResource<'_>,
    desc: &DepthStencilViewDesc,
) -> Result<DepthStencilViewDesc, ResourceError> {
    if !resource.desc.flags.contains(ResourceFlags::ALLOW_DEPTH_STENCIL) {
        return Err(invalid_view(format!(
            "'{}' was not created with ALLOW_DEPTH_STENCIL",
            resource.label
        )));
    }
    let mut desc = *desc;
    if desc.format == Format::Unknown {
        desc.format = resource.desc.format;
    }
    if !desc.format.is_depth() {
        return Err(invalid_view(format!("{:?} is not a depth format", desc.format)));
    }
    check_texture_view(resource, desc.format, desc.mip_slice)?;
    Ok(desc)
}

/// Constant buffer views start and end on 256-byte boundaries.
pub(crate) fn check_cbv_alignment(desc: &ConstantBufferViewDesc) -> Result<(), ResourceError> {
    if desc.address % CONSTANT_BUFFER_ALIGNMENT != 0
        || u64::from(desc.size) % CONSTANT_BUFFER_ALIGNMENT != 0
    {
        return Err(invalid_view(format!(
            "constant buffer view at {:#x} of {} bytes is not 256-byte aligned",
            desc.address, desc.size
        )));
    }
    Ok(())
}

/// Checks that `slot` of `heap` exists and holds descriptors of type `ty`.
pub(crate) fn check_view_slot(
    heap: &DescriptorHeap,
    slot: u32,
    ty: DescriptorHeapType,
) -> Result<(), ResourceError> {
    if heap.ty != ty {
        return Err(invalid_view(format!(
            "a {ty:?} descriptor cannot live in a {:?} heap",
            heap.ty
        )));
    }
    if slot >= heap.capacity() {
        return Err(invalid_view(format!(
            "slot {slot} is past the end of a heap of {}",
            heap.capacity()
        )));
    }
    Ok(())
}

/// Checks a descriptor heap description.
pub(crate) fn check_heap_desc(desc: &DescriptorHeapDesc) -> Result<(), String> {
    if desc.capacity == 0 {
        return Err("empty descriptor heap".into());
    }
    if desc.shader_visible && desc.ty != DescriptorHeapType::CbvSrvUav {
        return Err(format!("{:?} heaps cannot be shader visible", desc.ty));
    }
    Ok(())
}

/// Checks the size, tables and samplers of a root signature.
pub(crate) fn check_root_signature(desc: &RootSignatureDesc) -> Result<(), PipelineError> {
    let dwords: u32 = desc
        .parameters
        .iter()
        .map(|p| match p {
            RootParameter::Constants { count, .. } => *count,
            RootParameter::Cbv { .. } | RootParameter::Srv { .. } | RootParameter::Uav { .. } => 2,
            RootParameter::DescriptorTable { .. } => 1,
        })
        .sum();
    if dwords > MAX_ROOT_DWORDS {
        return Err(PipelineError::InvalidRootSignature(format!(
            "'{}' uses {dwords} root DWORDs, the limit is {MAX_ROOT_DWORDS}",
            desc.label
        )));
    }
    if desc
        .parameters
        .iter()
        .any(|p| matches!(p, RootParameter::DescriptorTable { ranges } if ranges.is_empty()))
    {
        return Err(PipelineError::InvalidRootSignature(format!(
            "'{}' has an empty descriptor table",
            desc.label
        )));
    }
    for (i, sampler) in desc.static_samplers.iter().enumerate() {
        if desc.static_samplers[..i]
            .iter()
            .any(|other| other.register == sampler.register)
        {
            return Err(PipelineError::InvalidRootSignature(format!(
                "'{}' binds two samplers to s{}",
                desc.label, sampler.register
            )));
        }
    }
    Ok(())
}

/// Fails when `shader` was not compiled for `stage`.
pub(crate) fn check_stage(
    label: &str,
    shader: &ShaderSource,
    stage: ShaderStage,
) -> Result<(), PipelineError> {
    if shader.stage == stage {
        return Ok(());
    }
    Err(PipelineError::CompilationFailed {
        label: label.to_owned(),
        details: format!(
            "{}:{} is compiled as {} where {} is required",
            shader.path.display(),
            shader.entry_point,
            shader.stage.profile(),
            stage.profile()
        ),
    })
}

/// The root signature a program's shaders declare.
pub(crate) fn program_root_signature(program: &str) -> Option<RootSignatureDesc> {
    Some(match program {
        programs::VISIBILITY => bindings::visibility_root_signature(),
        programs::MATERIAL_RESOLVE => bindings::material_resolve_root_signature(),
        programs::CLUSTER_CULL => bindings::cluster_cull_root_signature(),
        programs::DEFERRED_LIGHTING => bindings::deferred_lighting_root_signature(),
        programs::MOTION_VECTORS => bindings::motion_vectors_root_signature(),
        programs::BRDF_LUT => bindings::brdf_lut_root_signature(),
        _ => return None,
    })
}

/// Fails when a program reads arguments `signature` does not declare, which
/// the compiler reports as a root signature mismatch.
pub(crate) fn check_layout(
    label: &str,
    program: &str,
    expected: Option<RootSignatureDesc>,
    signature: &RootSignatureDesc,
) -> Result<(), PipelineError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    if expected.parameters == signature.parameters
        && expected.flags == signature.flags
        && expected
            .static_samplers
            .iter()
            .all(|s| signature.static_samplers.contains(s))
    {
        return Ok(());
    }
    Err(PipelineError::CompilationFailed {
        label: label.to_owned(),
        details: format!(
            "root signature '{}' does not match the layout {program} was compiled against",
            signature.label
        ),
    })
}

/// Checks the fixed-function parts of a graphics pipeline.
pub(crate) fn check_graphics_desc(desc: &GraphicsPipelineDesc) -> Result<(), PipelineError> {
    check_stage(&desc.label, &desc.vertex_shader, ShaderStage::Vertex)?;
    if let Some(pixel) = &desc.pixel_shader {
        check_stage(&desc.label, pixel, ShaderStage::Pixel)?;
        if pixel.program_name() != desc.vertex_shader.program_name() {
            return Err(PipelineError::CompilationFailed {
                label: desc.label.clone(),
                details: "vertex and pixel stages come from different programs".into(),
            });
        }
    }
    if desc.render_target_formats.len() > 8 {
        return Err(PipelineError::CompilationFailed {
            label: desc.label.clone(),
            details: format!("{} render targets, at most 8", desc.render_target_formats.len()),
        });
    }
    if desc.depth.test && desc.depth_format.is_none() {
        return Err(PipelineError::CompilationFailed {
            label: desc.label.clone(),
            details: "depth test enabled without a depth format".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewed(desc: &ResourceDesc) -> ViewedResource<'_> {
        ViewedResource {
            id: ResourceId(7),
            label: "target",
            desc,
        }
    }

    #[test]
    fn test_textures_stay_in_the_default_heap() {
        let desc = ResourceDesc::texture_2d(4, 4, Format::Rgba8Unorm);
        assert!(validate_desc(HeapType::Default, &desc, ResourceStates::COMMON).is_ok());
        assert!(validate_desc(HeapType::Upload, &desc, ResourceStates::GENERIC_READ).is_err());
        let buffer = ResourceDesc::buffer(64);
        assert!(validate_desc(HeapType::Upload, &buffer, ResourceStates::COMMON).is_err());
        assert!(validate_desc(HeapType::Readback, &buffer, ResourceStates::COPY_DEST).is_ok());
    }

    #[test]
    fn test_depth_is_read_through_a_float_view() {
        let desc = ResourceDesc::texture_2d(4, 4, Format::R32Typeless)
            .with_flags(ResourceFlags::ALLOW_DEPTH_STENCIL);
        assert!(check_srv(viewed(&desc), &ShaderResourceViewDesc::texture_2d(Format::R32Float)).is_ok());
        assert!(check_srv(viewed(&desc), &ShaderResourceViewDesc::texture_2d(Format::D32Float)).is_err());
        let dsv = resolve_dsv(
            viewed(&desc),
            &DepthStencilViewDesc {
                format: Format::D32Float,
                mip_slice: 0,
                array_slice: 0,
            },
        );
        assert_eq!(dsv.map(|d| d.format), Ok(Format::D32Float));
    }

    #[test]
    fn test_buffer_views_stay_in_bounds() {
        let desc = ResourceDesc::buffer(256);
        assert!(check_buffer_range(viewed(&desc), 0, 64, 0).is_ok());
        assert!(matches!(
            check_buffer_range(viewed(&desc), 1, 4, 64),
            Err(ResourceError::OutOfBounds { size: 256, .. })
        ));
    }

    #[test]
    fn test_root_signature_limits() {
        let mut desc = RootSignatureDesc {
            label: "big".into(),
            parameters: vec![RootParameter::Constants {
                register: 0,
                count: MAX_ROOT_DWORDS + 1,
            }],
            static_samplers: Vec::new(),
            flags: RootSignatureFlags::EMPTY,
        };
        assert!(check_root_signature(&desc).is_err());
        desc.parameters = vec![RootParameter::Cbv { register: 0 }];
        desc.static_samplers = vec![StaticSampler::linear_wrap(0), StaticSampler::point_clamp(0)];
        assert!(check_root_signature(&desc).is_err());
        desc.static_samplers.pop();
        assert!(check_root_signature(&desc).is_ok());
    }
}
