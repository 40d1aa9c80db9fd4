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

//! Texture views built from descriptors when a command binds them.
//!
//! Views inherit the texture's format: descriptor formats were validated
//! against the resource when the descriptor was written.

use cortex_core::renderer::api::{
    DepthStencilViewDesc, RenderTargetViewDesc, ShaderResourceViewDesc, UnorderedAccessViewDesc,
};

use super::state::Resource;

fn texture(resource: &Resource) -> Result<(&wgpu::Texture, wgpu::TextureFormat), String> {
    resource
        .texture()
        .ok_or_else(|| format!("'{}' is a buffer where a texture view was expected", resource.label))
}

pub(crate) fn aspect(format: wgpu::TextureFormat) -> wgpu::TextureAspect {
    if format.is_depth_stencil_format() {
        wgpu::TextureAspect::DepthOnly
    } else {
        wgpu::TextureAspect::All
    }
}

fn mip_count(levels: u32) -> Option<u32> {
    (levels != u32::MAX).then_some(levels)
}

fn view(
    resource: &Resource,
    dimension: wgpu::TextureViewDimension,
    mips: (u32, Option<u32>),
    layers: (u32, Option<u32>),
) -> Result<wgpu::TextureView, String> {
    let (texture, format) = texture(resource)?;
    Ok(texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(&resource.label),
        format: None,
        dimension: Some(dimension),
        aspect: aspect(format),
        base_mip_level: mips.0,
        mip_level_count: mips.1,
        base_array_layer: layers.0,
        array_layer_count: layers.1,
        usage: None,
    }))
}

pub(crate) fn srv_view(
    resource: &Resource,
    desc: &ShaderResourceViewDesc,
) -> Result<wgpu::TextureView, String> {
    match *desc {
        ShaderResourceViewDesc::Texture2D {
            most_detailed_mip,
            mip_levels,
            ..
        } => view(
            resource,
            wgpu::TextureViewDimension::D2,
            (most_detailed_mip, mip_count(mip_levels)),
            (0, Some(1)),
        ),
        ShaderResourceViewDesc::Texture2DArray {
            most_detailed_mip,
            mip_levels,
            first_slice,
            array_size,
            ..
        } => view(
            resource,
            wgpu::TextureViewDimension::D2Array,
            (most_detailed_mip, mip_count(mip_levels)),
            (first_slice, Some(array_size)),
        ),
        ShaderResourceViewDesc::Buffer { .. } => Err(format!(
            "buffer view of '{}' bound where a texture was expected",
            resource.label
        )),
    }
}

pub(crate) fn uav_view(
    resource: &Resource,
    desc: &UnorderedAccessViewDesc,
) -> Result<wgpu::TextureView, String> {
    match *desc {
        UnorderedAccessViewDesc::Texture2D { mip_slice, .. } => view(
            resource,
            wgpu::TextureViewDimension::D2,
            (mip_slice, Some(1)),
            (0, Some(1)),
        ),
        UnorderedAccessViewDesc::Buffer { .. } => Err(format!(
            "buffer UAV of '{}' bound where a storage texture was expected",
            resource.label
        )),
    }
}

pub(crate) fn rtv_view(
    resource: &Resource,
    desc: &RenderTargetViewDesc,
) -> Result<wgpu::TextureView, String> {
    view(
        resource,
        wgpu::TextureViewDimension::D2,
        (desc.mip_slice, Some(1)),
        (desc.array_slice, Some(1)),
    )
}

pub(crate) fn dsv_view(
    resource: &Resource,
    desc: &DepthStencilViewDesc,
) -> Result<wgpu::TextureView, String> {
    view(
        resource,
        wgpu::TextureViewDimension::D2,
        (desc.mip_slice, Some(1)),
        (desc.array_slice, Some(1)),
    )
}
