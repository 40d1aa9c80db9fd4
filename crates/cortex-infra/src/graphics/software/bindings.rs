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

//! What a kernel sees: root arguments resolved into typed resource views.
//!
//! Every accessor checks the binding the way the hardware and its debug layer
//! would. Unmapped addresses, empty descriptors and out-of-range reads are
//! [`Fault`]s; resources in the wrong state are validation errors.

use std::marker::PhantomData;
use std::mem::size_of;
use std::ops::Range;
use std::sync::Arc;

use bytemuck::{pod_read_unaligned, Pod};
use cortex_core::renderer::api::{
    Format, GpuDescriptorHandle, GpuVirtualAddress, ResourceStates, RootSignatureDesc,
    RootSignatureFlags, ShaderResourceViewDesc, StaticSampler, UnorderedAccessViewDesc,
};

use crate::graphics::descriptors::{
    Descriptor, DescriptorHeap, SlotAddress, DESCRIPTOR_INCREMENT,
};
use crate::graphics::recording::RootViewKind;

use super::memory::{Checkout, Resource, SubresourceLayout};
use super::state::Shared;
use crate::graphics::texel;
use super::validation::Fault;

/// A root argument as last set on a command list.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RootArg {
    Unset,
    Constants(Vec<u32>),
    View(RootViewKind, GpuVirtualAddress),
    Table(GpuDescriptorHandle),
}

/// Root arguments of one draw or dispatch.
pub(crate) struct Bindings<'a> {
    pub shared: &'a Shared,
    pub signature: &'a RootSignatureDesc,
    pub args: &'a [RootArg],
    pub heap: Option<Arc<DescriptorHeap>>,
    /// `PIXEL_SHADER_RESOURCE` for pixel work, `NON_PIXEL_SHADER_RESOURCE`
    /// for compute.
    pub read_state: ResourceStates,
    pub label: &'a str,
}

impl<'a> Bindings<'a> {
    fn arg(&self, parameter: u32) -> Result<&RootArg, Fault> {
        match self.args.get(parameter as usize) {
            Some(RootArg::Unset) | None => Err(Fault::new(format!(
                "'{}': root parameter {parameter} is not bound",
                self.label
            ))),
            Some(arg) => Ok(arg),
        }
    }

    fn mismatch(&self, parameter: u32, expected: &str) -> Fault {
        Fault::new(format!(
            "'{}': root parameter {parameter} is not {expected}",
            self.label
        ))
    }

    /// Reads root constants as `T`.
    pub fn constants<T: Pod>(&self, parameter: u32) -> Result<T, Fault> {
        match self.arg(parameter)? {
            RootArg::Constants(values) => {
                let bytes: &[u8] = bytemuck::cast_slice(values);
                bytes
                    .get(..size_of::<T>())
                    .map(pod_read_unaligned)
                    .ok_or_else(|| self.mismatch(parameter, "large enough for its constants"))
            }
            _ => Err(self.mismatch(parameter, "a constants parameter")),
        }
    }

    fn root_buffer(
        &self,
        parameter: u32,
        kind: RootViewKind,
    ) -> Result<(Arc<Resource>, usize), Fault> {
        match self.arg(parameter)? {
            RootArg::View(bound, address) if *bound == kind => {
                self.shared.resolve_address(*address).ok_or_else(|| {
                    Fault::new(format!(
                        "'{}': address {address:#x} of root parameter {parameter} is not mapped",
                        self.label
                    ))
                })
            }
            _ => Err(self.mismatch(parameter, &format!("a root {kind:?}"))),
        }
    }

    /// Reads the constant buffer bound at a root CBV.
    pub fn constant_buffer<T: Pod>(&self, parameter: u32) -> Result<T, Fault> {
        let (resource, offset) = self.root_buffer(parameter, RootViewKind::Cbv)?;
        self.expect_state(
            &resource,
            0..1,
            ResourceStates::VERTEX_AND_CONSTANT_BUFFER,
            "constant buffer",
        );
        let data = self.read(&resource)?;
        data.get(offset..offset + size_of::<T>())
            .map(pod_read_unaligned)
            .ok_or_else(|| self.overrun(&resource))
    }

    /// The structured buffer bound at a root SRV.
    pub fn structured<T: Pod>(&self, parameter: u32) -> Result<StructuredBuffer<T>, Fault> {
        let (resource, offset) = self.root_buffer(parameter, RootViewKind::Srv)?;
        self.expect_state(&resource, 0..1, self.read_state, "root SRV");
        let data = self.read(&resource)?;
        Ok(StructuredBuffer::new(
            data,
            offset,
            resource.size - offset,
            &resource.label,
        ))
    }

    /// The structured buffer bound at a root UAV.
    pub fn rw_structured<T: Pod>(&self, parameter: u32) -> Result<RwStructuredBuffer<T>, Fault> {
        let (resource, offset) = self.root_buffer(parameter, RootViewKind::Uav)?;
        self.expect_state(
            &resource,
            0..1,
            ResourceStates::UNORDERED_ACCESS,
            "root UAV",
        );
        let checkout = self.write(&resource)?;
        let count = (resource.size - offset) / size_of::<T>();
        Ok(RwStructuredBuffer {
            checkout,
            offset,
            count,
            _marker: PhantomData,
        })
    }

    /// The SRV at `index` of a descriptor table.
    pub fn texture(&self, parameter: u32, index: u32) -> Result<TextureView, Fault> {
        let descriptor = self.table_descriptor(parameter, index)?;
        self.texture_view(descriptor)
    }

    /// The UAV at `index` of a descriptor table.
    pub fn rw_texture(&self, parameter: u32, index: u32) -> Result<RwTexture, Fault> {
        let descriptor = self.table_descriptor(parameter, index)?;
        self.rw_texture_view(descriptor)
    }

    /// `ResourceDescriptorHeap[index]` as a texture.
    pub fn heap_texture(&self, index: u32) -> Result<TextureView, Fault> {
        let descriptor = self.heap_index(index)?;
        self.texture_view(descriptor)
    }

    /// `ResourceDescriptorHeap[index]` as a `ByteAddressBuffer`.
    pub fn heap_buffer(&self, index: u32) -> Result<RawBuffer, Fault> {
        let descriptor = self.heap_index(index)?;
        self.buffer_view(descriptor)
    }

    /// A static sampler of the root signature.
    pub fn sampler(&self, register: u32) -> Result<StaticSampler, Fault> {
        self.signature
            .static_samplers
            .iter()
            .find(|s| s.register == register)
            .copied()
            .ok_or_else(|| {
                Fault::new(format!("'{}': no static sampler s{register}", self.label))
            })
    }

    fn heap_index(&self, index: u32) -> Result<Descriptor, Fault> {
        if !self
            .signature
            .flags
            .contains(RootSignatureFlags::CBV_SRV_UAV_HEAP_DIRECTLY_INDEXED)
        {
            return Err(Fault::new(format!(
                "'{}': ResourceDescriptorHeap used without CBV_SRV_UAV_HEAP_DIRECTLY_INDEXED",
                self.label
            )));
        }
        let heap = self.bound_heap()?;
        self.slot(SlotAddress {
            heap: heap.id,
            slot: index,
        })
    }

    fn bound_heap(&self) -> Result<&Arc<DescriptorHeap>, Fault> {
        self.heap.as_ref().ok_or_else(|| {
            Fault::new(format!(
                "'{}': no shader-visible descriptor heap is bound",
                self.label
            ))
        })
    }

    fn slot(&self, address: SlotAddress) -> Result<Descriptor, Fault> {
        let heap = self.bound_heap()?;
        if address.heap != heap.id {
            return Err(Fault::new(format!(
                "'{}': descriptor points outside the bound heap",
                self.label
            )));
        }
        heap.read(address.slot).ok_or_else(|| {
            Fault::new(format!(
                "'{}': descriptor {} is empty or out of range",
                self.label, address.slot
            ))
        })
    }

    fn table_descriptor(&self, parameter: u32, index: u32) -> Result<Descriptor, Fault> {
        let RootArg::Table(base) = self.arg(parameter)? else {
            return Err(self.mismatch(parameter, "a descriptor table"));
        };
        let len = self
            .signature
            .parameters
            .get(parameter as usize)
            .map_or(0, |p| p.table_len());
        if index >= len {
            return Err(Fault::new(format!(
                "'{}': index {index} past the {len} descriptors of table {parameter}",
                self.label
            )));
        }
        let handle = base.offset(index, DESCRIPTOR_INCREMENT);
        let address = self.shared.gpu_slot(handle).ok_or_else(|| {
            Fault::new(format!("'{}': invalid GPU descriptor handle", self.label))
        })?;
        self.slot(address)
    }

    fn resource(&self, descriptor: &Descriptor) -> Result<Arc<Resource>, Fault> {
        let id = match descriptor {
            Descriptor::Srv { resource, .. }
            | Descriptor::Uav { resource, .. }
            | Descriptor::Rtv { resource, .. }
            | Descriptor::Dsv { resource, .. } => *resource,
            Descriptor::Cbv(_) => {
                return Err(Fault::new(format!(
                    "'{}': a CBV was read as a resource view",
                    self.label
                )))
            }
        };
        self.shared.resource(id).ok_or_else(|| {
            Fault::new(format!(
                "'{}': descriptor references destroyed resource {id:?}",
                self.label
            ))
        })
    }

    fn texture_view(&self, descriptor: Descriptor) -> Result<TextureView, Fault> {
        let resource = self.resource(&descriptor)?;
        let (format, first_mip, mip_levels, first_slice, slice_count) = match descriptor {
            Descriptor::Srv {
                desc:
                    ShaderResourceViewDesc::Texture2D {
                        format,
                        most_detailed_mip,
                        mip_levels,
                    },
                ..
            } => (format, most_detailed_mip, mip_levels, 0, 1),
            Descriptor::Srv {
                desc:
                    ShaderResourceViewDesc::Texture2DArray {
                        format,
                        most_detailed_mip,
                        mip_levels,
                        first_slice,
                        array_size,
                    },
                ..
            } => (format, most_detailed_mip, mip_levels, first_slice, array_size),
            _ => {
                return Err(Fault::new(format!(
                    "'{}': '{}' is not bound as a texture SRV",
                    self.label, resource.label
                )))
            }
        };
        let desc = resource.desc;
        if desc.is_buffer() || first_mip >= desc.mip_levels {
            return Err(Fault::new(format!(
                "'{}': invalid texture view of '{}'",
                self.label, resource.label
            )));
        }
        let mip_count = mip_levels.min(desc.mip_levels - first_mip);
        let slice_count = slice_count.min(desc.array_size.saturating_sub(first_slice));
        for slice in first_slice..first_slice + slice_count {
            let first = desc.subresource_index(first_mip, slice);
            self.expect_state(&resource, first..first + mip_count, self.read_state, "SRV");
        }
        let data = self.read(&resource)?;
        Ok(TextureView {
            data,
            layouts: resource.layouts.clone(),
            resource_mips: desc.mip_levels,
            format: if format == Format::Unknown {
                desc.format
            } else {
                format
            },
            first_mip,
            mip_count,
            first_slice,
            slice_count,
        })
    }

    fn buffer_view(&self, descriptor: Descriptor) -> Result<RawBuffer, Fault> {
        let resource = self.resource(&descriptor)?;
        let Descriptor::Srv {
            desc:
                ShaderResourceViewDesc::Buffer {
                    first_element,
                    num_elements,
                    stride,
                },
            ..
        } = descriptor
        else {
            return Err(Fault::new(format!(
                "'{}': '{}' is not bound as a buffer SRV",
                self.label, resource.label
            )));
        };
        let element = if stride == 0 { 4 } else { stride as usize };
        let offset = first_element as usize * element;
        let len = num_elements as usize * element;
        if offset + len > resource.size {
            return Err(self.overrun(&resource));
        }
        self.expect_state(&resource, 0..1, self.read_state, "buffer SRV");
        let data = self.read(&resource)?;
        Ok(RawBuffer { data, offset, len })
    }

    fn rw_texture_view(&self, descriptor: Descriptor) -> Result<RwTexture, Fault> {
        let resource = self.resource(&descriptor)?;
        let Descriptor::Uav {
            desc: UnorderedAccessViewDesc::Texture2D { format, mip_slice },
            ..
        } = descriptor
        else {
            return Err(Fault::new(format!(
                "'{}': '{}' is not bound as a texture UAV",
                self.label, resource.label
            )));
        };
        let desc = resource.desc;
        let subresource = desc.subresource_index(mip_slice, 0);
        let layout = *resource
            .layouts
            .get(subresource as usize)
            .ok_or_else(|| self.overrun(&resource))?;
        self.expect_state(
            &resource,
            subresource..subresource + 1,
            ResourceStates::UNORDERED_ACCESS,
            "UAV",
        );
        let checkout = self.write(&resource)?;
        Ok(RwTexture::new(
            checkout,
            layout,
            if format == Format::Unknown {
                desc.format
            } else {
                format
            },
        ))
    }

    fn read(&self, resource: &Arc<Resource>) -> Result<Arc<Vec<u8>>, Fault> {
        resource.snapshot().ok_or_else(|| {
            self.hazard(resource);
            Fault::new(format!(
                "'{}': '{}' is read and written by the same call",
                self.label, resource.label
            ))
        })
    }

    fn write(&self, resource: &Arc<Resource>) -> Result<Checkout, Fault> {
        resource.checkout().ok_or_else(|| {
            self.hazard(resource);
            Fault::new(format!(
                "'{}': '{}' is written twice by the same call",
                self.label, resource.label
            ))
        })
    }

    fn hazard(&self, resource: &Resource) {
        self.shared.debug.error(format!(
            "'{}': '{}' is bound for both reading and writing",
            self.label, resource.label
        ));
    }

    fn overrun(&self, resource: &Resource) -> Fault {
        Fault::new(format!(
            "'{}': read past the end of '{}'",
            self.label, resource.label
        ))
    }

    /// Reports a validation error when a subresource lacks `required`.
    pub fn expect_state(
        &self,
        resource: &Resource,
        subresources: Range<u32>,
        required: ResourceStates,
        what: &str,
    ) {
        if !self.shared.debug.enabled() {
            return;
        }
        let states = resource.states();
        for sub in subresources {
            let Some(state) = states.get(sub as usize) else {
                continue;
            };
            if !state.contains(required) {
                self.shared.debug.error(format!(
                    "'{}': '{}' subresource {sub} is bound as {what} in state {state:?}, which lacks {required:?}",
                    self.label, resource.label
                ));
                return;
            }
        }
    }
}

/// A read-only typed view over a buffer.
pub(crate) struct StructuredBuffer<T> {
    data: Arc<Vec<u8>>,
    offset: usize,
    count: usize,
    label: String,
    _marker: PhantomData<T>,
}

impl<T: Pod> StructuredBuffer<T> {
    fn new(data: Arc<Vec<u8>>, offset: usize, len: usize, label: &str) -> Self {
        Self {
            data,
            offset,
            count: len / size_of::<T>(),
            label: label.to_owned(),
            _marker: PhantomData,
        }
    }

    /// Element `index`; reading past the end of the buffer faults.
    pub fn get(&self, index: u32) -> Result<T, Fault> {
        let index = index as usize;
        if index >= self.count {
            return Err(Fault::new(format!(
                "element {index} read past the {} elements of '{}'",
                self.count, self.label
            )));
        }
        let start = self.offset + index * size_of::<T>();
        Ok(pod_read_unaligned(&self.data[start..start + size_of::<T>()]))
    }
}

/// A writable typed view over a buffer.
pub(crate) struct RwStructuredBuffer<T> {
    checkout: Checkout,
    offset: usize,
    count: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> RwStructuredBuffer<T> {
    pub fn set(&mut self, index: usize, value: T) -> Result<(), Fault> {
        if index >= self.count {
            return Err(Fault::new(format!(
                "element {index} written past the {} elements of '{}'",
                self.count,
                self.checkout.resource().label
            )));
        }
        let start = self.offset + index * size_of::<T>();
        self.checkout.bytes_mut()[start..start + size_of::<T>()]
            .copy_from_slice(bytemuck::bytes_of(&value));
        Ok(())
    }
}

/// A `ByteAddressBuffer`.
pub(crate) struct RawBuffer {
    data: Arc<Vec<u8>>,
    offset: usize,
    len: usize,
}

impl RawBuffer {
    /// Reads a `T` at a byte offset of the view.
    pub fn load<T: Pod>(&self, byte_offset: usize) -> Option<T> {
        let end = byte_offset.checked_add(size_of::<T>())?;
        if end > self.len {
            return None;
        }
        let start = self.offset + byte_offset;
        Some(pod_read_unaligned(&self.data[start..start + size_of::<T>()]))
    }
}

/// A read-only texture view.
pub(crate) struct TextureView {
    data: Arc<Vec<u8>>,
    layouts: Vec<SubresourceLayout>,
    resource_mips: u32,
    pub format: Format,
    first_mip: u32,
    mip_count: u32,
    first_slice: u32,
    slice_count: u32,
}

impl TextureView {
    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }

    pub fn slice_count(&self) -> u32 {
        self.slice_count
    }

    fn layout(&self, mip: u32, slice: u32) -> Option<&SubresourceLayout> {
        if mip >= self.mip_count || slice >= self.slice_count {
            return None;
        }
        let sub = (self.first_mip + mip) + (self.first_slice + slice) * self.resource_mips;
        self.layouts.get(sub as usize)
    }

    /// Size of view mip `mip`.
    pub fn size(&self, mip: u32) -> (u32, u32) {
        self.layout(mip, 0).map_or((0, 0), |l| (l.width, l.height))
    }

    fn texel(&self, x: i32, y: i32, mip: u32, slice: u32) -> Option<&[u8]> {
        let layout = self.layout(mip, slice)?;
        if x < 0 || y < 0 || x as u32 >= layout.width || y as u32 >= layout.height {
            return None;
        }
        let bpp = self.format.bytes_per_texel() as usize;
        let start = layout.texel_offset(x as u32, y as u32, bpp);
        self.data.get(start..start + bpp)
    }

    /// `Texture.Load`: out-of-range coordinates read zero.
    pub fn load(&self, x: i32, y: i32, mip: u32, slice: u32) -> [f32; 4] {
        self.texel(x, y, mip, slice)
            .map_or([0.0; 4], |t| texel::decode(self.format, t))
    }

    /// `Texture.Load` of an integer format.
    pub fn load_uint(&self, x: i32, y: i32, mip: u32, slice: u32) -> [u32; 4] {
        self.texel(x, y, mip, slice)
            .map_or([0; 4], |t| texel::decode_uint(self.format, t))
    }
}

/// A writable view of one texture subresource.
pub(crate) struct RwTexture {
    checkout: Checkout,
    layout: SubresourceLayout,
    format: Format,
    bpp: usize,
}

impl RwTexture {
    pub fn new(checkout: Checkout, layout: SubresourceLayout, format: Format) -> Self {
        Self {
            checkout,
            layout,
            format,
            bpp: format.bytes_per_texel() as usize,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.layout.width, self.layout.height)
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn resource(&self) -> &Arc<Resource> {
        self.checkout.resource()
    }

    fn range(&self, x: u32, y: u32) -> Option<Range<usize>> {
        if x >= self.layout.width || y >= self.layout.height {
            return None;
        }
        let start = self.layout.texel_offset(x, y, self.bpp);
        Some(start..start + self.bpp)
    }

    /// Writes are dropped outside the subresource, like UAV stores.
    pub fn store(&mut self, x: u32, y: u32, value: [f32; 4]) {
        if let Some(range) = self.range(x, y) {
            texel::encode(self.format, value, &mut self.checkout.bytes_mut()[range]);
        }
    }

    pub fn store_uint(&mut self, x: u32, y: u32, value: [u32; 4]) {
        if let Some(range) = self.range(x, y) {
            texel::encode_uint(self.format, value, &mut self.checkout.bytes_mut()[range]);
        }
    }

    pub fn load(&self, x: u32, y: u32) -> [f32; 4] {
        self.range(x, y)
            .map_or([0.0; 4], |r| texel::decode(self.format, &self.checkout.bytes()[r]))
    }

    /// Fills the whole subresource with one value.
    pub fn fill(&mut self, value: [f32; 4]) {
        let mut texel = vec![0u8; self.bpp];
        texel::encode(self.format, value, &mut texel);
        self.fill_bytes(&texel);
    }

    /// Fills the whole subresource with one integer value.
    pub fn fill_uint(&mut self, value: [u32; 4]) {
        let mut texel = vec![0u8; self.bpp];
        texel::encode_uint(self.format, value, &mut texel);
        self.fill_bytes(&texel);
    }

    fn fill_bytes(&mut self, texel: &[u8]) {
        if texel.is_empty() {
            return;
        }
        let range = self.layout.offset..self.layout.offset + self.layout.len();
        for chunk in self.checkout.bytes_mut()[range].chunks_exact_mut(texel.len()) {
            chunk.copy_from_slice(texel);
        }
    }
}
