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

//! The shader-visible descriptor heap as a bind group of binding arrays.

use std::collections::HashMap;
use std::sync::Arc;

use cortex_core::renderer::api::{ResourceDesc, ResourceFlags, ResourceId, ShaderResourceViewDesc};
use wgpu::util::DeviceExt;

use crate::graphics::descriptors::{Descriptor, DescriptorHeap};

use super::conversions::{is_filterable_color, storage_format};
use super::shaders::{
    heap_layout_entries, HEAP_BUFFER_CAPACITY, HEAP_TEXTURE_CAPACITY, SLOT_BUFFER, SLOT_NONE,
    SLOT_TEXTURE,
};
use super::state::{HeapGroup, Shared};

/// Where each heap slot lands in the binding arrays.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct HeapPlan {
    /// `(kind, array index, first word, word count)` per slot.
    pub slots: Vec<[u32; 4]>,
    /// Texture array entries from index 1 on.
    pub textures: Vec<(ResourceId, ShaderResourceViewDesc)>,
    /// Buffer array entries from index 1 on.
    pub buffers: Vec<ResourceId>,
    /// Slots that did not fit in the arrays.
    pub dropped: u32,
}

/// Sorts heap descriptors into the texture and buffer arrays. Textures that
/// can be written (render targets, UAVs, depth) stay out of the heap so a
/// pass never reads and writes the same texture through two bindings.
pub(crate) fn plan(
    descriptors: &[Option<Descriptor>],
    describe: impl Fn(ResourceId) -> Option<ResourceDesc>,
) -> HeapPlan {
    let mut plan = HeapPlan::default();
    let mut buffer_index: HashMap<ResourceId, u32> = HashMap::new();
    let writable = ResourceFlags::ALLOW_RENDER_TARGET
        | ResourceFlags::ALLOW_UNORDERED_ACCESS
        | ResourceFlags::ALLOW_DEPTH_STENCIL;

    for descriptor in descriptors {
        let mut entry = [SLOT_NONE, 0, 0, 0];
        if let Some(Descriptor::Srv { resource, desc }) = *descriptor {
            let resource_desc = describe(resource);
            match (desc, resource_desc) {
                (ShaderResourceViewDesc::Texture2D { .. }, Some(rd))
                    if !rd.is_buffer() && !rd.flags.intersects(writable) =>
                {
                    let filterable = storage_format(rd.format, rd.flags)
                        .is_some_and(is_filterable_color);
                    if filterable && (plan.textures.len() as u32) < HEAP_TEXTURE_CAPACITY - 1 {
                        plan.textures.push((resource, desc));
                        entry = [SLOT_TEXTURE, plan.textures.len() as u32, 0, 0];
                    } else if filterable {
                        plan.dropped += 1;
                    }
                }
                (
                    ShaderResourceViewDesc::Buffer {
                        first_element,
                        num_elements,
                        stride,
                    },
                    Some(rd),
                ) if rd.is_buffer() => {
                    let element = if stride == 0 { 4 } else { u64::from(stride) };
                    let index = match buffer_index.get(&resource) {
                        Some(index) => Some(*index),
                        None if (plan.buffers.len() as u32) < HEAP_BUFFER_CAPACITY - 1 => {
                            plan.buffers.push(resource);
                            let index = plan.buffers.len() as u32;
                            buffer_index.insert(resource, index);
                            Some(index)
                        }
                        None => None,
                    };
                    match index {
                        Some(index) => {
                            entry = [
                                SLOT_BUFFER,
                                index,
                                (first_element * element / 4) as u32,
                                (u64::from(num_elements) * element / 4) as u32,
                            ];
                        }
                        None => plan.dropped += 1,
                    }
                }
                _ => {}
            }
        }
        plan.slots.push(entry);
    }
    plan
}

/// The group 1 layout and the placeholders filling unused array entries.
#[derive(Debug)]
pub(crate) struct Bindless {
    pub layout: wgpu::BindGroupLayout,
    dummy_view: wgpu::TextureView,
    dummy_buffer: wgpu::Buffer,
}

impl Bindless {
    pub fn new(device: &wgpu::Device) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Descriptor Heap"),
            entries: &heap_layout_entries(),
        });
        let dummy = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Heap placeholder texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let dummy_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Heap placeholder buffer"),
            size: 16,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        Self {
            layout,
            dummy_view: dummy.create_view(&wgpu::TextureViewDescriptor::default()),
            dummy_buffer,
        }
    }

    /// The bind group for `heap`, rebuilt only when a slot was written since
    /// the last build.
    pub fn group(&self, shared: &Shared, heap: &DescriptorHeap) -> Result<Arc<wgpu::BindGroup>, String> {
        let generation = heap.generation();
        if let Some(cached) = shared.heap_groups.lock().get(&heap.id) {
            if cached.generation == generation {
                return Ok(cached.group.clone());
            }
        }

        let plan = plan(&heap.snapshot(), |id| shared.resource(id).map(|r| r.desc));
        if plan.dropped > 0 {
            shared.debug.warning(format!(
                "{} heap descriptors do not fit the bindless arrays ({HEAP_TEXTURE_CAPACITY} textures, {HEAP_BUFFER_CAPACITY} buffers)",
                plan.dropped
            ));
        }

        let mut views = Vec::with_capacity(plan.textures.len());
        for (id, desc) in &plan.textures {
            let resource = shared
                .resource(*id)
                .ok_or_else(|| format!("heap references destroyed resource {id:?}"))?;
            views.push(super::views::srv_view(&resource, desc)?);
        }
        let mut buffers = Vec::with_capacity(plan.buffers.len());
        for id in &plan.buffers {
            buffers.push(
                shared
                    .resource(*id)
                    .ok_or_else(|| format!("heap references destroyed resource {id:?}"))?,
            );
        }

        let texture_refs: Vec<&wgpu::TextureView> = std::iter::once(&self.dummy_view)
            .chain(views.iter())
            .chain(std::iter::repeat(&self.dummy_view))
            .take(HEAP_TEXTURE_CAPACITY as usize)
            .collect();
        let buffer_bindings: Vec<wgpu::BufferBinding<'_>> = std::iter::once(&self.dummy_buffer)
            .chain(buffers.iter().filter_map(|r| r.buffer()))
            .chain(std::iter::repeat(&self.dummy_buffer))
            .take(HEAP_BUFFER_CAPACITY as usize)
            .map(|buffer| wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: None,
            })
            .collect();
        let slots = if plan.slots.is_empty() {
            vec![[SLOT_NONE; 4]]
        } else {
            plan.slots
        };
        let slot_table = shared
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Heap slot table"),
                contents: bytemuck::cast_slice(&slots),
                usage: wgpu::BufferUsages::STORAGE,
            });

        let group = Arc::new(shared.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Descriptor Heap"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureViewArray(&texture_refs),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::BufferArray(&buffer_bindings),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: slot_table.as_entire_binding(),
                },
            ],
        }));
        log::trace!(
            "Rebuilt heap {:?} bind group: {} textures, {} buffers",
            heap.id,
            views.len(),
            buffers.len()
        );
        shared.heap_groups.lock().insert(
            heap.id,
            HeapGroup {
                generation,
                group: group.clone(),
            },
        );
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::renderer::api::Format;

    fn describe(id: ResourceId) -> Option<ResourceDesc> {
        match id.0 {
            1 => Some(ResourceDesc::texture_2d(4, 4, Format::Rgba8Unorm)),
            2 => Some(ResourceDesc::buffer(1024)),
            3 => Some(
                ResourceDesc::texture_2d(4, 4, Format::Rgba16Float)
                    .with_flags(ResourceFlags::ALLOW_UNORDERED_ACCESS),
            ),
            4 => Some(ResourceDesc::texture_2d(4, 4, Format::Rg32Uint)),
            _ => None,
        }
    }

    fn srv(resource: u64, desc: ShaderResourceViewDesc) -> Option<Descriptor> {
        Some(Descriptor::Srv {
            resource: ResourceId(resource),
            desc,
        })
    }

    #[test]
    fn test_textures_and_buffers_get_array_slots() {
        let descriptors = vec![
            None,
            srv(1, ShaderResourceViewDesc::texture_2d(Format::Rgba8Unorm)),
            srv(2, ShaderResourceViewDesc::Buffer {
                first_element: 4,
                num_elements: 8,
                stride: 16,
            }),
            srv(2, ShaderResourceViewDesc::raw_buffer(256)),
        ];
        let plan = plan(&descriptors, describe);
        assert_eq!(plan.slots[0], [SLOT_NONE, 0, 0, 0]);
        assert_eq!(plan.slots[1], [SLOT_TEXTURE, 1, 0, 0]);
        // Structured views are addressed in words from the buffer start.
        assert_eq!(plan.slots[2], [SLOT_BUFFER, 1, 16, 32]);
        // A second view of the same buffer shares its array entry.
        assert_eq!(plan.slots[3], [SLOT_BUFFER, 1, 0, 64]);
        assert_eq!(plan.buffers, vec![ResourceId(2)]);
    }

    #[test]
    fn test_writable_and_integer_textures_stay_out_of_the_heap() {
        let descriptors = vec![
            srv(3, ShaderResourceViewDesc::texture_2d(Format::Rgba16Float)),
            srv(4, ShaderResourceViewDesc::texture_2d(Format::Rg32Uint)),
            srv(99, ShaderResourceViewDesc::texture_2d(Format::Rgba8Unorm)),
        ];
        let plan = plan(&descriptors, describe);
        assert!(plan.slots.iter().all(|s| s[0] == SLOT_NONE));
        assert!(plan.textures.is_empty());
        assert_eq!(plan.dropped, 0);
    }

    #[test]
    fn test_overflow_is_counted() {
        let descriptors =
            vec![srv(1, ShaderResourceViewDesc::texture_2d(Format::Rgba8Unorm)); HEAP_TEXTURE_CAPACITY as usize];
        let plan = plan(&descriptors, describe);
        assert_eq!(plan.textures.len() as u32, HEAP_TEXTURE_CAPACITY - 1);
        assert_eq!(plan.dropped, 1);
        assert_eq!(plan.slots.last().map(|s| s[0]), Some(SLOT_NONE));
    }
}
