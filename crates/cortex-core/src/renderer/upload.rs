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

//! Staging uploads, readbacks and persistently mapped upload buffers.

use std::marker::PhantomData;
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::Mutex;

use super::api::{
    GpuVirtualAddress, HeapType, ResourceBarrier, ResourceDesc, ResourceId, ResourceStates,
    ShaderResourceViewDesc, TextureCopyLocation,
};
use super::bindless::{BindlessRegistry, BindlessSlot};
use super::device::CommandQueue;
use super::error::{DeviceError, RenderError, ResourceError, UploadError};
use super::traits::{CommandList, GpuDevice};
use crate::utils::align_up;

/// Copies CPU data into default-heap resources and reads them back.
///
/// Every operation records its own command list, submits it to the queue,
/// signals and blocks until the GPU is done before the staging buffer is
/// released. Operations are serialized, so any thread may upload.
#[derive(Debug)]
pub struct Uploader {
    device: Arc<dyn GpuDevice>,
    queue: Arc<CommandQueue>,
    lock: Mutex<()>,
}

/// Destroys a staging resource when the operation ends, on every path.
struct Staging<'a> {
    device: &'a dyn GpuDevice,
    resource: ResourceId,
}

impl Drop for Staging<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.device.destroy_resource(self.resource) {
            log::warn!("Failed to release staging buffer: {err}");
        }
    }
}

impl Uploader {
    /// Creates an uploader submitting to `queue`.
    pub fn new(device: Arc<dyn GpuDevice>, queue: Arc<CommandQueue>) -> Self {
        Self {
            device,
            queue,
            lock: Mutex::new(()),
        }
    }

    /// The device uploads go to.
    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    fn staging(&self, heap: HeapType, size: u64, label: &str) -> Result<Staging<'_>, UploadError> {
        let initial = match heap {
            HeapType::Readback => ResourceStates::COPY_DEST,
            _ => ResourceStates::GENERIC_READ,
        };
        let resource = self.device.create_committed_resource(
            heap,
            &ResourceDesc::buffer(size.max(1)),
            initial,
            None,
            label,
        )?;
        Ok(Staging {
            device: self.device.as_ref(),
            resource,
        })
    }

    /// Closes, submits and waits for `cmd`.
    fn submit_and_wait(&self, cmd: Box<dyn CommandList>) -> Result<(), UploadError> {
        let list = cmd.close()?;
        self.queue.execute_command_lists(&[list])?;
        let value = self.queue.signal()?;
        self.queue.wait_cpu(value)?;
        Ok(())
    }

    /// Creates a default-heap buffer holding `data`, left in `final_state`.
    pub fn upload_buffer(
        &self,
        data: &[u8],
        final_state: ResourceStates,
        label: &str,
    ) -> Result<ResourceId, UploadError> {
        let size = data.len() as u64;
        let resource = self.device.create_committed_resource(
            HeapType::Default,
            &ResourceDesc::buffer(size.max(1)),
            ResourceStates::COPY_DEST,
            None,
            label,
        )?;
        if let Err(err) = self.write_buffer(resource, data, final_state) {
            let _ = self.device.destroy_resource(resource);
            return Err(err);
        }
        Ok(resource)
    }

    fn write_buffer(
        &self,
        resource: ResourceId,
        data: &[u8],
        final_state: ResourceStates,
    ) -> Result<(), UploadError> {
        let _guard = self.lock.lock();
        let staging = self.staging(HeapType::Upload, data.len() as u64, "Upload staging")?;
        self.device.write_mapped(staging.resource, 0, data)?;

        let mut cmd = self.device.create_command_list(self.queue.queue_type())?;
        if !data.is_empty() {
            cmd.copy_buffer_region(resource, 0, staging.resource, 0, data.len() as u64);
        }
        if final_state != ResourceStates::COPY_DEST {
            cmd.resource_barrier(&[ResourceBarrier::transition(
                resource,
                ResourceStates::COPY_DEST,
                final_state,
            )]);
        }
        self.submit_and_wait(cmd)
    }

    /// Creates a default-heap 2D texture from tightly packed subresource
    /// data (one slice per subresource, mip-major), left in `final_state`.
    pub fn upload_texture_2d(
        &self,
        desc: &ResourceDesc,
        subresources: &[&[u8]],
        final_state: ResourceStates,
        label: &str,
    ) -> Result<ResourceId, UploadError> {
        let count = desc.subresource_count();
        let footprints = self.device.copyable_footprints(desc, 0, count, 0);
        for i in 0..count as usize {
            let expected = u64::from(footprints.num_rows[i]) * footprints.row_size_in_bytes[i];
            let actual = subresources.get(i).map_or(0, |d| d.len() as u64);
            if expected != actual {
                return Err(UploadError::FootprintMismatch {
                    subresource: i as u32,
                    expected,
                    actual,
                });
            }
        }
        if subresources.len() > count as usize {
            return Err(UploadError::FootprintMismatch {
                subresource: count,
                expected: 0,
                actual: subresources[count as usize].len() as u64,
            });
        }

        let resource = self.device.create_committed_resource(
            HeapType::Default,
            desc,
            ResourceStates::COPY_DEST,
            None,
            label,
        )?;
        let result = (|| -> Result<(), UploadError> {
            let _guard = self.lock.lock();
            let staging = self.staging(HeapType::Upload, footprints.total_bytes, "Texture staging")?;

            let mut image = vec![0u8; footprints.total_bytes as usize];
            for (i, data) in subresources.iter().enumerate() {
                let layout = footprints.layouts[i];
                let row_size = footprints.row_size_in_bytes[i] as usize;
                for row in 0..footprints.num_rows[i] as usize {
                    let dst = layout.offset as usize + row * layout.row_pitch as usize;
                    image[dst..dst + row_size]
                        .copy_from_slice(&data[row * row_size..(row + 1) * row_size]);
                }
            }
            self.device.write_mapped(staging.resource, 0, &image)?;

            let mut cmd = self.device.create_command_list(self.queue.queue_type())?;
            for (i, layout) in footprints.layouts.iter().enumerate() {
                cmd.copy_texture_region(
                    TextureCopyLocation::Subresource {
                        resource,
                        index: i as u32,
                    },
                    TextureCopyLocation::Footprint {
                        resource: staging.resource,
                        footprint: *layout,
                    },
                );
            }
            if final_state != ResourceStates::COPY_DEST {
                cmd.resource_barrier(&[ResourceBarrier::transition(
                    resource,
                    ResourceStates::COPY_DEST,
                    final_state,
                )]);
            }
            self.submit_and_wait(cmd)
        })();
        if let Err(err) = result {
            let _ = self.device.destroy_resource(resource);
            return Err(err);
        }
        Ok(resource)
    }

    /// Copies one subresource of a texture to the CPU, returning tightly
    /// packed rows. The texture is returned to `current_state`.
    pub fn readback_texture(
        &self,
        resource: ResourceId,
        subresource: u32,
        current_state: ResourceStates,
    ) -> Result<Vec<u8>, UploadError> {
        let desc = self.device.resource_desc(resource)?;
        let footprints = self.device.copyable_footprints(&desc, subresource, 1, 0);
        let layout = footprints.layouts[0];
        let row_size = footprints.row_size_in_bytes[0] as usize;
        let rows = footprints.num_rows[0] as usize;

        let _guard = self.lock.lock();
        let staging = self.staging(HeapType::Readback, footprints.total_bytes, "Readback")?;
        let mut cmd = self.device.create_command_list(self.queue.queue_type())?;
        let needs_transition = !current_state.contains(ResourceStates::COPY_SOURCE);
        if needs_transition {
            cmd.resource_barrier(&[ResourceBarrier::Transition {
                resource,
                subresource,
                before: current_state,
                after: ResourceStates::COPY_SOURCE,
            }]);
        }
        cmd.copy_texture_region(
            TextureCopyLocation::Footprint {
                resource: staging.resource,
                footprint: layout,
            },
            TextureCopyLocation::Subresource {
                resource,
                index: subresource,
            },
        );
        if needs_transition {
            cmd.resource_barrier(&[ResourceBarrier::Transition {
                resource,
                subresource,
                before: ResourceStates::COPY_SOURCE,
                after: current_state,
            }]);
        }
        self.submit_and_wait(cmd)?;

        let mut raw = vec![0u8; footprints.total_bytes as usize];
        self.device.read_mapped(staging.resource, 0, &mut raw)?;
        let mut packed = Vec::with_capacity(rows * row_size);
        for row in 0..rows {
            let src = layout.offset as usize + row * layout.row_pitch as usize;
            packed.extend_from_slice(&raw[src..src + row_size]);
        }
        Ok(packed)
    }

    /// Copies a whole buffer to the CPU. The buffer is returned to
    /// `current_state`.
    pub fn readback_buffer(
        &self,
        resource: ResourceId,
        current_state: ResourceStates,
    ) -> Result<Vec<u8>, UploadError> {
        let desc = self.device.resource_desc(resource)?;
        let size = desc.width;

        let _guard = self.lock.lock();
        let staging = self.staging(HeapType::Readback, size, "Readback")?;
        let mut cmd = self.device.create_command_list(self.queue.queue_type())?;
        let needs_transition = !current_state.contains(ResourceStates::COPY_SOURCE);
        if needs_transition {
            cmd.resource_barrier(&[ResourceBarrier::transition(
                resource,
                current_state,
                ResourceStates::COPY_SOURCE,
            )]);
        }
        cmd.copy_buffer_region(staging.resource, 0, resource, 0, size);
        if needs_transition {
            cmd.resource_barrier(&[ResourceBarrier::transition(
                resource,
                ResourceStates::COPY_SOURCE,
                current_state,
            )]);
        }
        self.submit_and_wait(cmd)?;

        let mut out = vec![0u8; size as usize];
        self.device.read_mapped(staging.resource, 0, &mut out)?;
        Ok(out)
    }

    /// Creates a persistently mapped upload-heap buffer.
    pub fn create_mapped_buffer(&self, size: u64, label: &str) -> Result<MappedBuffer, UploadError> {
        Ok(MappedBuffer::new(self.device.clone(), size, label)?)
    }
}

/// An upload-heap buffer the CPU writes and the GPU reads in place.
///
/// It stays in `GENERIC_READ` for its whole life and is never transitioned.
#[derive(Debug)]
pub struct MappedBuffer {
    device: Arc<dyn GpuDevice>,
    resource: ResourceId,
    size: u64,
    address: GpuVirtualAddress,
}

impl MappedBuffer {
    /// Creates a mapped buffer of `size` bytes.
    pub fn new(device: Arc<dyn GpuDevice>, size: u64, label: &str) -> Result<Self, ResourceError> {
        let resource = device.create_committed_resource(
            HeapType::Upload,
            &ResourceDesc::buffer(size.max(1)),
            ResourceStates::GENERIC_READ,
            None,
            label,
        )?;
        let address = device.gpu_virtual_address(resource)?;
        Ok(Self {
            device,
            resource,
            size: size.max(1),
            address,
        })
    }

    /// The buffer resource.
    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// GPU address of byte 0.
    pub fn gpu_address(&self) -> GpuVirtualAddress {
        self.address
    }

    /// Writes raw bytes at `offset`.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        self.device.write_mapped(self.resource, offset, data)
    }

    /// Writes plain-old-data records at `offset`.
    pub fn write_pod<T: Pod>(&self, offset: u64, records: &[T]) -> Result<(), ResourceError> {
        self.write(offset, bytemuck::cast_slice(records))
    }
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        if let Err(err) = self.device.destroy_resource(self.resource) {
            log::warn!("Failed to release mapped buffer: {err}");
        }
    }
}

/// A per-frame table of `T` records in a mapped buffer, with one region and
/// one bindless structured-buffer SRV per frame in flight.
///
/// Writing more records than the capacity grows the table: the GPU is flushed
/// first, a new buffer gets fresh SRVs, and the old slots are released.
#[derive(Debug)]
pub struct MappedTable<T: Pod> {
    label: &'static str,
    registry: Arc<BindlessRegistry>,
    frames: u32,
    capacity: u32,
    buffer: MappedBuffer,
    srvs: Vec<BindlessSlot>,
    len: u32,
    growths: u32,
    _marker: PhantomData<T>,
}

impl<T: Pod> MappedTable<T> {
    const STRIDE: u32 = std::mem::size_of::<T>() as u32;

    /// Creates a table able to hold `capacity` records per frame.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        registry: Arc<BindlessRegistry>,
        label: &'static str,
        capacity: u32,
        frames_in_flight: u32,
    ) -> Result<Self, RenderError> {
        let frames = frames_in_flight.max(1);
        let capacity = capacity.max(1);
        let (buffer, srvs) = Self::allocate(&device, &registry, label, capacity, frames)?;
        Ok(Self {
            label,
            registry,
            frames,
            capacity,
            buffer,
            srvs,
            len: 0,
            growths: 0,
            _marker: PhantomData,
        })
    }

    fn allocate(
        device: &Arc<dyn GpuDevice>,
        registry: &Arc<BindlessRegistry>,
        label: &str,
        capacity: u32,
        frames: u32,
    ) -> Result<(MappedBuffer, Vec<BindlessSlot>), RenderError> {
        let region = u64::from(capacity) * u64::from(Self::STRIDE);
        let buffer = MappedBuffer::new(device.clone(), region * u64::from(frames), label)?;
        let srvs = (0..frames)
            .map(|frame| {
                registry.register_buffer(
                    buffer.resource(),
                    &ShaderResourceViewDesc::Buffer {
                        first_element: u64::from(frame) * u64::from(capacity),
                        num_elements: capacity,
                        stride: Self::STRIDE,
                    },
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((buffer, srvs))
    }

    /// Writes this frame's records, growing the table first when they do
    /// not fit. `flush` must drain the GPU. Returns `true` when it grew.
    pub fn write(
        &mut self,
        frame_slot: u32,
        records: &[T],
        flush: &dyn Fn() -> Result<(), DeviceError>,
    ) -> Result<bool, RenderError> {
        let needed = records.len() as u32;
        let mut grew = false;
        if needed > self.capacity {
            let capacity = needed.max(self.capacity.saturating_mul(2)).next_power_of_two();
            log::warn!(
                "Growing {} table from {} to {} records",
                self.label,
                self.capacity,
                capacity
            );
            flush()?;
            let device = self.buffer.device.clone();
            let (buffer, srvs) = Self::allocate(
                &device,
                &self.registry,
                self.label,
                capacity,
                self.frames,
            )?;
            // Old slots are released on drop; the flush has retired their readers.
            self.srvs = srvs;
            self.buffer = buffer;
            self.capacity = capacity;
            self.growths += 1;
            grew = true;
        }
        self.buffer.write_pod(self.region_offset(frame_slot), records)?;
        self.len = needed;
        Ok(grew)
    }

    fn region_offset(&self, frame_slot: u32) -> u64 {
        u64::from(frame_slot % self.frames) * u64::from(self.capacity) * u64::from(Self::STRIDE)
    }

    /// GPU address of the first record of a frame slot, for root SRVs.
    pub fn gpu_address(&self, frame_slot: u32) -> GpuVirtualAddress {
        self.buffer.gpu_address() + self.region_offset(frame_slot)
    }

    /// Bindless SRV index of a frame slot.
    pub fn srv_index(&self, frame_slot: u32) -> u32 {
        self.srvs[(frame_slot % self.frames) as usize].index()
    }

    /// The buffer resource.
    pub fn resource(&self) -> ResourceId {
        self.buffer.resource()
    }

    /// Records each frame slot can hold.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Records written by the last [`MappedTable::write`].
    pub fn len(&self) -> u32 {
        self.len
    }

    /// `true` when the last write was empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Times the table has grown.
    pub fn growths(&self) -> u32 {
        self.growths
    }
}

/// A per-frame constant block in a mapped buffer, each frame slot aligned for
/// root constant buffer views.
#[derive(Debug)]
pub struct ConstantBuffer<T: Pod> {
    buffer: MappedBuffer,
    slot_size: u64,
    frames: u32,
    _marker: PhantomData<T>,
}

/// Required alignment of constant buffer addresses.
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

impl<T: Pod> ConstantBuffer<T> {
    /// Creates one aligned slot per frame in flight.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        label: &str,
        frames_in_flight: u32,
    ) -> Result<Self, ResourceError> {
        let frames = frames_in_flight.max(1);
        let slot_size = align_up(std::mem::size_of::<T>() as u64, CONSTANT_BUFFER_ALIGNMENT);
        let buffer = MappedBuffer::new(device, slot_size * u64::from(frames), label)?;
        Ok(Self {
            buffer,
            slot_size,
            frames,
            _marker: PhantomData,
        })
    }

    /// Writes the constants of a frame slot and returns their GPU address.
    pub fn write(&self, frame_slot: u32, value: &T) -> Result<GpuVirtualAddress, ResourceError> {
        let offset = u64::from(frame_slot % self.frames) * self.slot_size;
        self.buffer.write(offset, bytemuck::bytes_of(value))?;
        Ok(self.buffer.gpu_address() + offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use crate::renderer::api::{Format, QueueType};
    use crate::renderer::descriptors::DescriptorHeapManager;
    use crate::renderer::mock::{MockCommand, MockDevice};

    fn uploader() -> (Arc<MockDevice>, Uploader) {
        let mock = MockDevice::new();
        let device: Arc<dyn GpuDevice> = mock.clone();
        let queue = Arc::new(CommandQueue::new(device.clone(), QueueType::Graphics).unwrap());
        (mock, Uploader::new(device, queue))
    }

    #[test]
    fn test_buffer_upload_copies_then_transitions() {
        let (mock, up) = uploader();
        let buffer = up
            .upload_buffer(&[1, 2, 3, 4], ResourceStates::ALL_SHADER_RESOURCE, "Data")
            .unwrap();
        let executed = mock.executed();
        assert_eq!(executed.len(), 1);
        assert!(matches!(executed[0][0], MockCommand::CopyBuffer { dest, size: 4, .. } if dest == buffer));
        assert_eq!(
            executed[0][1],
            MockCommand::Barrier(ResourceBarrier::transition(
                buffer,
                ResourceStates::COPY_DEST,
                ResourceStates::ALL_SHADER_RESOURCE
            ))
        );
        // The staging buffer is gone, the destination remains.
        assert_eq!(mock.live_resources(), 1);
    }

    #[test]
    fn test_texture_footprint_mismatch_aborts() {
        let (mock, up) = uploader();
        let desc = ResourceDesc::texture_2d(4, 4, Format::Rgba8Unorm);
        let err = up
            .upload_texture_2d(&desc, &[&[0u8; 60]], ResourceStates::ALL_SHADER_RESOURCE, "Tex")
            .unwrap_err();
        assert_eq!(
            err,
            UploadError::FootprintMismatch {
                subresource: 0,
                expected: 64,
                actual: 60
            }
        );
        assert_eq!(mock.live_resources(), 0);
        assert!(mock.executed().is_empty());
    }

    #[test]
    fn test_texture_upload_one_copy_per_subresource() {
        let (mock, up) = uploader();
        let desc = ResourceDesc::texture_2d(4, 4, Format::Rgba8Unorm).with_mips(3);
        let mips: [&[u8]; 3] = [&[0u8; 64], &[0u8; 16], &[0u8; 4]];
        up.upload_texture_2d(&desc, &mips, ResourceStates::ALL_SHADER_RESOURCE, "Tex")
            .unwrap();
        let executed = mock.executed();
        let copies = executed[0]
            .iter()
            .filter(|c| **c == MockCommand::CopyTexture)
            .count();
        assert_eq!(copies, 3);
    }

    #[test]
    fn test_table_growth_flushes_and_reregisters() {
        let mock = MockDevice::new();
        let device: Arc<dyn GpuDevice> = mock.clone();
        let mut config = RendererConfig::default();
        config.bindless.max_textures = 8;
        config.bindless.max_buffers = 8;
        let descriptors = DescriptorHeapManager::new(&device, &config).unwrap();
        let registry = BindlessRegistry::new(device.clone(), descriptors.bindless_region());
        let mut table: MappedTable<[f32; 4]> =
            MappedTable::new(device, registry.clone(), "Test", 2, 2).unwrap();
        let first_srv = table.srv_index(0);
        assert_eq!(registry.stats().live_buffers, 2);

        let flushed = std::cell::Cell::new(0);
        let flush = || -> Result<(), DeviceError> {
            flushed.set(flushed.get() + 1);
            Ok(())
        };
        assert!(!table.write(0, &[[1.0; 4]; 2], &flush).unwrap());
        assert!(table.write(1, &[[1.0; 4]; 3], &flush).unwrap());
        assert_eq!(flushed.get(), 1);
        assert_eq!(table.capacity(), 4);
        assert_eq!(table.growths(), 1);
        assert_ne!(table.srv_index(0), first_srv);
        assert_eq!(registry.stats().pending_releases, 2);
        assert_eq!(table.gpu_address(1) - table.gpu_address(0), 4 * 16);
    }
}
