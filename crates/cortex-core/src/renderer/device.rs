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

//! Adapter selection, the device wrapper and fenced command queues.

use std::sync::Arc;

use parking_lot::Mutex;

use super::api::{AdapterInfo, CommandListId, DeviceOptions, FenceId, QueueId, QueueType};
use super::error::DeviceError;
use super::traits::{GpuBackend, GpuDevice};
use crate::config::{DeviceConfig, RendererConfig};

/// Picks the first hardware adapter, in high-performance order.
///
/// A software adapter is only chosen when the system has no hardware adapter
/// and `allow_software_adapter` is set.
pub fn select_adapter(
    backend: &dyn GpuBackend,
    config: &DeviceConfig,
) -> Result<AdapterInfo, DeviceError> {
    let adapters = backend.enumerate_adapters();
    if let Some(hardware) = adapters.iter().find(|adapter| !adapter.is_software) {
        return Ok(hardware.clone());
    }
    if !config.allow_software_adapter {
        for adapter in &adapters {
            log::debug!("Skipping software adapter '{}'", adapter.name);
        }
        return Err(DeviceError::NoCompatibleAdapter);
    }
    adapters
        .into_iter()
        .next()
        .ok_or(DeviceError::NoCompatibleAdapter)
}

/// Signal bookkeeping of a queue. Held while the signal is scheduled so
/// values reach the device in increasing order.
#[derive(Debug)]
struct FenceCounter {
    next_value: u64,
    last_signaled: u64,
}

/// A command queue paired with its own fence.
#[derive(Debug)]
pub struct CommandQueue {
    device: Arc<dyn GpuDevice>,
    queue: QueueId,
    fence: FenceId,
    ty: QueueType,
    counter: Mutex<FenceCounter>,
}

impl CommandQueue {
    /// Creates a queue of type `ty` and a fence starting at 0.
    pub fn new(device: Arc<dyn GpuDevice>, ty: QueueType) -> Result<Self, DeviceError> {
        let queue = device.create_command_queue(ty)?;
        let fence = device.create_fence(0)?;
        Ok(Self {
            device,
            queue,
            fence,
            ty,
            counter: Mutex::new(FenceCounter {
                next_value: 1,
                last_signaled: 0,
            }),
        })
    }

    /// The queue handle.
    pub fn id(&self) -> QueueId {
        self.queue
    }

    /// The queue's fence.
    pub fn fence(&self) -> FenceId {
        self.fence
    }

    /// The queue family.
    pub fn queue_type(&self) -> QueueType {
        self.ty
    }

    /// Submits closed command lists in order.
    pub fn execute_command_lists(&self, lists: &[CommandListId]) -> Result<(), DeviceError> {
        if lists.is_empty() {
            return Ok(());
        }
        self.device.execute_command_lists(self.queue, lists)
    }

    /// Schedules the next fence value after all prior submissions and returns it.
    pub fn signal(&self) -> Result<u64, DeviceError> {
        let mut counter = self.counter.lock();
        let value = counter.next_value;
        self.device.queue_signal(self.queue, self.fence, value)?;
        counter.next_value += 1;
        counter.last_signaled = value;
        Ok(value)
    }

    /// Blocks until the fence reports at least `value`.
    pub fn wait_cpu(&self, value: u64) -> Result<(), DeviceError> {
        if self.is_fence_complete(value)? {
            return Ok(());
        }
        self.device.wait_for_fence(self.fence, value)
    }

    /// Makes this queue wait on the GPU until `other`'s fence reaches `value`.
    pub fn wait_gpu(&self, other: &CommandQueue, value: u64) -> Result<(), DeviceError> {
        self.device.queue_wait(self.queue, other.fence, value)
    }

    /// Signals and waits for the signal on the CPU. Returns the signaled value.
    pub fn flush(&self) -> Result<u64, DeviceError> {
        let value = self.signal()?;
        self.wait_cpu(value)?;
        Ok(value)
    }

    /// `true` once the GPU has passed `value`.
    pub fn is_fence_complete(&self, value: u64) -> Result<bool, DeviceError> {
        Ok(self.completed_value()? >= value)
    }

    /// The last value the GPU wrote to the fence.
    pub fn completed_value(&self) -> Result<u64, DeviceError> {
        self.device.fence_completed_value(self.fence)
    }

    /// The last value scheduled by [`CommandQueue::signal`].
    pub fn last_signaled_value(&self) -> u64 {
        self.counter.lock().last_signaled
    }
}

/// The device together with its graphics, async compute and copy queues.
#[derive(Debug, Clone)]
pub struct RenderDevice {
    device: Arc<dyn GpuDevice>,
    adapter: AdapterInfo,
    graphics: Arc<CommandQueue>,
    compute: Arc<CommandQueue>,
    copy: Arc<CommandQueue>,
}

impl RenderDevice {
    /// Selects an adapter, creates the device with the requested debug
    /// features and opens the three queues.
    pub fn create(backend: &dyn GpuBackend, config: &RendererConfig) -> Result<Self, DeviceError> {
        let adapter = select_adapter(backend, &config.device)?;
        let options = DeviceOptions {
            validation: config.debug.validation,
            breadcrumbs: config.breadcrumbs_enabled(),
        };
        let device = backend.create_device(&adapter, options)?;
        log::info!(
            "Selected adapter '{}' with {} MB of dedicated video memory",
            adapter.name,
            adapter.dedicated_video_memory_mb()
        );
        if options.breadcrumbs {
            log::info!("GPU breadcrumbs enabled");
        }
        Self::from_device(device)
    }

    /// Wraps an existing device and opens its queues.
    pub fn from_device(device: Arc<dyn GpuDevice>) -> Result<Self, DeviceError> {
        let adapter = device.adapter_info();
        let graphics = Arc::new(CommandQueue::new(device.clone(), QueueType::Graphics)?);
        let compute = Arc::new(CommandQueue::new(device.clone(), QueueType::Compute)?);
        let copy = Arc::new(CommandQueue::new(device.clone(), QueueType::Copy)?);
        Ok(Self {
            device,
            adapter,
            graphics,
            compute,
            copy,
        })
    }

    /// The underlying device.
    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    /// The adapter the device runs on.
    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    /// The direct queue.
    pub fn graphics_queue(&self) -> &Arc<CommandQueue> {
        &self.graphics
    }

    /// The async compute queue.
    pub fn compute_queue(&self) -> &Arc<CommandQueue> {
        &self.compute
    }

    /// The copy queue.
    pub fn copy_queue(&self) -> &Arc<CommandQueue> {
        &self.copy
    }

    /// The queue of a given family.
    pub fn queue(&self, ty: QueueType) -> &Arc<CommandQueue> {
        match ty {
            QueueType::Graphics => &self.graphics,
            QueueType::Compute => &self.compute,
            QueueType::Copy => &self.copy,
        }
    }

    /// Fails with [`DeviceError::Removed`] once the device is lost, logging
    /// the breadcrumb trail.
    pub fn check_removed(&self) -> Result<(), DeviceError> {
        match self.device.device_removed_reason() {
            None => Ok(()),
            Some(reason) => {
                log::error!("GPU device removed: {reason}");
                let trail = self.device.breadcrumbs();
                if !trail.is_empty() {
                    log::error!("Last executed markers (oldest first):");
                    for marker in &trail {
                        log::error!("  {marker}");
                    }
                }
                Err(DeviceError::Removed { reason })
            }
        }
    }

    /// Flushes every queue.
    pub fn wait_idle(&self) -> Result<(), DeviceError> {
        self.graphics.flush()?;
        self.compute.flush()?;
        self.copy.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend(Vec<AdapterInfo>);

    impl GpuBackend for FixedBackend {
        fn enumerate_adapters(&self) -> Vec<AdapterInfo> {
            self.0.clone()
        }

        fn create_device(
            &self,
            _adapter: &AdapterInfo,
            _options: DeviceOptions,
        ) -> Result<Arc<dyn GpuDevice>, DeviceError> {
            Err(DeviceError::CreationFailed("test backend".into()))
        }
    }

    fn adapter(name: &str, is_software: bool) -> AdapterInfo {
        AdapterInfo {
            name: name.into(),
            vendor_id: 0,
            dedicated_video_memory: 512 * 1024 * 1024,
            is_software,
            supports_bindless: true,
        }
    }

    #[test]
    fn test_hardware_adapter_preferred_over_software() {
        let backend = FixedBackend(vec![adapter("WARP", true), adapter("Discrete", false)]);
        let strict = DeviceConfig {
            allow_software_adapter: false,
        };
        assert_eq!(select_adapter(&backend, &strict).unwrap().name, "Discrete");
        let lenient = DeviceConfig::default();
        assert_eq!(select_adapter(&backend, &lenient).unwrap().name, "Discrete");
    }

    #[test]
    fn test_software_adapter_is_the_fallback() {
        let backend = FixedBackend(vec![adapter("WARP", true)]);
        let lenient = DeviceConfig::default();
        assert_eq!(select_adapter(&backend, &lenient).unwrap().name, "WARP");
    }

    #[test]
    fn test_no_adapter_is_an_error() {
        let backend = FixedBackend(vec![adapter("WARP", true)]);
        let strict = DeviceConfig {
            allow_software_adapter: false,
        };
        assert_eq!(
            select_adapter(&backend, &strict),
            Err(DeviceError::NoCompatibleAdapter)
        );
        assert!(RenderDevice::create(&backend, &RendererConfig::default()).is_err());
    }
}
