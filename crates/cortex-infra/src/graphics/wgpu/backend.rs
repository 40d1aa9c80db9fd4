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

//! Adapter discovery through `wgpu`.

use std::sync::Arc;

use cortex_core::renderer::api::{AdapterInfo, DeviceOptions};
use cortex_core::renderer::traits::{GpuBackend, GpuDevice};
use cortex_core::renderer::DeviceError;
use wgpu::{Adapter, DeviceType, Instance, RequestAdapterOptions};

use super::context::{GpuContext, REQUIRED_FEATURES};
use super::device::WgpuDevice;

/// Exposes the hardware adapters `wgpu` finds, and its fallback adapter
/// when one is installed.
#[derive(Debug)]
pub struct WgpuBackend {
    instance: Instance,
}

impl Default for WgpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl WgpuBackend {
    /// Creates the backend with every native backend enabled.
    pub fn new() -> Self {
        Self {
            instance: Instance::new(wgpu::InstanceDescriptor::new_without_display_handle()),
        }
    }

    /// The high-performance adapter first, then the fallback adapter, each
    /// listed once.
    fn adapters(&self) -> Vec<Adapter> {
        let mut found: Vec<Adapter> = Vec::new();
        for force_fallback_adapter in [false, true] {
            let request = self.instance.request_adapter(&RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter,
            });
            match pollster::block_on(request) {
                Ok(adapter) => {
                    let name = adapter.get_info().name;
                    if found.iter().all(|a| a.get_info().name != name) {
                        found.push(adapter);
                    }
                }
                Err(e) => log::debug!(
                    "No wgpu adapter (fallback: {force_fallback_adapter}): {e}"
                ),
            }
        }
        found
    }
}

fn adapter_to_info(adapter: &Adapter) -> AdapterInfo {
    let info = adapter.get_info();
    AdapterInfo {
        name: info.name,
        vendor_id: info.vendor,
        dedicated_video_memory: 0,
        is_software: info.device_type == DeviceType::Cpu,
        supports_bindless: adapter.features().contains(REQUIRED_FEATURES),
    }
}

impl GpuBackend for WgpuBackend {
    /// Adapters without the bindless features cannot run the renderer and
    /// are left out.
    fn enumerate_adapters(&self) -> Vec<AdapterInfo> {
        self.adapters()
            .iter()
            .map(adapter_to_info)
            .filter(|info| {
                if !info.supports_bindless {
                    log::debug!("Skipping '{}': no bindless support", info.name);
                }
                info.supports_bindless
            })
            .collect()
    }

    fn create_device(
        &self,
        adapter: &AdapterInfo,
        options: DeviceOptions,
    ) -> Result<Arc<dyn GpuDevice>, DeviceError> {
        let found = self
            .adapters()
            .into_iter()
            .find(|a| a.get_info().name == adapter.name)
            .ok_or_else(|| {
                DeviceError::CreationFailed(format!(
                    "'{}' is not an adapter of the wgpu backend",
                    adapter.name
                ))
            })?;
        let info = adapter_to_info(&found);
        let context = pollster::block_on(GpuContext::new(found))
            .map_err(|e| DeviceError::CreationFailed(format!("{e:#}")))?;
        Ok(Arc::new(WgpuDevice::new(info, context, options)))
    }
}
