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

//! Logical device creation and the hooks that route `wgpu` errors into the
//! debug layer.

use std::sync::{Arc, Weak};

use anyhow::{anyhow, Result};
use wgpu::{Adapter, Features};

use super::state::Shared;

/// Features the bindless heap and the visibility pass rely on.
pub(crate) const REQUIRED_FEATURES: Features = Features::TEXTURE_BINDING_ARRAY
    .union(Features::BUFFER_BINDING_ARRAY)
    .union(Features::STORAGE_RESOURCE_BINDING_ARRAY)
    .union(Features::SAMPLED_TEXTURE_AND_STORAGE_BUFFER_ARRAY_NON_UNIFORM_INDEXING)
    .union(Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES)
    .union(Features::PRIMITIVE_INDEX);

/// The logical device and its single hardware queue.
#[derive(Debug)]
pub(crate) struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Opens a logical device on `adapter` with [`REQUIRED_FEATURES`] and the
    /// adapter's own limits.
    pub async fn new(adapter: Adapter) -> Result<Self> {
        let info = adapter.get_info();
        log::info!(
            "Opening wgpu device on \"{}\" (Backend: {:?})",
            info.name,
            info.backend
        );
        let missing = REQUIRED_FEATURES - adapter.features();
        if !missing.is_empty() {
            return Err(anyhow!("adapter lacks required features {missing:?}"));
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Cortex Logical Device"),
                required_features: REQUIRED_FEATURES,
                required_limits: adapter.limits(),
                ..Default::default()
            })
            .await
            .map_err(|e| anyhow!("Failed to create logical device: {}", e))?;
        log::debug!("Device limits: {:?}", device.limits());

        Ok(Self {
            device,
            queue,
        })
    }

    /// Reports uncaptured errors to the debug layer and marks the device
    /// removed when the driver loses it.
    pub fn install_hooks(device: &wgpu::Device, shared: Weak<Shared>) {
        let on_error = shared.clone();
        device.on_uncaptured_error(Arc::new(move |e: wgpu::Error| {
            log::error!("WGPU Uncaptured Error: {e}");
            if let Some(shared) = on_error.upgrade() {
                shared.report_uncaptured(e.to_string());
            }
        }));
        device
            .set_device_lost_callback(move |reason, message| match reason {
                wgpu::DeviceLostReason::Destroyed => {
                    log::debug!("wgpu device destroyed: {message}");
                }
                _ => {
                    if let Some(shared) = shared.upgrade() {
                        shared.remove_device(format!("device lost: {message}"));
                    }
                }
            });
    }
}
