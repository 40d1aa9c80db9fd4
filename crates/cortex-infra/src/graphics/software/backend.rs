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

use std::sync::Arc;

use cortex_core::renderer::api::{AdapterInfo, DeviceOptions};
use cortex_core::renderer::traits::{GpuBackend, GpuDevice};
use cortex_core::renderer::DeviceError;

use super::device::SoftwareDevice;

/// Host memory the software adapter advertises as dedicated.
const ADVERTISED_MEMORY: u64 = 2 * 1024 * 1024 * 1024;

pub(crate) fn software_adapter() -> AdapterInfo {
    AdapterInfo {
        name: "Cortex Software Rasterizer".into(),
        vendor_id: 0,
        dedicated_video_memory: ADVERTISED_MEMORY,
        is_software: true,
        supports_bindless: true,
    }
}

/// Exposes the single software adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareBackend;

impl SoftwareBackend {
    /// Creates the backend.
    pub fn new() -> Self {
        Self
    }
}

impl GpuBackend for SoftwareBackend {
    fn enumerate_adapters(&self) -> Vec<AdapterInfo> {
        vec![software_adapter()]
    }

    fn create_device(
        &self,
        adapter: &AdapterInfo,
        options: DeviceOptions,
    ) -> Result<Arc<dyn GpuDevice>, DeviceError> {
        if *adapter != software_adapter() {
            return Err(DeviceError::CreationFailed(format!(
                "'{}' is not an adapter of the software backend",
                adapter.name
            )));
        }
        Ok(Arc::new(SoftwareDevice::new(adapter.clone(), options)))
    }
}
