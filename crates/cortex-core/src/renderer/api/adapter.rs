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

/// Information about a physical (or software) adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// Human readable name.
    pub name: String,
    /// PCI vendor id, 0 for software adapters.
    pub vendor_id: u32,
    /// Dedicated video memory in bytes.
    pub dedicated_video_memory: u64,
    /// `true` for a CPU-emulated adapter.
    pub is_software: bool,
    /// `true` when the adapter exposes SM 6.6 bindless heap indexing.
    pub supports_bindless: bool,
}

impl AdapterInfo {
    /// Dedicated video memory in MB.
    pub fn dedicated_video_memory_mb(&self) -> u64 {
        self.dedicated_video_memory / (1024 * 1024)
    }
}

/// Options fixed at device creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceOptions {
    /// Validate resource states and bindings on every command.
    pub validation: bool,
    /// Keep a trail of executed markers for device-removed reports.
    pub breadcrumbs: bool,
}

/// Severity of a message reported by the device debug layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DebugSeverity {
    /// Informational.
    Info,
    /// Suspicious but legal usage.
    Warning,
    /// An API contract violation.
    Error,
}

/// One message reported by the device debug layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMessage {
    /// How serious the message is.
    pub severity: DebugSeverity,
    /// Description of the violation.
    pub text: String,
}

impl DebugMessage {
    /// `true` for error-level messages.
    pub fn is_error(&self) -> bool {
        self.severity == DebugSeverity::Error
    }
}
