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

//! Renderer start-up configuration.
//!
//! The configuration is read from JSON. Every key is optional and falls back to
//! the documented default, so an empty object `{}` is a valid file.
//!
//! ```json
//! {
//!   "viewport": { "width": 1920, "height": 1080 },
//!   "cluster": { "z": 32 },
//!   "tables": { "max_instances": 131072 }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// An error raised while loading or validating a [`RendererConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config '{path}': {source}")]
    Io {
        /// Path that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The JSON was malformed or had a field of the wrong type.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value was out of its legal range.
    #[error("invalid config value for '{key}': {reason}")]
    Invalid {
        /// Dotted key of the offending value.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Back-buffer dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Width in pixels. Default 1280.
    pub width: u32,
    /// Height in pixels. Default 720.
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Froxel grid used by clustered light culling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Tiles across the screen. Default 16.
    pub x: u32,
    /// Tiles down the screen. Default 9.
    pub y: u32,
    /// Exponential depth slices. Default 24.
    pub z: u32,
    /// Light-index capacity of each cluster. Default 256.
    pub max_lights_per_cluster: u32,
    /// Near plane of the clustered range. Default 0.1.
    pub near: f32,
    /// Far plane of the clustered range. Default 1000.
    pub far: f32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            x: 16,
            y: 9,
            z: 24,
            max_lights_per_cluster: 256,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Capacities of the bindless region of the shader-visible heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindlessConfig {
    /// Texture slots, placeholders included. Default 16384.
    pub max_textures: u32,
    /// Buffer and UAV slots. Default 8192.
    pub max_buffers: u32,
}

impl Default for BindlessConfig {
    fn default() -> Self {
        Self {
            max_textures: 16384,
            max_buffers: 8192,
        }
    }
}

/// Sizes of the descriptor heap partitions managed outside the bindless region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorConfig {
    /// Persistent CBV/SRV/UAV slots. Default 4096.
    pub persistent: u32,
    /// Transient CBV/SRV/UAV ring, split across frames in flight. Default 8192.
    pub transient: u32,
    /// Render-target views (persistent and transient halves). Default 256.
    pub rtv: u32,
    /// Depth-stencil views (persistent and transient halves). Default 64.
    pub dsv: u32,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            persistent: 4096,
            transient: 8192,
            rtv: 256,
            dsv: 64,
        }
    }
}

/// Initial capacities of the per-frame upload tables. Tables grow on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Instance records. Default 65536.
    pub max_instances: u32,
    /// Material records. Default 4096.
    pub max_materials: u32,
    /// Mesh records. Default 4096.
    pub max_meshes: u32,
    /// Reflection probes. Default 256.
    pub max_probes: u32,
    /// Local (point and spot) lights. Default 2048.
    pub max_local_lights: u32,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            max_instances: 65536,
            max_materials: 4096,
            max_meshes: 4096,
            max_probes: 256,
            max_local_lights: 2048,
        }
    }
}

/// Render graph tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderGraphConfig {
    /// Frames a pooled transient may stay unused before it is destroyed. Default 8.
    pub pool_max_idle_frames: u32,
    /// Dump the compiled graph every frame. `CORTEX_RG_DUMP=1` also enables it.
    pub dump: bool,
}

impl Default for RenderGraphConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_frames: 8,
            dump: false,
        }
    }
}

/// Pipeline-wide switches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Run clustered light culling on the async compute queue.
    pub async_compute: bool,
    /// Scale applied to image-based lighting. Default 1.0.
    pub ibl_intensity: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            async_compute: false,
            ibl_intensity: 1.0,
        }
    }
}

/// Sun shadow map layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Edge length of each cascade in texels. Default 1024.
    pub map_size: u32,
    /// Number of cascades (array slices). Default 1, at most 6.
    pub cascades: u32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            map_size: 1024,
            cascades: 1,
        }
    }
}

/// Adapter selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Accept a software adapter when no hardware adapter qualifies. Default true.
    pub allow_software_adapter: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            allow_software_adapter: true,
        }
    }
}

/// Debugging aids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Enable resource-state validation in the device. Default true.
    pub validation: bool,
    /// Record GPU breadcrumbs for device-removed diagnostics.
    /// `CORTEX_GPU_BREADCRUMBS=1` also enables it.
    pub gpu_breadcrumbs: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation: true,
            gpu_breadcrumbs: false,
        }
    }
}

/// Complete renderer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Back-buffer size.
    pub viewport: ViewportConfig,
    /// Frames the CPU may record ahead of the GPU. Default 2.
    pub frames_in_flight: u32,
    /// Directory holding `<Name>.hlsl` sources. Default `assets/shaders`.
    pub shader_dir: PathBuf,
    /// Froxel grid.
    pub cluster: ClusterConfig,
    /// Bindless capacities.
    pub bindless: BindlessConfig,
    /// Descriptor heap partitions.
    pub descriptors: DescriptorConfig,
    /// Upload table capacities.
    pub tables: TableConfig,
    /// Render graph tuning.
    pub render_graph: RenderGraphConfig,
    /// Pipeline switches.
    #[serde(rename = "renderer")]
    pub pipeline: PipelineConfig,
    /// Shadow map layout.
    pub shadows: ShadowConfig,
    /// Adapter policy.
    pub device: DeviceConfig,
    /// Debugging aids.
    pub debug: DebugConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            viewport: ViewportConfig::default(),
            frames_in_flight: 2,
            shader_dir: PathBuf::from("assets/shaders"),
            cluster: ClusterConfig::default(),
            bindless: BindlessConfig::default(),
            descriptors: DescriptorConfig::default(),
            tables: TableConfig::default(),
            render_graph: RenderGraphConfig::default(),
            pipeline: PipelineConfig::default(),
            shadows: ShadowConfig::default(),
            device: DeviceConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl RendererConfig {
    /// Parses and validates a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        log::info!("Loaded renderer config from '{}'", path.display());
        Ok(config)
    }

    /// Checks every value against its legal range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                key,
                reason: reason.into(),
            }
        }

        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(invalid("viewport", "dimensions must be non-zero"));
        }
        if !(1..=3).contains(&self.frames_in_flight) {
            return Err(invalid("frames_in_flight", "must be in 1..=3"));
        }
        let c = &self.cluster;
        if c.x == 0 || c.y == 0 || c.z == 0 {
            return Err(invalid("cluster", "grid dimensions must be non-zero"));
        }
        if c.max_lights_per_cluster == 0 {
            return Err(invalid("cluster.max_lights_per_cluster", "must be non-zero"));
        }
        if !(c.near > 0.0 && c.far > c.near) {
            return Err(invalid("cluster.near", "requires 0 < near < far"));
        }
        if self.bindless.max_textures <= crate::renderer::bindless::RESERVED_SLOT_COUNT {
            return Err(invalid(
                "bindless.max_textures",
                "must exceed the reserved placeholder slots",
            ));
        }
        if self.bindless.max_buffers == 0 {
            return Err(invalid("bindless.max_buffers", "must be non-zero"));
        }
        let d = &self.descriptors;
        if d.transient < self.frames_in_flight || d.rtv < 2 || d.dsv < 2 {
            return Err(invalid("descriptors", "heap partitions are too small"));
        }
        if self.tables.max_instances == 0
            || self.tables.max_materials == 0
            || self.tables.max_meshes == 0
            || self.tables.max_probes == 0
            || self.tables.max_local_lights == 0
        {
            return Err(invalid("tables", "initial capacities must be non-zero"));
        }
        if self.shadows.map_size == 0 || !(1..=6).contains(&self.shadows.cascades) {
            return Err(invalid("shadows", "map_size must be non-zero, cascades in 1..=6"));
        }
        Ok(())
    }

    /// `true` when the render graph should dump itself, via config or
    /// `CORTEX_RG_DUMP=1`.
    pub fn render_graph_dump_enabled(&self) -> bool {
        self.render_graph.dump || env_flag("CORTEX_RG_DUMP")
    }

    /// `true` when GPU breadcrumbs are requested, via config or
    /// `CORTEX_GPU_BREADCRUMBS=1`.
    pub fn breadcrumbs_enabled(&self) -> bool {
        self.debug.gpu_breadcrumbs || env_flag("CORTEX_GPU_BREADCRUMBS")
    }

    /// Path of the HLSL source for shader `name`.
    pub fn shader_path(&self, name: &str) -> PathBuf {
        self.shader_dir.join(format!("{name}.hlsl"))
    }
}

/// Reads a boolean environment switch (`1`, `true`, `on`).
pub fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "on"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_object_yields_defaults() {
        let config = RendererConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RendererConfig::default());
        assert_eq!(config.cluster.x * config.cluster.y * config.cluster.z, 16 * 9 * 24);
        assert_eq!(config.bindless.max_textures, 16384);
        assert_eq!(config.tables.max_instances, 65536);
    }

    #[test]
    fn test_partial_keys_override_defaults() {
        let config = RendererConfig::from_json_str(
            r#"{ "viewport": { "width": 64 }, "cluster": { "z": 32 }, "renderer": { "async_compute": true } }"#,
        )
        .unwrap();
        assert_eq!(config.viewport.width, 64);
        assert_eq!(config.viewport.height, 720);
        assert_eq!(config.cluster.z, 32);
        assert_eq!(config.cluster.x, 16);
        assert!(config.pipeline.async_compute);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = RendererConfig::from_json_str(r#"{ "frames_in_flight": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "frames_in_flight", .. }));

        let err = RendererConfig::from_json_str(r#"{ "cluster": { "near": 5.0, "far": 1.0 } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("cluster.near"));

        let err = RendererConfig::from_json_str(r#"{ "viewport": "wide" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "shader_dir": "shaders", "tables": {{ "max_probes": 8 }} }}"#).unwrap();
        let config = RendererConfig::load(file.path()).unwrap();
        assert_eq!(config.tables.max_probes, 8);
        assert_eq!(
            config.shader_path("VisibilityPass"),
            PathBuf::from("shaders").join("VisibilityPass.hlsl")
        );

        let missing = RendererConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
