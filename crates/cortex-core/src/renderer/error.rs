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

//! Defines the hierarchy of error types for the rendering subsystem.
//!
//! Each subsystem reports its own error enum; [`RenderError`] wraps all of
//! them at the frame boundary. Fatal conditions (device removed, heap
//! creation, graph validation) and frame-level conditions (upload footprint
//! mismatch, transient creation) are distinguished by
//! [`RenderError::is_fatal`].

use std::fmt;
use std::path::PathBuf;

use super::api::{DescriptorHeapType, ResourceId};

/// An error raised by the device, its queues, fences or command lists.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// No adapter satisfied the selection policy.
    NoCompatibleAdapter,
    /// The backend failed to create the device or one of its objects.
    CreationFailed(String),
    /// The device was removed; carries the reported reason.
    Removed {
        /// Reason reported by the driver (or the reference device).
        reason: String,
    },
    /// A queue, fence, swap chain or command list handle is unknown.
    InvalidHandle(&'static str),
    /// A command list was recorded with commands its queue type cannot run.
    InvalidCommandList(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NoCompatibleAdapter => write!(f, "No compatible GPU adapter found"),
            DeviceError::CreationFailed(msg) => write!(f, "Device object creation failed: {msg}"),
            DeviceError::Removed { reason } => write!(f, "GPU device removed: {reason}"),
            DeviceError::InvalidHandle(kind) => write!(f, "Invalid {kind} handle"),
            DeviceError::InvalidCommandList(msg) => write!(f, "Invalid command list: {msg}"),
        }
    }
}

impl std::error::Error for DeviceError {}

/// An error related to the creation or use of a GPU resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// The resource handle is unknown to the device.
    NotFound(ResourceId),
    /// The resource description is illegal.
    InvalidDesc(String),
    /// A CPU access targeted a resource that is not in an upload or readback heap.
    NotMappable(ResourceId),
    /// An access fell outside the resource.
    OutOfBounds {
        /// Resource accessed.
        resource: ResourceId,
        /// First byte of the access.
        offset: u64,
        /// Length of the access.
        len: u64,
        /// Size of the resource.
        size: u64,
    },
    /// A view was incompatible with its resource.
    InvalidView(String),
    /// An error originating from the backend.
    BackendError(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::NotFound(id) => write!(f, "Resource not found: {id:?}"),
            ResourceError::InvalidDesc(msg) => write!(f, "Invalid resource description: {msg}"),
            ResourceError::NotMappable(id) => {
                write!(f, "Resource {id:?} is not in a CPU-visible heap")
            }
            ResourceError::OutOfBounds {
                resource,
                offset,
                len,
                size,
            } => write!(
                f,
                "Access [{offset}, {}) out of bounds of {resource:?} ({size} bytes)",
                offset + len
            ),
            ResourceError::InvalidView(msg) => write!(f, "Invalid view: {msg}"),
            ResourceError::BackendError(msg) => write!(f, "Backend-specific resource error: {msg}"),
        }
    }
}

impl std::error::Error for ResourceError {}

/// An error related to root signatures, shaders or pipeline state objects.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// No program exists for the shader file and entry point.
    ShaderNotFound {
        /// Source path.
        path: PathBuf,
        /// Entry point.
        entry_point: String,
    },
    /// The backend refused the pipeline.
    CompilationFailed {
        /// Pipeline label.
        label: String,
        /// Backend details.
        details: String,
    },
    /// The root signature is malformed or unknown.
    InvalidRootSignature(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::ShaderNotFound { path, entry_point } => write!(
                f,
                "Shader entry point '{entry_point}' not found in '{}'",
                path.display()
            ),
            PipelineError::CompilationFailed { label, details } => {
                write!(f, "Pipeline compilation failed for '{label}': {details}")
            }
            PipelineError::InvalidRootSignature(msg) => {
                write!(f, "Invalid root signature: {msg}")
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// An error raised by the descriptor heap manager.
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorError {
    /// The device could not create a heap.
    HeapCreationFailed(String),
    /// The persistent region of a heap has no free slot left.
    PersistentExhausted {
        /// Heap concerned.
        heap: DescriptorHeapType,
    },
    /// A transient range would wrap the frame's segment of the ring.
    TransientRingExhausted {
        /// Heap concerned.
        heap: DescriptorHeapType,
        /// Descriptors requested.
        requested: u32,
        /// Descriptors left in the segment.
        available: u32,
    },
    /// A handle was released that is not a live persistent slot.
    InvalidRelease {
        /// Heap concerned.
        heap: DescriptorHeapType,
        /// Slot index.
        index: u32,
    },
    /// A range of zero descriptors was requested.
    EmptyRange,
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::HeapCreationFailed(msg) => {
                write!(f, "Descriptor heap creation failed: {msg}")
            }
            DescriptorError::PersistentExhausted { heap } => {
                write!(f, "Persistent {heap:?} descriptors exhausted")
            }
            DescriptorError::TransientRingExhausted {
                heap,
                requested,
                available,
            } => write!(
                f,
                "Transient {heap:?} ring exhausted: requested {requested}, {available} left this frame"
            ),
            DescriptorError::InvalidRelease { heap, index } => {
                write!(f, "Slot {index} of the {heap:?} heap is not a live persistent descriptor")
            }
            DescriptorError::EmptyRange => write!(f, "Requested an empty descriptor range"),
        }
    }
}

impl std::error::Error for DescriptorError {}

/// Which bindless region an operation concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindlessKind {
    /// Texture SRV slots.
    Texture,
    /// Buffer SRV and UAV slots.
    Buffer,
}

/// An error raised by the bindless registry.
#[derive(Debug, Clone, PartialEq)]
pub enum BindlessError {
    /// Every slot of a region is live.
    Exhausted {
        /// Region exhausted.
        kind: BindlessKind,
        /// Capacity of that region.
        capacity: u32,
    },
    /// Writing the descriptor failed.
    Resource(ResourceError),
}

impl fmt::Display for BindlessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindlessError::Exhausted { kind, capacity } => {
                write!(f, "Bindless {kind:?} slots exhausted (capacity {capacity})")
            }
            BindlessError::Resource(err) => write!(f, "Bindless descriptor write failed: {err}"),
        }
    }
}

impl std::error::Error for BindlessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BindlessError::Resource(err) => Some(err),
            BindlessError::Exhausted { .. } => None,
        }
    }
}

impl From<ResourceError> for BindlessError {
    fn from(err: ResourceError) -> Self {
        BindlessError::Resource(err)
    }
}

/// An error raised by the uploader.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadError {
    /// The supplied data does not match the device-reported footprint.
    FootprintMismatch {
        /// Subresource concerned.
        subresource: u32,
        /// Bytes the footprint requires.
        expected: u64,
        /// Bytes supplied.
        actual: u64,
    },
    /// A resource operation failed.
    Resource(ResourceError),
    /// Submission or the fence wait failed.
    Device(DeviceError),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::FootprintMismatch {
                subresource,
                expected,
                actual,
            } => write!(
                f,
                "Upload footprint mismatch on subresource {subresource}: expected {expected} bytes, got {actual}"
            ),
            UploadError::Resource(err) => write!(f, "Upload resource error: {err}"),
            UploadError::Device(err) => write!(f, "Upload submission error: {err}"),
        }
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UploadError::Resource(err) => Some(err),
            UploadError::Device(err) => Some(err),
            UploadError::FootprintMismatch { .. } => None,
        }
    }
}

impl From<ResourceError> for UploadError {
    fn from(err: ResourceError) -> Self {
        UploadError::Resource(err)
    }
}

impl From<DeviceError> for UploadError {
    fn from(err: DeviceError) -> Self {
        UploadError::Device(err)
    }
}

/// An error raised while building, compiling or executing a render graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    /// The handle does not name a resource of this graph.
    InvalidHandle {
        /// Raw handle value.
        handle: u32,
    },
    /// The handle was issued by a previous frame.
    StaleHandle {
        /// Raw handle value.
        handle: u32,
    },
    /// A declaration named a subresource the resource does not have.
    InvalidSubresource {
        /// Pass name.
        pass: String,
        /// Resource name.
        resource: String,
        /// Subresource requested.
        subresource: u32,
        /// Subresources the resource has.
        count: u32,
    },
    /// A pass reads and writes a subresource through separate declarations.
    ReadWriteWithoutDeclaration {
        /// Pass name.
        pass: String,
        /// Resource name.
        resource: String,
        /// Subresource concerned.
        subresource: u32,
    },
    /// A declaration mixes an exclusive usage with another usage.
    ConflictingUsage {
        /// Pass name.
        pass: String,
        /// Resource name.
        resource: String,
        /// Offending usage, formatted.
        usage: String,
    },
    /// A declaration used an empty usage set.
    EmptyUsage {
        /// Pass name.
        pass: String,
        /// Resource name.
        resource: String,
    },
    /// An operation required a compiled graph.
    NotCompiled,
    /// Recording or submission failed.
    Device(DeviceError),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::InvalidHandle { handle } => write!(f, "Invalid render graph handle {handle}"),
            GraphError::StaleHandle { handle } => {
                write!(f, "Render graph handle {handle} belongs to a previous frame")
            }
            GraphError::InvalidSubresource {
                pass,
                resource,
                subresource,
                count,
            } => write!(
                f,
                "Pass '{pass}' declares subresource {subresource} of '{resource}', which has {count}"
            ),
            GraphError::ReadWriteWithoutDeclaration {
                pass,
                resource,
                subresource,
            } => write!(
                f,
                "Pass '{pass}' reads and writes subresource {subresource} of '{resource}' without declaring readWrite"
            ),
            GraphError::ConflictingUsage {
                pass,
                resource,
                usage,
            } => write!(
                f,
                "Pass '{pass}' declares conflicting usage {usage} on '{resource}'"
            ),
            GraphError::EmptyUsage { pass, resource } => {
                write!(f, "Pass '{pass}' declares an empty usage on '{resource}'")
            }
            GraphError::NotCompiled => write!(f, "Render graph has not been compiled"),
            GraphError::Device(err) => write!(f, "Render graph execution failed: {err}"),
        }
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GraphError::Device(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DeviceError> for GraphError {
    fn from(err: DeviceError) -> Self {
        GraphError::Device(err)
    }
}

/// A top-level error for the renderer, surfaced at frame boundaries.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A device-level failure.
    Device(DeviceError),
    /// The device was removed; the engine must shut down.
    DeviceRemoved {
        /// Reason reported by the device.
        reason: String,
    },
    /// A resource failure.
    Resource(ResourceError),
    /// A pipeline failure.
    Pipeline(PipelineError),
    /// A descriptor heap failure.
    Descriptor(DescriptorError),
    /// A bindless registry failure.
    Bindless(BindlessError),
    /// An upload failure.
    Upload(UploadError),
    /// A render graph failure.
    Graph(GraphError),
    /// A mesh table entry referenced an invalid bindless SRV.
    InvalidMeshTable {
        /// Mesh index.
        mesh: u32,
        /// What was wrong.
        detail: String,
    },
    /// The scene referenced something that does not exist.
    InvalidScene(String),
}

impl RenderError {
    /// `true` for errors after which the renderer cannot continue.
    pub fn is_fatal(&self) -> bool {
        match self {
            RenderError::DeviceRemoved { .. }
            | RenderError::InvalidMeshTable { .. }
            | RenderError::Pipeline(_)
            | RenderError::Bindless(BindlessError::Exhausted { .. })
            | RenderError::Descriptor(DescriptorError::HeapCreationFailed(_)) => true,
            RenderError::Device(err) => !matches!(err, DeviceError::InvalidCommandList(_)),
            RenderError::Graph(err) => !matches!(err, GraphError::Device(_)),
            _ => false,
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Device(err) => write!(f, "Device error: {err}"),
            RenderError::DeviceRemoved { reason } => write!(f, "Device removed: {reason}"),
            RenderError::Resource(err) => write!(f, "Resource error: {err}"),
            RenderError::Pipeline(err) => write!(f, "Pipeline error: {err}"),
            RenderError::Descriptor(err) => write!(f, "Descriptor error: {err}"),
            RenderError::Bindless(err) => write!(f, "Bindless error: {err}"),
            RenderError::Upload(err) => write!(f, "Upload error: {err}"),
            RenderError::Graph(err) => write!(f, "Render graph error: {err}"),
            RenderError::InvalidMeshTable { mesh, detail } => {
                write!(f, "Invalid mesh table entry {mesh}: {detail}")
            }
            RenderError::InvalidScene(msg) => write!(f, "Invalid scene: {msg}"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Device(err) => Some(err),
            RenderError::Resource(err) => Some(err),
            RenderError::Pipeline(err) => Some(err),
            RenderError::Descriptor(err) => Some(err),
            RenderError::Bindless(err) => Some(err),
            RenderError::Upload(err) => Some(err),
            RenderError::Graph(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DeviceError> for RenderError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Removed { reason } => RenderError::DeviceRemoved { reason },
            other => RenderError::Device(other),
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::Resource(err)
    }
}

impl From<PipelineError> for RenderError {
    fn from(err: PipelineError) -> Self {
        RenderError::Pipeline(err)
    }
}

impl From<DescriptorError> for RenderError {
    fn from(err: DescriptorError) -> Self {
        RenderError::Descriptor(err)
    }
}

impl From<BindlessError> for RenderError {
    fn from(err: BindlessError) -> Self {
        RenderError::Bindless(err)
    }
}

impl From<UploadError> for RenderError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Device(DeviceError::Removed { reason }) => {
                RenderError::DeviceRemoved { reason }
            }
            other => RenderError::Upload(other),
        }
    }
}

impl From<GraphError> for RenderError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Device(DeviceError::Removed { reason }) => {
                RenderError::DeviceRemoved { reason }
            }
            other => RenderError::Graph(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_removed_is_lifted_and_fatal() {
        let err: RenderError = DeviceError::Removed {
            reason: "hung".into(),
        }
        .into();
        assert_eq!(err, RenderError::DeviceRemoved { reason: "hung".into() });
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Device removed: hung");

        let nested: RenderError = GraphError::Device(DeviceError::Removed {
            reason: "tdr".into(),
        })
        .into();
        assert!(matches!(nested, RenderError::DeviceRemoved { .. }));
    }

    #[test]
    fn test_frame_level_errors_are_not_fatal() {
        let err: RenderError = UploadError::FootprintMismatch {
            subresource: 0,
            expected: 64,
            actual: 32,
        }
        .into();
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Upload error: Upload footprint mismatch on subresource 0: expected 64 bytes, got 32"
        );
    }

    #[test]
    fn test_graph_validation_display() {
        let err = GraphError::ReadWriteWithoutDeclaration {
            pass: "Blur".into(),
            resource: "HDR".into(),
            subresource: 0,
        };
        assert_eq!(
            err.to_string(),
            "Pass 'Blur' reads and writes subresource 0 of 'HDR' without declaring readWrite"
        );
        assert!(RenderError::from(err).is_fatal());
    }

    #[test]
    fn test_error_sources_chain() {
        use std::error::Error;
        let err = RenderError::Bindless(BindlessError::Resource(ResourceError::NotFound(
            ResourceId(7),
        )));
        let source = err.source().expect("bindless source");
        assert!(source.source().is_some());
    }
}
