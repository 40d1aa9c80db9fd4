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

//! Pass declarations, the fluent pass builder and the execution context.

use std::sync::Arc;

use super::resource::{RgHandle, RgResolver};
use super::usage::RgUsage;
use super::RenderGraph;
use crate::renderer::api::ALL_SUBRESOURCES;
use crate::renderer::descriptors::DescriptorHeapManager;
use crate::renderer::error::RenderError;
use crate::renderer::traits::{CommandList, GpuDevice};

/// The queue family a pass records for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassType {
    /// Draws.
    Graphics,
    /// Dispatches.
    Compute,
    /// Copies only.
    Copy,
}

/// Whether a declaration reads, writes or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessKind {
    Read,
    Write,
    ReadWrite,
}

impl AccessKind {
    pub(crate) fn reads(self) -> bool {
        matches!(self, AccessKind::Read | AccessKind::ReadWrite)
    }

    pub(crate) fn writes(self) -> bool {
        matches!(self, AccessKind::Write | AccessKind::ReadWrite)
    }
}

/// One resource declaration of a pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Access {
    pub(crate) handle: RgHandle,
    pub(crate) usage: RgUsage,
    pub(crate) subresource: u32,
    pub(crate) kind: AccessKind,
}

impl Access {
    pub(crate) fn covers(&self, subresource: u32) -> bool {
        self.subresource == ALL_SUBRESOURCES || self.subresource == subresource
    }
}

/// The callback recorded for a pass. Captures its inputs by value.
pub type PassCallback = Box<dyn FnOnce(&mut PassContext<'_>) -> Result<(), RenderError> + Send>;

/// A declared pass.
pub(crate) struct RgPass {
    pub(crate) name: String,
    pub(crate) ty: PassType,
    pub(crate) accesses: Vec<Access>,
    pub(crate) aliases: Vec<(RgHandle, RgHandle)>,
    pub(crate) allow_culling: bool,
    pub(crate) callback: Option<PassCallback>,
}

impl RgPass {
    /// Handles this pass writes.
    pub(crate) fn writes(&self) -> impl Iterator<Item = RgHandle> + '_ {
        self.accesses
            .iter()
            .filter(|a| a.kind.writes())
            .map(|a| a.handle)
    }

    /// Handles this pass reads.
    pub(crate) fn reads(&self) -> impl Iterator<Item = RgHandle> + '_ {
        self.accesses
            .iter()
            .filter(|a| a.kind.reads())
            .map(|a| a.handle)
    }

    /// Every handle the pass touches, aliasing pairs included.
    pub(crate) fn touches(&self, handle: RgHandle) -> bool {
        self.accesses.iter().any(|a| a.handle == handle)
            || self
                .aliases
                .iter()
                .any(|&(before, after)| before == handle || after == handle)
    }
}

/// Builds a pass through chained declarations. The pass is added to the
/// graph by [`PassBuilder::execute`].
#[must_use = "a pass is only added to the graph by `execute`"]
pub struct PassBuilder<'g> {
    pub(crate) graph: &'g mut RenderGraph,
    pub(crate) pass: RgPass,
}

impl PassBuilder<'_> {
    fn declare(mut self, handle: RgHandle, usage: RgUsage, subresource: u32, kind: AccessKind) -> Self {
        self.pass.accesses.push(Access {
            handle,
            usage,
            subresource,
            kind,
        });
        self
    }

    /// Declares a read of every subresource.
    pub fn read(self, handle: RgHandle, usage: RgUsage) -> Self {
        self.declare(handle, usage, ALL_SUBRESOURCES, AccessKind::Read)
    }

    /// Declares a read of one subresource.
    pub fn read_subresource(self, handle: RgHandle, usage: RgUsage, subresource: u32) -> Self {
        self.declare(handle, usage, subresource, AccessKind::Read)
    }

    /// Declares a write of every subresource.
    pub fn write(self, handle: RgHandle, usage: RgUsage) -> Self {
        self.declare(handle, usage, ALL_SUBRESOURCES, AccessKind::Write)
    }

    /// Declares a write of one subresource.
    pub fn write_subresource(self, handle: RgHandle, usage: RgUsage, subresource: u32) -> Self {
        self.declare(handle, usage, subresource, AccessKind::Write)
    }

    /// Declares a read-modify-write of every subresource.
    pub fn read_write(self, handle: RgHandle, usage: RgUsage) -> Self {
        self.declare(handle, usage, ALL_SUBRESOURCES, AccessKind::ReadWrite)
    }

    /// Declares a read-modify-write of one subresource.
    pub fn read_write_subresource(self, handle: RgHandle, usage: RgUsage, subresource: u32) -> Self {
        self.declare(handle, usage, subresource, AccessKind::ReadWrite)
    }

    /// Declares that `after` starts using memory `before` occupied.
    pub fn alias(mut self, before: RgHandle, after: RgHandle) -> Self {
        self.pass.aliases.push((before, after));
        self
    }

    /// Lets the compiler drop the pass when nothing consumes its outputs.
    pub fn allow_culling(mut self) -> Self {
        self.pass.allow_culling = true;
        self
    }

    /// Sets the recording callback and adds the pass to the graph.
    pub fn execute<F>(mut self, callback: F)
    where
        F: FnOnce(&mut PassContext<'_>) -> Result<(), RenderError> + Send + 'static,
    {
        self.pass.callback = Some(Box::new(callback));
        self.graph.push_pass(self.pass);
    }
}

/// What a pass callback records with.
pub struct PassContext<'a> {
    /// The command list of the frame.
    pub cmd: &'a mut dyn CommandList,
    /// The device, for view creation.
    pub device: &'a Arc<dyn GpuDevice>,
    /// Descriptor heaps, for transient tables.
    pub descriptors: &'a mut DescriptorHeapManager,
    /// Maps the pass's handles to device resources.
    pub resources: RgResolver<'a>,
    pub(crate) pass_name: &'a str,
}

impl PassContext<'_> {
    /// Name of the executing pass.
    pub fn pass_name(&self) -> &str {
        self.pass_name
    }
}
