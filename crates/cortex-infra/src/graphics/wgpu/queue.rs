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

//! Submission threads. Every API queue feeds the single `wgpu::Queue` from
//! its own thread, so a GPU wait only ever blocks the queue that issued it.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cortex_core::renderer::api::{QueueId, QueueType};
use cortex_core::renderer::DeviceError;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::graphics::recording::RecordedList;

use super::executor::Executor;
use super::state::{Fence, Shared};

#[derive(Debug)]
pub(crate) enum QueueOp {
    Execute(Vec<RecordedList>),
    Signal(Arc<Fence>, u64),
    Wait(Arc<Fence>, u64),
    Shutdown,
}

#[derive(Debug)]
pub(crate) struct QueueWorker {
    pub ty: QueueType,
    sender: Sender<QueueOp>,
    handle: Option<JoinHandle<()>>,
}

impl QueueWorker {
    pub fn spawn(id: QueueId, ty: QueueType, shared: Arc<Shared>) -> Result<Self, DeviceError> {
        let (sender, receiver) = unbounded();
        let name = format!("{ty:?}#{}", id.0);
        let handle = thread::Builder::new()
            .name(format!("cortex-wgpu-{}", name.to_lowercase()))
            .spawn(move || run(name, shared, receiver))
            .map_err(|e| DeviceError::CreationFailed(format!("queue thread: {e}")))?;
        Ok(Self {
            ty,
            sender,
            handle: Some(handle),
        })
    }

    pub fn submit(&self, op: QueueOp) -> Result<(), DeviceError> {
        self.sender.send(op).map_err(|_| DeviceError::Removed {
            reason: "queue worker stopped".into(),
        })
    }
}

impl Drop for QueueWorker {
    fn drop(&mut self) {
        let _ = self.sender.send(QueueOp::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("A {:?} queue worker panicked", self.ty);
            }
        }
    }
}

/// Completes `fence` to `value` once everything submitted so far has run.
fn signal(shared: &Arc<Shared>, fence: Arc<Fence>, value: u64) {
    fence.schedule(value);
    let device = Arc::downgrade(shared);
    shared.queue.on_submitted_work_done(move || {
        // A removed device stops advancing its fences.
        if device.upgrade().is_some_and(|shared| !shared.is_removed()) {
            fence.complete(value);
        }
    });
}

fn run(name: String, shared: Arc<Shared>, receiver: Receiver<QueueOp>) {
    log::debug!("Queue worker '{name}' started");
    let executor = Executor::new(shared.clone(), name.clone());
    for op in receiver.iter() {
        match op {
            QueueOp::Execute(lists) => {
                for list in lists {
                    if shared.is_removed() {
                        break;
                    }
                    if let Err(fault) = executor.execute(list) {
                        shared.remove_device(format!("page fault on queue '{name}': {fault:#}"));
                    }
                }
            }
            QueueOp::Signal(fence, value) => {
                if !shared.is_removed() {
                    signal(&shared, fence, value);
                }
            }
            QueueOp::Wait(fence, value) => {
                if fence.wait_scheduled(value, &shared).is_err() {
                    log::debug!("Queue '{name}' stopped waiting: device removed");
                }
            }
            QueueOp::Shutdown => break,
        }
    }
    log::debug!("Queue worker '{name}' stopped");
}
