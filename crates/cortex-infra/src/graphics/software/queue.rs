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

//! Fences and the worker thread behind each command queue.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cortex_core::renderer::api::{QueueId, QueueType, ResourceId, ResourceStates};
use cortex_core::renderer::DeviceError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::graphics::recording::RecordedList;

use super::executor::Executor;
use super::state::Shared;

/// A monotonically increasing 64-bit fence.
#[derive(Debug)]
pub(crate) struct Fence {
    value: Mutex<u64>,
    signaled: Condvar,
}

impl Fence {
    pub fn new(initial_value: u64) -> Self {
        Self {
            value: Mutex::new(initial_value),
            signaled: Condvar::new(),
        }
    }

    pub fn completed(&self) -> u64 {
        *self.value.lock()
    }

    /// Raises the fence to `value`. A fence never goes backwards.
    pub fn signal(&self, value: u64) {
        let mut current = self.value.lock();
        *current = (*current).max(value);
        self.signaled.notify_all();
    }

    /// Blocks until the fence reaches `value` or the device is removed.
    pub fn wait(&self, value: u64, shared: &Shared) -> Result<(), DeviceError> {
        let mut current = self.value.lock();
        while *current < value {
            if let Some(reason) = shared.removed_reason() {
                return Err(DeviceError::Removed { reason });
            }
            self.signaled.wait(&mut current);
        }
        Ok(())
    }

    /// Wakes waiters so they can observe a device removal.
    pub fn wake_all(&self) {
        let _guard = self.value.lock();
        self.signaled.notify_all();
    }
}

/// Work scheduled on a queue, executed in submission order.
#[derive(Debug)]
pub(crate) enum QueueOp {
    Execute(Vec<RecordedList>),
    Signal(Arc<Fence>, u64),
    Wait(Arc<Fence>, u64),
    Present(ResourceId),
    Shutdown,
}

/// The thread executing one queue.
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
            .name(format!("cortex-queue-{}", name.to_lowercase()))
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

fn run(name: String, shared: Arc<Shared>, receiver: Receiver<QueueOp>) {
    log::debug!("Queue worker '{name}' started");
    let mut executor = Executor::new(shared.clone(), name.clone());
    for op in receiver.iter() {
        match op {
            QueueOp::Execute(lists) => {
                for list in lists {
                    if shared.is_removed() {
                        break;
                    }
                    if let Err(fault) = executor.execute(list) {
                        shared.remove_device(format!("page fault on queue '{name}': {fault}"));
                    }
                }
            }
            // A removed device stops advancing its fences.
            QueueOp::Signal(fence, value) => {
                if !shared.is_removed() {
                    fence.signal(value);
                }
            }
            QueueOp::Wait(fence, value) => {
                if fence.wait(value, &shared).is_err() {
                    log::debug!("Queue '{name}' stopped waiting: device removed");
                }
            }
            QueueOp::Present(back_buffer) => executor.check_present(back_buffer),
            QueueOp::Shutdown => break,
        }
    }
    log::debug!("Queue worker '{name}' stopped");
}

/// Checks that a back buffer is in the PRESENT state.
pub(crate) fn present_state_ok(states: &[ResourceStates]) -> bool {
    states.iter().all(|s| *s == ResourceStates::PRESENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::renderer::api::DeviceOptions;
    use std::time::Duration;

    #[test]
    fn test_fence_never_goes_backwards() {
        let fence = Fence::new(3);
        fence.signal(1);
        assert_eq!(fence.completed(), 3);
        fence.signal(7);
        assert_eq!(fence.completed(), 7);
    }

    #[test]
    fn test_wait_returns_once_signaled_from_another_thread() {
        let shared = Arc::new(Shared::new(DeviceOptions::default()));
        let fence = Arc::new(Fence::new(0));
        let signaler = {
            let fence = fence.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                fence.signal(2);
            })
        };
        fence.wait(2, &shared).unwrap();
        signaler.join().unwrap();
    }

    #[test]
    fn test_removal_wakes_waiters() {
        let shared = Arc::new(Shared::new(DeviceOptions::default()));
        let fence = Arc::new(Fence::new(0));
        shared.fences.write().insert(cortex_core::renderer::api::FenceId(1), fence.clone());
        let remover = {
            let shared = shared.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                shared.remove_device("test".into());
            })
        };
        let err = fence.wait(1, &shared).unwrap_err();
        assert_eq!(
            err,
            DeviceError::Removed {
                reason: "test".into()
            }
        );
        remover.join().unwrap();
    }
}
