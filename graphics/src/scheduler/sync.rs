//! Queue synchronization primitives.
//!
//! Cross-queue ordering uses one timeline [`Semaphore`] per queue: every
//! submitted command list signals its queue's timeline with the next value,
//! and a waiting list waits for that value. Frame completion on the CPU side
//! is tracked with a [`Fence`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::QueueType;

/// Point on a queue's timeline semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Semaphore {
    queue: QueueType,
    value: u64,
}

impl Semaphore {
    pub(crate) fn new(queue: QueueType, value: u64) -> Self {
        Self { queue, value }
    }

    /// Queue whose timeline this point lives on.
    pub fn queue(&self) -> QueueType {
        self.queue
    }

    /// Timeline value signaled when the owning list completes.
    pub fn value(&self) -> u64 {
        self.value
    }
}

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The fence has not yet been signaled.
    Unsignaled,
    /// The fence has been signaled (GPU work complete).
    Signaled,
}

#[derive(Debug, Default)]
struct FenceState {
    signaled: Mutex<bool>,
    changed: Condvar,
}

/// CPU-GPU synchronization primitive.
///
/// Clones share state, so the scheduler can hand a fence to the caller and
/// signal it later.
#[derive(Debug, Clone, Default)]
pub struct Fence {
    state: Arc<FenceState>,
}

impl Fence {
    /// Create a new fence in the unsignaled state.
    pub fn new_unsignaled() -> Self {
        Self::default()
    }

    /// Check the current status of the fence.
    pub fn status(&self) -> FenceStatus {
        if *self.state.signaled.lock() {
            FenceStatus::Signaled
        } else {
            FenceStatus::Unsignaled
        }
    }

    /// Check if the fence is signaled (non-blocking).
    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Block until the fence is signaled.
    pub fn wait(&self) {
        let mut signaled = self.state.signaled.lock();
        while !*signaled {
            self.state.changed.wait(&mut signaled);
        }
    }

    /// Wait for the fence with a timeout.
    ///
    /// Returns `true` if the fence was signaled, `false` if timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut signaled = self.state.signaled.lock();
        if !*signaled {
            self.state.changed.wait_for(&mut signaled, timeout);
        }
        *signaled
    }

    /// Reset the fence to unsignaled state.
    pub fn reset(&self) {
        *self.state.signaled.lock() = false;
    }

    /// Signal the fence and wake every waiter.
    ///
    /// There is no GPU behind the scheduler, so submission signals immediately.
    pub(crate) fn signal(&self) {
        *self.state.signaled.lock() = true;
        self.state.changed.notify_all();
    }
}
