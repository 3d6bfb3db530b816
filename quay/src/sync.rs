//! Fence and semaphore collaborator types.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::{vk, Device, Error};

/// A GPU-to-CPU completion signal with a monotonically increasing signaled
/// counter.
///
/// The handle itself is allocated and recycled externally; this type tracks
/// which completion generation the handle is on. The counter advances each
/// time the fence is observed signaled and reset for the next cycle.
#[derive(Debug)]
pub struct Fence {
    raw: vk::Fence,
    signaled_counter: AtomicU64,
}

impl Fence {
    /// Wraps an externally allocated, unsignaled fence handle.
    pub fn from_handle(raw: vk::Fence) -> Fence {
        Fence {
            raw,
            signaled_counter: AtomicU64::new(0),
        }
    }

    pub fn handle(&self) -> vk::Fence {
        self.raw
    }

    /// Queries the driver for the current fence status.
    pub fn is_signaled(&self, device: &Device) -> Result<bool, Error> {
        Ok(device.ops().get_fence_status(self.raw)?)
    }

    /// Number of times this fence has cycled through the signaled state.
    pub fn signaled_counter(&self) -> u64 {
        self.signaled_counter.load(Ordering::Acquire)
    }

    pub(crate) fn advance_signaled_counter(&self) -> u64 {
        self.signaled_counter.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// A GPU-side ordering primitive used across submissions or queues.
///
/// The `submitted` flag is set once a submission consuming this semaphore as
/// a wait dependency has been issued: from that point the GPU owns the wait,
/// and the semaphore must not be reused until the wait completes.
#[derive(Debug)]
pub struct Semaphore {
    raw: vk::Semaphore,
    submitted: AtomicBool,
}

impl Semaphore {
    /// Wraps an externally allocated semaphore handle.
    pub fn from_handle(raw: vk::Semaphore) -> Semaphore {
        Semaphore {
            raw,
            submitted: AtomicBool::new(false),
        }
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.raw
    }

    /// True once a submission waiting on this semaphore has been issued and
    /// the corresponding wait has not yet completed.
    pub fn is_submitted(&self) -> bool {
        self.submitted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_submitted(&self) {
        self.submitted.store(true, Ordering::Release);
    }

    pub(crate) fn reset_submitted(&self) {
        self.submitted.store(false, Ordering::Release);
    }
}
