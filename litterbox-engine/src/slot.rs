//! The system-wide execution slot.
//!
//! Only one dynamic analysis may run a payload (or scan a live process) at a
//! time. The slot is a single-permit semaphore; a second request is rejected
//! on the spot, never queued.

use std::sync::Arc;

use litterbox_core::error::ConflictError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Shared handle to the single execution permit.
///
/// Clones share the same permit, so tests can hold the slot from outside the
/// orchestrator to simulate a dynamic run in progress.
#[derive(Debug, Clone)]
pub struct ExecutionSlot {
    permit: Arc<Semaphore>,
}

/// Held for the duration of a dynamic run. Dropping it frees the slot.
#[derive(Debug)]
pub struct SlotGuard {
    _permit: OwnedSemaphorePermit,
}

impl ExecutionSlot {
    pub fn new() -> Self {
        Self {
            permit: Arc::new(Semaphore::new(1)),
        }
    }

    /// Take the slot, or fail with [`ConflictError::ExecutionSlotBusy`].
    pub fn try_acquire(&self) -> Result<SlotGuard, ConflictError> {
        Arc::clone(&self.permit)
            .try_acquire_owned()
            .map(|permit| SlotGuard { _permit: permit })
            .map_err(|_| ConflictError::ExecutionSlotBusy)
    }

    pub fn is_busy(&self) -> bool {
        self.permit.available_permits() == 0
    }
}

impl Default for ExecutionSlot {
    fn default() -> Self {
        Self::new()
    }
}
