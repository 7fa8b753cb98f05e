//! Single-slot in-flight guard

use crate::error::{Result, SdkError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Fail-fast advisory lock: at most one operation in flight, a second
/// attempt is rejected with [`SdkError::Locked`] instead of queueing.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    busy: Arc<AtomicBool>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot; released when the guard drops, whatever the outcome
    pub fn try_acquire(&self) -> Result<InFlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SdkError::Locked)?;
        Ok(InFlightGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_locked(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held while an operation is in flight
#[derive(Debug)]
pub struct InFlightGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
