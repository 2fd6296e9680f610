//! Cooperative cancellation for async readers and writers

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Pack2Error, Pack2Result};

/// Shared cancellation signal
///
/// Clones observe the same flag. Async operations check it between logical
/// steps; an I/O call already in flight is allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    /// Create a flag that is not yet cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Return `Cancelled` if cancellation was requested
    pub fn check(&self) -> Pack2Result<()> {
        if self.is_cancelled() {
            return Err(Pack2Error::Cancelled);
        }
        Ok(())
    }
}
