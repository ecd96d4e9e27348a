//! Cancellation of index builds.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{FiledexError, Result};

/// Shared flag asking a running build to stop.
///
/// Clones observe the same flag. The build checks it between batches and
/// before handing out new work; extractions already running are allowed to
/// finish or time out.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Clear a previous request before a new build starts.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// `Err(Cancelled)` if cancellation was requested.
    pub fn check(&self, what: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(FiledexError::cancelled(what))
        } else {
            Ok(())
        }
    }
}
