use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::IngestError;

/// Cooperative cancellation shared between a request handler and its
/// blocking worker. The worker polls it between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once the flag is set.
    pub fn check(&self) -> Result<(), IngestError> {
        if self.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        Ok(())
    }

    /// Guard that sets the flag when dropped unless disarmed first.
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop {
            flag: Some(self.clone()),
        }
    }
}

/// Sets its flag on drop. Held by a handler future so that a client
/// disconnect (future dropped) reaches the worker.
#[derive(Debug)]
pub struct CancelOnDrop {
    flag: Option<CancelFlag>,
}

impl CancelOnDrop {
    pub fn disarm(mut self) {
        self.flag = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(flag) = self.flag.take() {
            flag.cancel();
        }
    }
}
