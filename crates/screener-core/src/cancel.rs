use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ScreenerError;

/// Cooperative cancellation flag shared by every ticker task and the HTTP
/// retry loop. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Stop issuing new fetches. In-flight requests finish or time out.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once `cancel` has been called on any clone.
    pub fn check(&self) -> Result<(), ScreenerError> {
        if self.is_cancelled() {
            Err(ScreenerError::Cancelled)
        } else {
            Ok(())
        }
    }
}
