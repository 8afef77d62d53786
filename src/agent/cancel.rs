//! Cooperative cancellation for agent tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::phone_agent::AgentError;

/// Shared cancellation flag for stopping a running task.
///
/// Clones observe the same flag, so a handle can be given to another
/// thread or task while the step loop polls it at its checkpoints.
/// Cancellation is cooperative: an in-flight operation runs to completion
/// before the loop observes the flag at the next checkpoint.
///
/// # Example
/// ```
/// use phone_pilot::CancellationSignal;
///
/// let signal = CancellationSignal::new();
/// let handle = signal.clone();
/// handle.cancel();
/// assert!(signal.is_cancelled());
/// signal.reset();
/// assert!(!handle.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`AgentError::Cancelled`] when cancellation was requested.
    /// Checkpoint helper for step loops.
    pub fn check(&self) -> Result<(), AgentError> {
        if self.is_cancelled() {
            Err(AgentError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Clear the flag for reuse on the next task. Visible to every clone.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_idempotent_and_shared() {
        let signal = CancellationSignal::new();
        let clone = signal.clone();

        assert!(!signal.is_cancelled());
        clone.cancel();
        clone.cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_reset_clears_every_clone() {
        let signal = CancellationSignal::new();
        let clone = signal.clone();
        signal.cancel();
        clone.reset();
        assert!(!signal.is_cancelled());
        assert!(!clone.is_cancelled());
    }

    #[test]
    fn test_check_maps_to_cancelled_error() {
        let signal = CancellationSignal::new();
        assert!(signal.check().is_ok());

        signal.cancel();
        assert!(matches!(signal.check(), Err(AgentError::Cancelled)));
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let signal = CancellationSignal::new();
        let handle = signal.clone();

        let join = std::thread::spawn(move || handle.cancel());
        join.join().unwrap();
        assert!(signal.is_cancelled());
    }
}
