//! Resilience layer: retry with backoff, circuit breaking, and device
//! connection recovery.
//!
//! The three mechanisms are independent and composable: the agent applies
//! retry plus circuit breaker around model calls and the recovery manager
//! around device operations.

mod breaker;
mod recovery;
mod retry;

pub use breaker::{CircuitBreaker, CircuitState};
pub use recovery::{DeviceConnection, RecoveryManager};
pub use retry::{retry_with_backoff, RetryPolicy};
