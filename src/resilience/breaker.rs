//! Circuit breaker guarding a remote call target.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; failures are counted.
    Closed,
    /// Too many failures; calls are rejected until the recovery timeout
    /// elapses.
    Open,
    /// Recovery timeout elapsed; exactly one trial call is admitted.
    HalfOpen,
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

/// Circuit breaker for protecting a failing remote service.
///
/// State is derived lazily from elapsed time when queried; there is no
/// background timer. Clones share the same state, so one breaker instance
/// can guard every call to the same target; transitions are serialized
/// behind an internal mutex.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Mutex<BreakerInner>>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                trial_in_flight: false,
            })),
            failure_threshold,
            recovery_timeout,
        }
    }

    /// Current state, transitioning Open to HalfOpen once the recovery
    /// timeout has elapsed.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.derive_state(&mut inner)
    }

    /// Whether a call may proceed right now. In HalfOpen this takes the
    /// single trial slot; the caller must report the outcome through
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure) to release it.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match self.derive_state(&mut inner) {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful call: the breaker closes and the failure count
    /// resets.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!("Circuit breaker closed");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.trial_in_flight = false;
    }

    /// Record a failed call. Trips to Open at the failure threshold; a
    /// failed HalfOpen trial re-opens with a fresh recovery timer.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        let state = self.derive_state(&mut inner);
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        inner.trial_in_flight = false;

        if state == CircuitState::HalfOpen {
            tracing::warn!("Circuit breaker re-opened after failed trial call");
            inner.state = CircuitState::Open;
        } else if inner.failure_count >= self.failure_threshold {
            if state != CircuitState::Open {
                tracing::warn!(
                    "Circuit breaker opened after {} consecutive failures",
                    inner.failure_count
                );
            }
            inner.state = CircuitState::Open;
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    fn derive_state(&self, inner: &mut BreakerInner) -> CircuitState {
        if inner.state == CircuitState::Open {
            let elapsed = inner.last_failure.map(|t| t.elapsed()).unwrap_or_default();
            if elapsed >= self.recovery_timeout {
                tracing::info!("Circuit breaker half-open");
                inner.state = CircuitState::HalfOpen;
            }
        }
        inner.state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // A poisoned lock only happens if a holder panicked; the counters
        // are still consistent, so keep going with the inner value.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
