//! Retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Configuration for retry behavior.
///
/// `max_attempts` counts the total number of tries including the first one;
/// it is clamped to at least 1 when the policy is applied.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Set the total number of attempts (including the first).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the initial delay between retries.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the upper bound on the delay between retries.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Disable the random jitter applied to each delay.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Pre-jitter delay for the given 0-indexed attempt:
    /// `min(base_delay * multiplier^attempt, max_delay)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Run `op` until it succeeds, retrying retryable failures with exponential
/// backoff.
///
/// A failure classified non-retryable by `is_retryable` propagates
/// immediately. Otherwise the delay for the current attempt is computed from
/// the policy, scaled by a uniform factor in [0.75, 1.25] when jitter is
/// enabled so synchronized callers spread out, and the operation is tried
/// again up to `max_attempts` total tries. After the last attempt the final
/// error propagates.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if !is_retryable(&e) || attempt >= max_attempts {
                    return Err(e);
                }

                let mut delay = policy.backoff_delay(attempt - 1);
                if policy.jitter {
                    delay = delay.mul_f64(rand::rng().random_range(0.75..=1.25));
                }
                tracing::warn!(
                    "Retry attempt {}/{} in {:.1}s: {}",
                    attempt,
                    max_attempts,
                    delay.as_secs_f64(),
                    e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct FakeError {
        retryable: bool,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "fake error")
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::default().without_jitter()
    }

    #[test]
    fn test_backoff_delay_doubles_and_clamps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(8));
        assert_eq!(policy.backoff_delay(5), Duration::from_secs(30));
    }

    #[test]
    fn test_max_attempts_clamped_to_one() {
        let policy = RetryPolicy::default().with_max_attempts(0);
        assert_eq!(policy.max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&policy(), |e: &FakeError| e.retryable, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FakeError { retryable: true })
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            retry_with_backoff(&policy(), |e: &FakeError| e.retryable, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError { retryable: false }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausting_attempts_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            retry_with_backoff(&policy(), |e: &FakeError| e.retryable, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError { retryable: true }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
