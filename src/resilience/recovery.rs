//! Device connection recovery.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::device::DeviceError;

/// Liveness and reconnection hooks for the device transport.
#[async_trait]
pub trait DeviceConnection: Send + Sync {
    /// Whether the transport currently responds.
    async fn is_alive(&self) -> bool;

    /// Attempt one reconnection.
    async fn reconnect(&self) -> Result<(), DeviceError>;
}

/// Verifies the device transport before operations and performs bounded
/// reconnection when it is gone.
///
/// Reconnection failures end in a terminal [`DeviceError::Unavailable`]
/// rather than retrying the calling operation indefinitely.
pub struct RecoveryManager {
    connection: Arc<dyn DeviceConnection>,
    max_attempts: u32,
    base_delay: Duration,
}

impl RecoveryManager {
    pub fn new(connection: Arc<dyn DeviceConnection>) -> Self {
        Self {
            connection,
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }

    /// Set the number of reconnection attempts before giving up.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the initial delay between reconnection attempts.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Ensure the transport is alive, reconnecting with exponential backoff
    /// if it is not.
    pub async fn ensure_connected(&self) -> Result<(), DeviceError> {
        if self.connection.is_alive().await {
            return Ok(());
        }

        tracing::info!("Device connection lost, attempting to reconnect");

        for attempt in 0..self.max_attempts {
            if let Err(e) = self.connection.reconnect().await {
                tracing::warn!(
                    "Reconnect attempt {}/{} failed: {}",
                    attempt + 1,
                    self.max_attempts,
                    e
                );
            } else if self.connection.is_alive().await {
                tracing::info!("Device reconnected successfully");
                return Ok(());
            }

            if attempt + 1 < self.max_attempts {
                let delay = self.base_delay * 2u32.pow(attempt);
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!("Failed to reconnect after {} attempts", self.max_attempts);
        Err(DeviceError::Unavailable(format!(
            "reconnection failed after {} attempts",
            self.max_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Transport double that comes alive after a set number of reconnects.
    struct FlakyConnection {
        reconnects_needed: u32,
        reconnect_calls: AtomicU32,
        alive_from_start: bool,
    }

    impl FlakyConnection {
        fn down(reconnects_needed: u32) -> Self {
            Self {
                reconnects_needed,
                reconnect_calls: AtomicU32::new(0),
                alive_from_start: false,
            }
        }

        fn up() -> Self {
            Self {
                reconnects_needed: 0,
                reconnect_calls: AtomicU32::new(0),
                alive_from_start: true,
            }
        }
    }

    #[async_trait]
    impl DeviceConnection for FlakyConnection {
        async fn is_alive(&self) -> bool {
            self.alive_from_start
                || self.reconnect_calls.load(Ordering::SeqCst) >= self.reconnects_needed
        }

        async fn reconnect(&self) -> Result<(), DeviceError> {
            self.reconnect_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_alive_connection_passes_through() {
        let connection = Arc::new(FlakyConnection::up());
        let manager = RecoveryManager::new(connection.clone());

        assert!(manager.ensure_connected().await.is_ok());
        assert_eq!(connection.reconnect_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_transient_outage() {
        let connection = Arc::new(FlakyConnection::down(2));
        let manager = RecoveryManager::new(connection.clone());

        assert!(manager.ensure_connected().await.is_ok());
        assert_eq!(connection.reconnect_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_are_terminal() {
        let connection = Arc::new(FlakyConnection::down(100));
        let manager = RecoveryManager::new(connection.clone()).with_max_attempts(3);

        let err = manager.ensure_connected().await.unwrap_err();
        assert!(matches!(err, DeviceError::Unavailable(_)));
        assert_eq!(connection.reconnect_calls.load(Ordering::SeqCst), 3);
    }
}
