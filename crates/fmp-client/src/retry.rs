use std::future::Future;
use std::time::Duration;

use screener_core::{CancelHandle, ClientConfig, ScreenerError};

/// Bounded exponential backoff for transient provider failures. No new
/// attempt starts once `cancel` is set.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub cancel: CancelHandle,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
            cancel: CancelHandle::default(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, attempts run out, or the
    /// run is cancelled.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ScreenerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ScreenerError>>,
    {
        let mut attempt = 0;
        loop {
            self.cancel.check()?;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "{} failed ({}), retry {}/{} in {}ms",
                        label,
                        e,
                        attempt + 1,
                        self.max_attempts - 1,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
