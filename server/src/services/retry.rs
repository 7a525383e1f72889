//! Bounded exponential backoff for ledger calls

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::BillingError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
        }
    }
}

impl RetryConfig {
    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.exponential_base).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the retry budget is spent.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
) -> Result<T, BillingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BillingError>>,
{
    let mut retry_count = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && retry_count < config.max_retries => {
                retry_count += 1;
                tracing::warn!(
                    "{} failed, retry {}/{} in {:?}: {}",
                    label,
                    retry_count,
                    config.max_retries,
                    delay,
                    e
                );
                sleep(delay).await;
                delay = config.next_delay(delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!("{} failed after {} retries: {}", label, retry_count, e);
                }
                return Err(e);
            }
        }
    }
}
