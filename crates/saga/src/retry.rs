//! Bounded retry with linear backoff for collaborator calls.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::ServiceError;

/// How often and how patiently a collaborator call is repeated.
///
/// Attempt `n` (1-based) that fails transiently is followed by a pause of
/// `n * base_delay` before attempt `n + 1`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay unit for the linear backoff.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Policy with the default attempt bound and a custom delay unit.
    pub fn with_base_delay(base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..Self::default()
        }
    }

    /// Pause after the given failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the attempt
/// bound is reached.
///
/// Only errors for which [`ServiceError::is_transient`] holds are retried;
/// a 4xx or a declined payment is surfaced immediately.
pub async fn retry_linear<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, ServiceError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match call(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "collaborator call succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if error.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "collaborator call failed, retrying"
                );
                metrics::counter!("collaborator_retries_total", "operation" => operation.to_string())
                    .increment(1);
                sleep(delay).await;
            }
            Err(error) => {
                tracing::error!(
                    operation,
                    attempt,
                    error = %error,
                    "collaborator call failed"
                );
                return Err(error);
            }
        }
    }
}
