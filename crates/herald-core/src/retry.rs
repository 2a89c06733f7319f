//! Exponential backoff shared by every network-facing step.
//!
//! ```text
//! attempt 0 --fail--> sleep(base) --> attempt 1 --fail--> sleep(2*base) --> ... (capped)
//! ```
//!
//! Only errors for which [`AppError::is_retryable`] holds are retried. A final
//! failure comes back as [`AppError::RetriesExhausted`] so callers can decide
//! between falling back and aborting.

use std::future::Future;
use std::time::Duration;

use crate::error::AppError;

/// Backoff configuration: `delay(n) = min(base_delay * 2^n, max_delay)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        std::cmp::min(self.base_delay.saturating_mul(factor), self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// The closure receives the 0-indexed attempt number.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T, AppError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempt = 0;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt + 1 >= self.max_attempts {
                        tracing::warn!(
                            operation = %operation_name,
                            attempts = attempt + 1,
                            error = %e,
                            "Giving up"
                        );
                        return Err(AppError::RetriesExhausted {
                            operation: operation_name.to_string(),
                            attempts: attempt + 1,
                            last: Box::new(e),
                        });
                    }
                    let delay = self.delay_for_attempt(attempt);
                    tracing::debug!(
                        operation = %operation_name,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}
