//! Bounded retry with exponential backoff
//!
//! Used for API calls that may be throttled or hit a flaky network. The
//! caller decides which errors are worth retrying.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Attempts for provider calls that are only retried when throttled
pub const RATE_LIMIT_ATTEMPTS: u32 = 4;

/// Retry budget and delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Backoff {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Error returned once retrying stops
#[derive(Debug)]
pub struct RetryError<E> {
    pub attempts: u32,
    pub error: E,
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent
pub async fn retry<T, E, F, Fut, R>(
    what: &str,
    backoff: Backoff,
    retryable: R,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < backoff.max_attempts && retryable(&error) => {
                let delay = backoff.delay(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    what, attempt, backoff.max_attempts, error, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                return Err(RetryError {
                    attempts: attempt,
                    error,
                });
            }
        }
    }
}
