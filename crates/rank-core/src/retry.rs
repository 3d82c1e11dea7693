//! Bounded exponential backoff around fallible async operations.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry schedule: total attempts, first delay, and growth factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    /// One try plus two retries, waiting 1s then 2s.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }

    /// Every delay this policy can sleep, in order.
    #[cfg(test)]
    pub(crate) fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|r| self.backoff_for(r)).collect()
    }

    /// Run `op` until it succeeds, fails with an error `retryable` rejects,
    /// or the attempts are used up. The last error is returned on failure.
    pub async fn run<T, E, F, Fut, P>(&self, label: &str, mut op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if retryable(&e) && attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        label, attempt, self.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
