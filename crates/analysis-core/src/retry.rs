use std::future::Future;
use std::time::Duration;

use crate::error::CollaboratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first, at least 1
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            backoff_base,
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff_base: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1` (exponential, capped at 8x the base).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(3);
        self.backoff_base.saturating_mul(factor)
    }
}

/// Run `fetch` until it succeeds, fails permanently, or attempts run out.
/// Returns the final result and the number of attempts made.
pub async fn fetch_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut fetch: F,
) -> (Result<T, CollaboratorError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match fetch().await {
            Ok(value) => return (Ok(value), attempt),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {:?}",
                    label,
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return (Err(e), attempt),
        }
    }
}
