//! Bounded retries.
//!
//! # Responsibilities
//! - Run a fallible async operation up to `max_attempts` times
//! - Sleep a jittered exponential backoff between attempts
//! - Log each failed attempt and the final give-up
//!
//! # Design Decisions
//! - The last error is returned unchanged so callers keep its type
//! - The error is dropped before sleeping, so it never needs to be `Send`
//!   beyond the attempt that produced it

use std::fmt::Display;
use std::future::Future;

use tracing::{debug, warn};

use super::backoff::calculate_backoff;

/// Attempt bound and delay bounds for one kind of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 200, 2000)
    }
}

/// Run `attempt_fn` until it succeeds or the policy's attempts are spent.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt_fn: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let delay = {
            let error = match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if attempt >= attempts {
                warn!(operation, attempts, error = %error, "giving up after retries");
                return Err(error);
            }
            let delay = calculate_backoff(attempt, policy.base_delay_ms, policy.max_delay_ms);
            debug!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "attempt failed, retrying"
            );
            delay
        };
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, String> = retry_with_backoff(&RetryPolicy::default(), "probe", || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 { Err(format!("refused #{}", n)) } else { Ok(n) }
        })
        .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error_when_exhausted() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(3, 10, 100);
        let result: Result<(), String> = retry_with_backoff(&policy, "probe", || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err(format!("refused #{}", n))
        })
        .await;
        assert_eq!(result, Err("refused #3".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(0, 10, 100);
        let _: Result<(), &str> = retry_with_backoff(&policy, "probe", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("down")
        })
        .await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
