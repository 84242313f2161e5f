//! Retry policy and exponential backoff shared by the sync loop and the
//! photo upload queue.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)] // delays are computed in f64 milliseconds

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Attempts per operation for bounded retries (photo uploads)
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 2_000,
            max_delay_ms: 5 * 60 * 1_000,
            multiplier: 2.0,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = (self.initial_delay_ms as f64 * self.multiplier.powi(exponent))
            .min(self.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_delay_ms == 0 || self.max_delay_ms < self.initial_delay_ms {
            return Err(Error::Config(
                "retry delays must satisfy 0 < initial_delay_ms <= max_delay_ms".into(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::Config("retry multiplier must be >= 1.0".into()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("retry max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Backoff state across consecutive failures.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    failures: u32,
}

impl Backoff {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for(self.failures);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub const fn attempts(&self) -> u32 {
        self.failures
    }
}

/// Run `operation` up to `policy.max_attempts` times, sleeping with backoff
/// between attempts while `is_retryable` accepts the error.
pub async fn retry_async<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> std::result::Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut backoff = Backoff::new(policy.clone());
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempt += 1;
                if attempt >= policy.max_attempts || !is_retryable(&error) {
                    return Err(error);
                }
                let delay = backoff.next_delay();
                tracing::debug!(attempt, ?delay, "Retrying after transient failure");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            multiplier: 2.0,
            max_attempts: 3,
        }
    }

    #[test]
    fn delays_grow_and_cap() {
        let policy = policy();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn backoff_resets_after_success() {
        let mut backoff = Backoff::new(policy());
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.attempts(), 2);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn validation_rejects_shrinking_backoff() {
        let invalid = RetryPolicy {
            multiplier: 0.5,
            ..policy()
        };
        assert!(invalid.validate().is_err());
        assert!(policy().validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_async_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<(), &str> = retry_async(
            &policy(),
            |_| true,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("transient") }
            },
        )
        .await;
        assert_eq!(result, Err("transient"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_async_does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<(), &str> = retry_async(
            &policy(),
            |error| *error != "permanent",
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("permanent") }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_async_returns_first_success() {
        let result: std::result::Result<u32, &str> = retry_async(&policy(), |_| true, |attempt| async move {
            if attempt < 1 {
                Err("flaky")
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(result, Ok(1));
    }
}
