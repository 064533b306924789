//! Bounded exponential-backoff retry for backend calls.
//!
//! Every generative-backend call in the pipeline is wrapped in a
//! `RetryPolicy` rather than carrying ad-hoc retry loops. The policy only
//! retries transient failures; malformed payloads and configuration errors
//! surface immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::LlmError;

/// Default number of extra attempts after the first failure.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for the first backoff step.
const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// A composable retry policy: maximum extra attempts plus a jittered
/// doubling backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first one; a call is made at most
    /// `max_retries + 1` times.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with explicit limits.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Backoff delay before retry number `retry` (1-based), with up to 50%
    /// additive jitter.
    fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let doubled = base.saturating_mul(1u64 << (retry - 1).min(16));
        let jitter = if doubled == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=doubled / 2)
        };
        Duration::from_millis(doubled + jitter)
    }

    /// Runs `op`, retrying transient failures up to `max_retries` times.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !err.is_transient() || retry == self.max_retries {
                        return Err(err);
                    }
                    retry += 1;
                    let delay = self.delay_for(retry);
                    tracing::warn!(
                        retry,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient backend failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn always_failing_call_is_attempted_max_retries_plus_one_times() {
        let attempts = AtomicU32::new(0);
        let policy = fast_policy(3);

        let result: Result<(), LlmError> = policy
            .run(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(LlmError::RequestFailed("connection reset".into())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn non_transient_failure_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let policy = fast_policy(3);

        let result: Result<(), LlmError> = policy
            .run(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(LlmError::ParseError("not json".into())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let policy = fast_policy(3);

        let result = policy
            .run(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(LlmError::RateLimited("429".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.ok(), Some("done"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
