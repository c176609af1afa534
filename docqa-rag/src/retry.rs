//! Bounded retry with exponential backoff.
//!
//! Delay before retry `n` (1-based) is `base_delay * 2^(n-1)`, capped at
//! `max_delay`. Only errors for which
//! [`RagError::is_retryable`](crate::RagError::is_retryable) holds are
//! retried; anything else is returned immediately.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RagError, Result};

/// Retry limits for calls to external model services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 4, base_delay_ms: 250, max_delay_ms: 8_000 }
    }
}

/// The value produced by a retried operation and how many retries it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    pub retries: u32,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self { max_attempts: 1, base_delay_ms: 0, max_delay_ms: 0 }
    }

    /// Delay to wait before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }

    /// Upper bound on the total time spent sleeping between attempts.
    pub fn max_total_delay(&self) -> Duration {
        (1..self.max_attempts).map(|retry| self.delay_for(retry)).sum()
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` is reached. The last error is returned unchanged.
    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<Retried<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut retries = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(Retried { value, retries }),
                Err(e) if e.is_retryable() && retries + 1 < max_attempts => {
                    retries += 1;
                    let delay = self.delay_for(retries);
                    warn!(
                        operation = label,
                        attempt = retries,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Run `future` under `timeout`, mapping expiry through `on_timeout`.
pub(crate) async fn with_timeout<T>(
    timeout: Duration,
    future: impl Future<Output = Result<T>>,
    on_timeout: impl FnOnce() -> RagError,
) -> Result<T> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn unavailable() -> RagError {
        RagError::EmbeddingUnavailable { provider: "test".into(), message: "down".into() }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy { max_attempts: 3, base_delay_ms: 1, max_delay_ms: 4 }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = fast()
            .run("embed", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 { Err(unavailable()) } else { Ok(42) }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, Retried { value: 42, retries: 2 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_at_attempt_cap_with_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = fast()
            .run("embed", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(unavailable())
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = fast()
            .run("embed", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(RagError::dimension_mismatch(2, 3))
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::IndexCorruption(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delays_double_and_cap() {
        let policy = RetryPolicy { max_attempts: 6, base_delay_ms: 100, max_delay_ms: 500 };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.max_total_delay(), Duration::from_millis(1700));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_maps_to_caller_error() {
        let err = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            },
            || RagError::GenerationTimeout { model: "m".into(), timeout_ms: 10 },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RagError::GenerationTimeout { .. }));
    }
}
