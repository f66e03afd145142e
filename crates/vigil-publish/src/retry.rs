//! One retry policy for every downstream call.

use std::future::Future;
use std::time::Duration;
use tracing::warn;
use vigil_core::Result;

/// Backoff policy for rate-limited downstream requests
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,

    /// Delay before the first retry; doubles per attempt
    pub base_delay: Duration,

    /// Ceiling on any single backoff delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Calculate the backoff before retry number `attempt` (zero-based)
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let backoff = self.base_delay.as_millis() as u64 * 2u64.pow(attempt);
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(backoff.min(max))
    }
}

/// Run `op`, retrying with exponential backoff while it fails with a
/// retryable error (HTTP 429).
///
/// Any non-retryable error surfaces immediately; exhausting the attempt
/// budget surfaces the last rate-limit error.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.backoff_for(attempt);
                warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use vigil_core::VigilError;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(8),
        }
    }

    #[test]
    fn test_backoff_doubles_and_clamps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
        };
        assert_eq!(policy.backoff_for(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(300));
        assert_eq!(policy.backoff_for(5), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_retries_rate_limit_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(VigilError::RateLimited { retry_after: None })
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget_surfaces_last_error() {
        let calls = AtomicU32::new(0);
        let err = with_retry(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(VigilError::RateLimited { retry_after: Some(1) }) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, VigilError::RateLimited { retry_after: Some(1) }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_surfaces_immediately() {
        let calls = AtomicU32::new(0);
        let err = with_retry(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(VigilError::Api {
                    code: 500,
                    message: "boom".to_string(),
                })
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, VigilError::Api { code: 500, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
