//! Retry policy and combinator for inference calls.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::{debug, error, warn};

use crate::error::InferenceError;

/// Exponential backoff retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Upper bound for a single delay
    pub max_interval: Duration,
    /// Growth factor between delays
    pub multiplier: f64,
    /// Give up once this much time has passed
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            max_elapsed: Some(Duration::from_secs(120)),
        }
    }
}

impl RetryPolicy {
    /// Default delays with a custom attempt count.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            max_elapsed_time: self.max_elapsed,
            ..Default::default()
        };
        backoff.reset();
        backoff
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy is exhausted.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, InferenceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, InferenceError>>,
{
    let mut backoff = policy.backoff();
    let mut attempts = 0;

    loop {
        attempts += 1;
        debug!(attempt = attempts, "Calling inference API");

        let e = match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        if attempts >= policy.max_attempts {
            error!(error = %e, attempts, "Max retries exceeded");
            return Err(InferenceError::RetriesExhausted {
                attempts,
                last_error: e.to_string(),
            });
        }

        match backoff.next_backoff() {
            Some(delay) => {
                warn!(
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Inference call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                error!(error = %e, "Backoff exhausted");
                return Err(InferenceError::RetriesExhausted {
                    attempts,
                    last_error: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            multiplier: 2.0,
            max_elapsed: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry(&fast(3), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(InferenceError::Api("503".into()))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(&fast(2), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(InferenceError::Api("timeout".into()))
        })
        .await;
        assert!(matches!(
            result,
            Err(InferenceError::RetriesExhausted { attempts: 2, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(&fast(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(InferenceError::Parse("garbage".into()))
        })
        .await;
        assert!(matches!(result, Err(InferenceError::Parse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_with_attempts_floor() {
        assert_eq!(RetryPolicy::with_attempts(0).max_attempts, 1);
        assert_eq!(RetryPolicy::with_attempts(4).max_attempts, 4);
    }
}
