//! Retry with exponential backoff around judge calls.
//!
//! Only transport-class failures are retried; an answer that parsed but is
//! unusable will not get better by asking again with the same prompt.

use std::future::Future;
use std::time::Duration;

use crate::judge::JudgeError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles per attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
        }
    }
}

/// Run `operation` until it succeeds, a non-retryable error occurs, or the
/// retry budget is exhausted.
pub async fn with_retries<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T, JudgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, JudgeError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transport() && attempt < policy.max_retries => {
                let delay = policy.base_delay * 2u32.saturating_pow(attempt);
                tracing::warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "judge call failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let attempts = AtomicU32::new(0);
        let result = with_retries(&fast_policy(), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(JudgeError::Transport("connection reset".into()))
                } else {
                    Ok("ok".to_string())
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let attempts = AtomicU32::new(0);
        let result: Result<String, _> = with_retries(&fast_policy(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(JudgeError::Transport("down".into())) }
        })
        .await;
        assert!(result.is_err());
        // Initial attempt plus two retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn output_errors_are_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<String, _> = with_retries(&fast_policy(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(JudgeError::Output("not json".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
