use crate::infrastructure::config::RetryPolicy;
use crate::infrastructure::error::InfraError;
use std::future::Future;
use tokio::time::{sleep, Duration as TokioDuration};

/// Runs `operation` until it succeeds, fails terminally, or the attempt budget is spent.
/// Delays double after each retryable failure.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    action: &str,
    mut operation: F,
) -> Result<T, InfraError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, InfraError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u8 = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt + 1 < max_attempts => {
                let delay = policy
                    .base_delay_ms
                    .saturating_mul(2u64.saturating_pow(attempt as u32));
                tracing::debug!(
                    action,
                    attempt = attempt + 1,
                    delay_ms = delay,
                    %error,
                    "retrying"
                );
                sleep(TokioDuration::from_millis(delay)).await;
                attempt = attempt.saturating_add(1);
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_attempts: u8) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 0,
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(&fast_policy(3), "test", || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 2 {
                    Err(InfraError::Network("connection reset".to_string()))
                } else {
                    Ok(call)
                }
            }
        })
        .await;
        assert_eq!(result.expect("third call succeeds"), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_attempt_budget() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), InfraError> = with_retry(&fast_policy(2), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(InfraError::Http { status: 503, body: String::new() }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn terminal_failures_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), InfraError> = with_retry(&fast_policy(5), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(InfraError::Http { status: 404, body: String::new() }) }
        })
        .await;
        assert!(matches!(result, Err(InfraError::Http { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
