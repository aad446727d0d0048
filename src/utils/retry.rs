// Retry with exponential backoff, used by the LLM client only

use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Run `operation`, retrying up to `max_retries` more times while
/// `should_retry` accepts the error. The delay doubles after each failure,
/// starting from `base_delay`.
pub async fn with_retry<F, T, E, P>(
    mut operation: F,
    max_retries: u32,
    base_delay: Duration,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> futures::future::BoxFuture<'static, Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if attempt >= max_retries || !should_retry(&error) {
                    return Err(error);
                }

                let delay = base_delay * 2u32.pow(attempt.min(5));
                attempt += 1;
                warn!(attempt, max_retries, error = %error, "Retrying after failure");
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting_op(
        calls: Arc<AtomicU32>,
        succeed_on: u32,
    ) -> impl FnMut() -> futures::future::BoxFuture<'static, Result<u32, String>> {
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= succeed_on {
                    Ok(n)
                } else {
                    Err(format!("attempt {} failed", n))
                }
            })
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(counting_op(calls.clone(), 3), 2, Duration::ZERO, |_| true).await;
        let attempts = tokio_test::assert_ok!(result);
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(counting_op(calls.clone(), 10), 2, Duration::ZERO, |_| true).await;
        tokio_test::assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(counting_op(calls.clone(), 10), 2, Duration::ZERO, |_| false).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
