//! Fixed-delay retry combinator.

use std::future::Future;

use p2p_eval_core::RetryPolicy;
use thiserror::Error;
use tracing::debug;

/// Classifies errors for [`with_retry`].
pub trait Retryable {
    /// Whether another attempt may succeed.
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Terminal failure of a retried operation.
///
/// Carries the last underlying error as its source.
#[derive(Debug, Error)]
#[error("{operation} failed after {attempts} attempt(s): {source}")]
pub struct RetryError<E>
where
    E: std::error::Error + 'static,
{
    pub operation: &'static str,
    pub attempts: u32,
    #[source]
    pub source: E,
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The last error observed before giving up.
    pub fn last_error(&self) -> &E {
        &self.source
    }

    pub fn into_last_error(self) -> E {
        self.source
    }
}

/// Run `attempt` until it succeeds or `policy` is exhausted.
///
/// Sleeps `policy.delay` between attempts, never after the last one. A
/// non-retryable error ends the loop immediately.
pub async fn with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + Retryable + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut n = 0;
    loop {
        n += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if n < max_attempts && e.is_retryable() => {
                debug!(operation, attempt = n, max_attempts, error = %e, "attempt failed, retrying");
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => {
                return Err(RetryError {
                    operation,
                    attempts: n,
                    source: e,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Error)]
    enum TestError {
        #[error("transient failure #{0}")]
        Transient(u32),
        #[error("fatal")]
        Fatal,
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient(_))
        }
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(100))
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(policy(5), "get_info", || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= 3 {
                    Err(TestError::Transient(n))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_exactly_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = with_retry(policy(4), "get_metrics", || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err::<(), _>(TestError::Transient(n))
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.attempts, 4);
        assert_eq!(err.operation, "get_metrics");
        assert!(matches!(err.last_error(), TestError::Transient(4)));
        assert!(err.to_string().contains("get_metrics failed after 4 attempt(s)"));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_delay_between_attempts_only() {
        let start = tokio::time::Instant::now();
        let _ = with_retry(policy(3), "op", || async { Err::<(), _>(TestError::Transient(0)) }).await;
        // Two pauses for three attempts.
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = with_retry(policy(10), "publish", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError::Fatal)
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts, 1);
    }

    #[tokio::test]
    async fn first_success_makes_one_call() {
        let result = with_retry(policy(3), "op", || async { Ok::<_, TestError>("ok") }).await;
        assert_eq!(result.unwrap(), "ok");
    }
}
