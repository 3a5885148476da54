//! Deadlines and retries for async operations.
//!
//! [`timeout`] bounds a single future. [`retry`] re-runs an operation
//! according to a [`RetryPolicy`], optionally bounding the whole loop
//! (sleeps included) by one deadline. [`RetryingFetcher`] applies a policy
//! to every call of a wrapped [`Fetcher`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use scraper_tools::resilience::{RetryPolicy, retry};
//!
//! # async fn run() -> Result<(), scraper_tools::AppError> {
//! let policy = RetryPolicy::new(3)
//!     .with_delay(Duration::from_millis(250))
//!     .with_timeout(Duration::from_secs(10));
//!
//! let body = retry(&policy, || async { Ok::<_, scraper_tools::AppError>("ok") }).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use crate::error::AppError;
use crate::traits::Fetcher;

/// Runs `future`, failing with [`AppError::Timeout`] if it takes longer
/// than `duration`.
pub async fn timeout<T, Fut>(duration: Duration, future: Fut) -> Result<T, AppError>
where
    Fut: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(duration)),
    }
}

/// How many times to run an operation and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of calls, including the first one. Always at least 1.
    pub attempts: u32,

    /// Pause between a failed call and the next one.
    pub delay: Duration,

    /// Deadline for the whole retry loop, sleeps included.
    pub timeout: Option<Duration>,

    /// Retry every error, or only those where [`AppError::is_retryable`]
    /// holds.
    pub retry_all: bool,
}

impl RetryPolicy {
    /// `attempts` calls with no delay and no deadline. Zero is treated as one.
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            delay: Duration::ZERO,
            timeout: None,
            retry_all: true,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Stop at the first error that is not transient.
    pub fn only_retryable(mut self) -> Self {
        self.retry_all = false;
        self
    }

    fn should_retry(&self, error: &AppError) -> bool {
        self.retry_all || error.is_retryable()
    }

    /// Shorthand for [`retry`] with this policy.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        retry(self, op).await
    }
}

impl Default for RetryPolicy {
    /// 3 attempts, 500ms apart, no deadline.
    fn default() -> Self {
        Self::new(3).with_delay(Duration::from_millis(500))
    }
}

/// Calls `op` until it succeeds or the policy gives up.
///
/// The last error is returned unchanged. When the policy has a deadline
/// and it passes first, the result is [`AppError::Timeout`].
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let attempts = run_attempts(policy, &mut op);
    match policy.timeout {
        Some(deadline) => timeout(deadline, attempts).await,
        None => attempts.await,
    }
}

async fn run_attempts<T, F, Fut>(policy: &RetryPolicy, op: &mut F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(e) if attempt < policy.attempts && policy.should_retry(&e) => {
                tracing::debug!(
                    attempt,
                    max_attempts = policy.attempts,
                    delay_ms = %policy.delay.as_millis(),
                    error = %e,
                    "Attempt failed, retrying"
                );
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
                attempt += 1;
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Giving up");
                return Err(e);
            }
        }
    }
}

/// A [`Fetcher`] wrapper that retries failed fetches.
#[derive(Clone)]
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
}

impl<F: Fetcher> RetryingFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl<F: Fetcher> Fetcher for RetryingFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        retry(&self.policy, || self.inner.fetch(url)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::testutil::MockFetcher;

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_passes_through_fast_futures() {
        let result = timeout(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, AppError>(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fails_slow_futures() {
        let result = timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, AppError>(())
        })
        .await;
        assert!(matches!(result, Err(AppError::Timeout(d)) if d == Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn retry_success_first_try() {
        let calls = counter();
        let policy = RetryPolicy::new(3);

        let result = retry(&policy, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AppError>("success")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_success_after_failure() {
        let calls = counter();
        let policy = RetryPolicy::new(3);

        let result = retry(&policy, || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 2 {
                    Err(AppError::Generic("Temporary failure".into()))
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_failure_all_attempts() {
        let calls = counter();
        let policy = RetryPolicy::new(3);

        let err = retry(&policy, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AppError::Generic("Persistent failure".into()))
            }
        })
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "Persistent failure");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_zero_attempts_still_calls_once() {
        let calls = counter();
        let policy = RetryPolicy::new(0);
        assert_eq!(policy.attempts, 1);

        let _ = retry(&policy, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AppError::Generic("nope".into()))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_with_timeout_raises_timeout() {
        // 0ms attempt 1 starts, 50ms it fails and the 100ms delay starts,
        // 120ms the deadline passes before attempt 2.
        let calls = counter();
        let policy = RetryPolicy::new(5)
            .with_delay(Duration::from_millis(100))
            .with_timeout(Duration::from_millis(120));

        let result = retry(&policy, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err::<(), _>(AppError::Generic("Trying...".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(AppError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_with_timeout_success_within_timeout() {
        let calls = counter();
        let policy = RetryPolicy::new(3)
            .with_delay(Duration::from_millis(50))
            .with_timeout(Duration::from_millis(200));

        let result = retry(&policy, || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(10)).await;
                if n < 2 {
                    Err(AppError::Generic("Temporary failure".into()))
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_with_timeout_failure_within_timeout() {
        let calls = counter();
        let policy = RetryPolicy::new(2)
            .with_delay(Duration::from_millis(50))
            .with_timeout(Duration::from_millis(200));

        let err = retry(&policy, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err::<(), _>(AppError::Generic("Persistent failure".into()))
            }
        })
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "Persistent failure");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_waits_between_attempts() {
        let policy = RetryPolicy::new(3).with_delay(Duration::from_millis(100));
        let start = tokio::time::Instant::now();

        let _ = retry(&policy, || async {
            Err::<(), _>(AppError::Generic("fail".into()))
        })
        .await;

        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn only_retryable_stops_on_permanent_errors() {
        let calls = counter();
        let policy = RetryPolicy::new(5).only_retryable();

        let err = retry(&policy, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AppError::HttpError("HTTP 404 for http://x".into()))
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::HttpError(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn only_retryable_retries_transient_errors() {
        let calls = counter();
        let policy = RetryPolicy::new(3).only_retryable();

        let _ = policy
            .run(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(AppError::NetworkError("reset".into()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retrying_fetcher_recovers() {
        let inner = MockFetcher::with_responses(vec![
            Err(AppError::NetworkError("reset".into())),
            Ok("<html>ok</html>".to_string()),
        ]);
        let fetcher = RetryingFetcher::new(inner.clone(), RetryPolicy::new(3));

        let html = fetcher.fetch("http://example.com").await.unwrap();
        assert_eq!(html, "<html>ok</html>");
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn retrying_fetcher_returns_last_error() {
        let inner = MockFetcher::with_responses(vec![
            Err(AppError::NetworkError("first".into())),
            Err(AppError::HttpError("HTTP 500 for http://example.com".into())),
        ]);
        let fetcher = RetryingFetcher::new(inner.clone(), RetryPolicy::new(2));

        let err = fetcher.fetch("http://example.com").await.unwrap_err();
        assert!(matches!(err, AppError::HttpError(_)));
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn retrying_fetcher_returns_first_success() {
        let inner = MockFetcher::new("<p>hi</p>");
        let fetcher = RetryingFetcher::new(inner.clone(), RetryPolicy::new(3));

        assert_eq!(fetcher.fetch("http://example.com").await.unwrap(), "<p>hi</p>");
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn retrying_fetcher_gives_up_on_permanent_error() {
        let inner = MockFetcher::with_error(AppError::HttpError(
            "HTTP 404 for http://example.com".into(),
        ));
        let fetcher = RetryingFetcher::new(inner.clone(), RetryPolicy::new(3).only_retryable());

        let err = fetcher.fetch("http://example.com").await.unwrap_err();
        assert!(matches!(err, AppError::HttpError(ref msg) if msg.contains("404")));
        assert_eq!(inner.calls(), 1);
    }

    #[test]
    fn default_policy_is_sensible() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.delay, Duration::from_millis(500));
        assert_eq!(policy.timeout, None);
        assert!(policy.retry_all);
    }
}
