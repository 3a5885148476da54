//! Tab lifetime for browser fetches.
//!
//! A tab left open keeps its request-routing task alive, so every fetch
//! closes its tab on all exit paths, including cancellation.

use std::future::Future;
use std::time::Duration;

use scraper_tools::error::AppError;
use scraper_tools::resilience::timeout;

/// A browser tab that has to be closed once a fetch is done with it.
pub(crate) trait Tab: Clone + Send + 'static {
    fn close(self) -> impl Future<Output = ()> + Send + 'static;
}

/// Closes the tab on drop unless [`TabGuard::close`] already did.
struct TabGuard<T: Tab>(Option<T>);

impl<T: Tab> TabGuard<T> {
    async fn close(mut self) {
        if let Some(tab) = self.0.take() {
            tab.close().await;
        }
    }
}

impl<T: Tab> Drop for TabGuard<T> {
    fn drop(&mut self) {
        // Only reached when the fetch future was dropped mid-flight.
        if let Some(tab) = self.0.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(tab.close());
            }
        }
    }
}

/// Runs `render` on `tab` within `limit`, then closes the tab.
///
/// The tab is closed whether rendering succeeds, fails or times out, and
/// also when the returned future is dropped before completion.
pub(crate) async fn render_in_tab<T, F, Fut>(
    tab: T,
    limit: Duration,
    render: F,
) -> Result<String, AppError>
where
    T: Tab,
    F: FnOnce(T) -> Fut,
    Fut: Future<Output = Result<String, AppError>>,
{
    let guard = TabGuard(Some(tab.clone()));
    let result = timeout(limit, render(tab)).await;
    guard.close().await;
    result
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Clone, Default)]
    struct CountingTab {
        closed: Arc<AtomicUsize>,
    }

    impl CountingTab {
        fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
    }

    impl Tab for CountingTab {
        fn close(self) -> impl Future<Output = ()> + Send + 'static {
            let closed = self.closed;
            async move {
                closed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn closes_tab_after_success() {
        let tab = CountingTab::default();

        let html = render_in_tab(tab.clone(), Duration::from_secs(1), |_| async {
            Ok("<html></html>".to_string())
        })
        .await
        .unwrap();

        assert_eq!(html, "<html></html>");
        assert_eq!(tab.closed(), 1);
    }

    #[tokio::test]
    async fn closes_tab_after_render_error() {
        let tab = CountingTab::default();

        let err = render_in_tab(tab.clone(), Duration::from_secs(1), |_| async {
            Err(AppError::BrowserError("Page did not render body".into()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::BrowserError(_)));
        assert_eq!(tab.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closes_tab_after_timeout() {
        let tab = CountingTab::default();

        let err = render_in_tab(tab.clone(), Duration::from_secs(1), |_| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("late".to_string())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Timeout(_)));
        assert_eq!(tab.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closes_tab_when_fetch_is_cancelled() {
        let tab = CountingTab::default();

        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            render_in_tab(tab.clone(), Duration::from_secs(60), |_| {
                std::future::pending::<Result<String, AppError>>()
            }),
        )
        .await;
        assert!(cancelled.is_err());

        for _ in 0..10 {
            if tab.closed() > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(tab.closed(), 1);
    }
}
