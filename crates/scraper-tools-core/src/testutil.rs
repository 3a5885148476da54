//! Test utilities: a scripted mock fetcher.
//!
//! Uses `Arc<Mutex<_>>` so clones share the response queue and call count,
//! allowing assertions after the fetcher has been moved into a wrapper.

use std::sync::{Arc, Mutex};

use crate::error::AppError;
use crate::traits::Fetcher;

/// Mock fetcher that returns scripted responses in order.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns a default HTML string.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    calls: Arc<Mutex<u32>>,
}

impl MockFetcher {
    pub fn new(html: &str) -> Self {
        Self::with_responses(vec![Ok(html.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Number of times `fetch` has been called on this mock or its clones.
    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, _url: &str) -> Result<String, AppError> {
        *self.calls.lock().unwrap() += 1;
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("<html><body>default</body></html>".to_string())
        } else {
            responses.remove(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_fetcher_pops_in_order_then_defaults() {
        let fetcher = MockFetcher::with_responses(vec![
            Ok("first".into()),
            Err(AppError::Generic("second".into())),
        ]);

        assert_eq!(fetcher.fetch("u").await.unwrap(), "first");
        assert!(fetcher.fetch("u").await.is_err());
        assert!(fetcher.fetch("u").await.unwrap().contains("default"));
        assert_eq!(fetcher.calls(), 3);
    }
}
