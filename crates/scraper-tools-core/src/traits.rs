use std::future::Future;

use crate::error::AppError;

/// Fetches the body of a page at `url`.
///
/// Implemented by the HTTP and browser fetchers in `scraper-tools-client`
/// and by wrappers such as [`crate::resilience::RetryingFetcher`].
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}
