//! Moving cookies from a headless browser into an HTTP client.
//!
//! Typical flow: pass a login or bot check in the browser, pull its cookies
//! with [`extract_cookies`], then hand them to a [`crate::ReqwestFetcher`]
//! through [`cookie_jar`].

use std::sync::Arc;

use reqwest::cookie::Jar;
use url::Url;

pub use scraper_tools::cookies::{convert_cookies, cookie_header};

/// A reqwest cookie jar holding `pairs`, scoped to `url`.
pub fn cookie_jar(pairs: &[(String, String)], url: &Url) -> Arc<Jar> {
    let jar = Jar::default();
    for (name, value) in pairs {
        jar.add_cookie_str(&format!("{name}={value}"), url);
    }
    Arc::new(jar)
}

#[cfg(feature = "browser")]
mod browser {
    use std::future::Future;

    use chromiumoxide::Page;
    use chromiumoxide::cdp::browser_protocol::network::Cookie;
    use scraper_tools::cookies::convert_cookies;
    use scraper_tools::error::AppError;

    use crate::browser_fetcher::BrowserSession;

    /// Something that holds browser cookies: a whole session or one page.
    pub trait CookieSource: Send + Sync {
        fn browser_cookies(&self) -> impl Future<Output = Result<Vec<Cookie>, AppError>> + Send;
    }

    impl CookieSource for Page {
        async fn browser_cookies(&self) -> Result<Vec<Cookie>, AppError> {
            self.get_cookies()
                .await
                .map_err(|e| AppError::BrowserError(format!("Failed to read page cookies: {e}")))
        }
    }

    impl CookieSource for BrowserSession {
        async fn browser_cookies(&self) -> Result<Vec<Cookie>, AppError> {
            self.browser()
                .get_cookies()
                .await
                .map_err(|e| AppError::BrowserError(format!("Failed to read browser cookies: {e}")))
        }
    }

    /// Returns the `(name, value)` pairs of every cookie in `source`.
    pub async fn extract_cookies<S: CookieSource>(
        source: &S,
    ) -> Result<Vec<(String, String)>, AppError> {
        let cookies = source.browser_cookies().await?;
        tracing::debug!(count = cookies.len(), "Extracted browser cookies");
        Ok(convert_cookies(
            cookies.into_iter().map(|cookie| (cookie.name, cookie.value)),
        ))
    }
}

#[cfg(feature = "browser")]
pub use browser::{CookieSource, extract_cookies};
