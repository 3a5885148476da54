use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::cookie::Jar;
use scraper_tools::error::AppError;
use scraper_tools::traits::Fetcher;

use crate::proxy::ReqwestProxyExt;

const DEFAULT_USER_AGENT: &str = concat!("scraper-tools/", env!("CARGO_PKG_VERSION"));

/// HTTP fetcher using reqwest.
///
/// Downloads raw HTML with a configurable User-Agent and timeout, and can
/// route every request through a proxy and send cookies carried over from
/// a browser session.
///
/// # Example
///
/// ```rust,no_run
/// use scraper_tools::{Fetcher, load_proxy_env};
/// use scraper_tools_client::ReqwestFetcher;
///
/// # async fn run() -> Result<(), scraper_tools::AppError> {
/// let fetcher = ReqwestFetcher::builder().proxy(&load_proxy_env()?).build()?;
/// let html = fetcher.fetch("https://example.com").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout: Duration,
}

impl ReqwestFetcher {
    /// A direct fetcher with a **30 s** timeout.
    ///
    /// System proxy variables are ignored; use [`ReqwestFetcherBuilder::proxy`]
    /// to route through a proxy.
    pub fn new() -> Result<Self, AppError> {
        Self::builder().build()
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        Self::builder().timeout(timeout).build()
    }

    pub fn builder() -> ReqwestFetcherBuilder {
        ReqwestFetcherBuilder::default()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Builder for [`ReqwestFetcher`].
pub struct ReqwestFetcherBuilder {
    timeout: Duration,
    user_agent: String,
    proxy: Option<Result<reqwest::Proxy, AppError>>,
    rotating_proxy: bool,
    cookies: Option<Arc<Jar>>,
}

impl Default for ReqwestFetcherBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            rotating_proxy: false,
            cookies: None,
        }
    }
}

impl ReqwestFetcherBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Routes requests through `proxy`. A rotating proxy advances per request.
    pub fn proxy<P: ReqwestProxyExt + ?Sized>(mut self, proxy: &P) -> Self {
        self.proxy = Some(proxy.reqwest());
        self.rotating_proxy = proxy.rotates();
        self
    }

    /// Sends the cookies stored in `jar` (see [`crate::cookies::cookie_jar`]).
    pub fn cookies(mut self, jar: Arc<Jar>) -> Self {
        self.cookies = Some(jar);
        self
    }

    pub fn build(self) -> Result<ReqwestFetcher, AppError> {
        let mut builder = Client::builder()
            .user_agent(self.user_agent)
            .timeout(self.timeout);

        // Without an explicit proxy, ignore HTTP_PROXY/HTTPS_PROXY from the environment.
        builder = match self.proxy {
            Some(proxy) => builder.proxy(proxy?),
            None => builder.no_proxy(),
        };
        if self.rotating_proxy {
            builder = builder.pool_max_idle_per_host(0);
        }
        if let Some(jar) = self.cookies {
            builder = builder.cookie_provider(jar);
        }

        let client = builder
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(ReqwestFetcher {
            client,
            timeout: self.timeout,
        })
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use scraper_tools::proxy::{ProxyScheme, RotatingProxy, StaticProxy};

    use super::*;

    #[test]
    fn builds_without_proxy() {
        assert!(ReqwestFetcher::new().is_ok());
    }

    #[test]
    fn builds_with_rotating_proxy() {
        let rotating = RotatingProxy::new(vec![
            StaticProxy::new(ProxyScheme::Http, "a.example.com", 1),
            StaticProxy::new(ProxyScheme::Socks5, "b.example.com", 2),
        ])
        .unwrap();

        let fetcher = ReqwestFetcher::builder()
            .timeout(Duration::from_secs(5))
            .user_agent("test-agent")
            .proxy(&rotating)
            .build();
        assert!(fetcher.is_ok());
    }
}
