//! Conversion of scraper-tools proxies into `reqwest` proxies.

use scraper_tools::error::AppError;
use scraper_tools::proxy::{AnyProxy, Proxy, RotatingProxy, StaticProxy};

/// Builds a [`reqwest::Proxy`] that routes all schemes through this proxy.
pub trait ReqwestProxyExt {
    fn reqwest(&self) -> Result<reqwest::Proxy, AppError>;

    /// Whether consecutive requests may go through different proxies.
    ///
    /// Clients must not keep idle connections for such proxies, or a
    /// pooled connection would pin every request to one upstream.
    fn rotates(&self) -> bool {
        false
    }
}

impl ReqwestProxyExt for StaticProxy {
    /// Basic auth is attached only when both username and password are set.
    fn reqwest(&self) -> Result<reqwest::Proxy, AppError> {
        let proxy = reqwest::Proxy::all(self.server()).map_err(|e| {
            AppError::InvalidProxy(format!("Invalid proxy {}: {e}", self.masked()))
        })?;

        Ok(match (&self.username, &self.password) {
            (Some(username), Some(password)) => proxy.basic_auth(username, password),
            _ => proxy,
        })
    }
}

impl ReqwestProxyExt for RotatingProxy {
    /// Every request made by the client picks the next proxy in the rotation.
    fn reqwest(&self) -> Result<reqwest::Proxy, AppError> {
        // Reject unusable entries now; the resolver below cannot report errors.
        for proxy in self.proxies() {
            proxy.url()?;
        }

        let rotating = self.clone();
        Ok(reqwest::Proxy::custom(move |_target| rotating.url().ok()))
    }

    fn rotates(&self) -> bool {
        self.len() > 1
    }
}

impl ReqwestProxyExt for AnyProxy {
    fn reqwest(&self) -> Result<reqwest::Proxy, AppError> {
        match self {
            AnyProxy::Static(proxy) => proxy.reqwest(),
            AnyProxy::Rotating(proxy) => proxy.reqwest(),
        }
    }

    fn rotates(&self) -> bool {
        match self {
            AnyProxy::Static(proxy) => proxy.rotates(),
            AnyProxy::Rotating(proxy) => proxy.rotates(),
        }
    }
}
