//! Proxy abstractions, including manually rotating proxies.
//!
//! A [`StaticProxy`] points at a single upstream; a [`RotatingProxy`] cycles
//! through a list of them. Both implement [`Proxy`], so callers can ask for
//! the next server, URL, or browser settings without caring which kind
//! they hold. HTTP-client conversions live in `scraper-tools-client`.
//!
//! # Proxy rows
//!
//! Proxy lists use one proxy per line in either of these forms:
//!
//! ```text
//! host:port:username:password
//! host:port
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;

const INVALID_ROW: &str =
    "Invalid proxy row. Expected format should be: 'host:port:username:password' or 'host:port'";

/// Protocol spoken by the proxy server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    #[default]
    Http,
    Socks5,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Socks5 => "socks5",
        }
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyScheme {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyScheme::Http),
            "socks5" => Ok(ProxyScheme::Socks5),
            other => Err(AppError::InvalidProxy(format!(
                "Invalid proxy scheme '{other}': expected 'http' or 'socks5'"
            ))),
        }
    }
}

/// Proxy settings in the shape a browser launcher expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserProxy {
    /// `scheme://host:port`, suitable for `--proxy-server`.
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BrowserProxy {
    /// Credentials, only when both halves are present.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}

/// Common interface over static and rotating proxies.
///
/// Only [`select`](Proxy::select) is required. Every provided method
/// selects exactly once, so on a [`RotatingProxy`] each call advances the
/// rotation by one.
pub trait Proxy: Send + Sync {
    /// Returns the proxy to use for the next connection.
    fn select(&self) -> StaticProxy;

    /// `scheme://host:port` of the selected proxy.
    fn server(&self) -> String {
        self.select().server()
    }

    /// Generic URL (with credentials) for clients that take a proxy URL.
    fn url(&self) -> Result<Url, AppError> {
        self.select().url()
    }

    /// Settings for a headless browser.
    fn browser(&self) -> BrowserProxy {
        self.select().browser()
    }
}

/// A proxy configured with a specific target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaticProxy {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl StaticProxy {
    pub fn new(scheme: ProxyScheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Parses a row of a standard proxy file.
    ///
    /// Accepts `host:port:username:password` or `host:port`; surrounding
    /// whitespace is ignored.
    pub fn from_proxy_row(row: &str, scheme: ProxyScheme) -> Result<Self, AppError> {
        let parts: Vec<&str> = row.trim().split(':').collect();
        match parts.as_slice() {
            [host, port, username, password] => Ok(Self {
                scheme,
                host: parse_host(host)?,
                port: parse_port(port)?,
                username: Some((*username).to_string()),
                password: Some((*password).to_string()),
            }),
            [host, port] => Ok(Self {
                scheme,
                host: parse_host(host)?,
                port: parse_port(port)?,
                username: None,
                password: None,
            }),
            _ => Err(AppError::InvalidProxy(INVALID_ROW.to_string())),
        }
    }

    pub fn server(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    pub fn url(&self) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.server()).map_err(|e| {
            AppError::InvalidProxy(format!("Invalid proxy address {}: {e}", self.server()))
        })?;

        if let Some(username) = &self.username {
            url.set_username(username).map_err(|_| {
                AppError::InvalidProxy(format!("Cannot set username on {}", self.server()))
            })?;
        }
        if let Some(password) = &self.password {
            url.set_password(Some(password)).map_err(|_| {
                AppError::InvalidProxy(format!("Cannot set password on {}", self.server()))
            })?;
        }

        Ok(url)
    }

    pub fn browser(&self) -> BrowserProxy {
        BrowserProxy {
            server: self.server(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    /// Display form with the password hidden, for logs and CLI output.
    pub fn masked(&self) -> String {
        match (&self.username, &self.password) {
            (Some(u), Some(_)) => format!("{}://{u}:****@{}:{}", self.scheme, self.host, self.port),
            (Some(u), None) => format!("{}://{u}@{}:{}", self.scheme, self.host, self.port),
            _ => self.server(),
        }
    }
}

impl Proxy for StaticProxy {
    fn select(&self) -> StaticProxy {
        self.clone()
    }
}

fn parse_host(host: &str) -> Result<String, AppError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(AppError::InvalidProxy(INVALID_ROW.to_string()));
    }
    Ok(host.to_string())
}

fn parse_port(port: &str) -> Result<u16, AppError> {
    port.trim().parse().map_err(|_| {
        AppError::InvalidProxy(format!(
            "Invalid proxy port '{port}': must be an integer between 0 and 65535"
        ))
    })
}

/// Parses every non-empty line of a proxy list.
pub fn parse_proxy_rows(contents: &str, scheme: ProxyScheme) -> Result<Vec<StaticProxy>, AppError> {
    contents
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(n, line)| {
            StaticProxy::from_proxy_row(line, scheme).map_err(|e| match e {
                AppError::InvalidProxy(msg) => AppError::InvalidProxy(format!("{msg} (line {n})")),
                other => other,
            })
        })
        .collect()
}

/// A list of proxies handed out round-robin.
///
/// Clones share the same cursor, so a `RotatingProxy` can be cloned into
/// several tasks and still rotate as one.
#[derive(Debug, Clone)]
pub struct RotatingProxy {
    proxies: Arc<[StaticProxy]>,
    cursor: Arc<AtomicUsize>,
}

impl RotatingProxy {
    /// Fails if `proxies` is empty.
    pub fn new(proxies: impl IntoIterator<Item = StaticProxy>) -> Result<Self, AppError> {
        let proxies: Arc<[StaticProxy]> = proxies.into_iter().collect();
        if proxies.is_empty() {
            return Err(AppError::InvalidProxy(
                "A rotating proxy needs at least one proxy".into(),
            ));
        }
        Ok(Self {
            proxies,
            cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Returns the next proxy, wrapping around after the last one.
    pub fn next_proxy(&self) -> StaticProxy {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
        let proxy = self.proxies[index].clone();
        tracing::debug!(index, proxy = %proxy.masked(), "Rotating proxy");
        proxy
    }

    pub fn proxies(&self) -> &[StaticProxy] {
        &self.proxies
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

impl Proxy for RotatingProxy {
    fn select(&self) -> StaticProxy {
        self.next_proxy()
    }
}

impl Iterator for RotatingProxy {
    type Item = StaticProxy;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_proxy())
    }
}

/// Either kind of proxy, as produced by [`crate::config::load_proxy_env`].
#[derive(Debug, Clone)]
pub enum AnyProxy {
    Static(StaticProxy),
    Rotating(RotatingProxy),
}

impl Proxy for AnyProxy {
    fn select(&self) -> StaticProxy {
        match self {
            AnyProxy::Static(p) => p.clone(),
            AnyProxy::Rotating(p) => p.next_proxy(),
        }
    }
}

impl From<StaticProxy> for AnyProxy {
    fn from(proxy: StaticProxy) -> Self {
        AnyProxy::Static(proxy)
    }
}

impl From<RotatingProxy> for AnyProxy {
    fn from(proxy: RotatingProxy) -> Self {
        AnyProxy::Rotating(proxy)
    }
}
