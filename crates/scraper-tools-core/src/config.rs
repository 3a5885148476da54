//! Proxy configuration read from environment variables.
//!
//! Two shapes are supported:
//!
//! - [`ProxyFile`]: `PROXY_FILE_PATH` (required) and `PROXY_SCHEME`
//!   (optional, defaults to `http`). Every line of the file is a proxy row.
//! - [`ProxyEnv`]: a single proxy from `PROXY_HOST` (or `PROXY_SERVER`),
//!   `PROXY_PORT`, `PROXY_SCHEME`, and optional `PROXY_USERNAME` /
//!   `PROXY_PASSWORD`.
//!
//! [`load_proxy_env`] tries the file first and falls back to the single
//! proxy.

use std::path::PathBuf;

use crate::error::AppError;
use crate::proxy::{AnyProxy, ProxyScheme, RotatingProxy, StaticProxy, parse_proxy_rows};

pub const PROXY_FILE_PATH: &str = "PROXY_FILE_PATH";
pub const PROXY_SCHEME: &str = "PROXY_SCHEME";
pub const PROXY_HOST: &str = "PROXY_HOST";
pub const PROXY_SERVER: &str = "PROXY_SERVER";
pub const PROXY_PORT: &str = "PROXY_PORT";
pub const PROXY_USERNAME: &str = "PROXY_USERNAME";
pub const PROXY_PASSWORD: &str = "PROXY_PASSWORD";

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Looks up `key`, treating empty values as unset.
fn optional<L>(lookup: &L, key: &str) -> Option<String>
where
    L: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn required<L>(lookup: &L, key: &str) -> Result<String, AppError>
where
    L: Fn(&str) -> Option<String>,
{
    optional(lookup, key).ok_or_else(|| AppError::MissingEnv(key.to_string()))
}

fn parse_scheme(raw: &str) -> Result<ProxyScheme, AppError> {
    raw.parse().map_err(|e: AppError| {
        AppError::ConfigError(format!("Invalid {PROXY_SCHEME}: {e}"))
    })
}

/// Configuration to read multiple proxies from a proxy file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyFile {
    pub path: PathBuf,
    pub scheme: ProxyScheme,
}

impl ProxyFile {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, AppError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let path = required(&lookup, PROXY_FILE_PATH)?;
        let scheme = match optional(&lookup, PROXY_SCHEME) {
            Some(raw) => parse_scheme(&raw)?,
            None => ProxyScheme::Http,
        };

        Ok(Self {
            path: PathBuf::from(path),
            scheme,
        })
    }

    /// Reads the file into a [`RotatingProxy`].
    ///
    /// Blank lines are skipped. A missing file surfaces as
    /// [`AppError::Io`] with kind `NotFound`.
    pub fn load(&self) -> Result<RotatingProxy, AppError> {
        let contents = std::fs::read_to_string(&self.path)?;
        let proxies = parse_proxy_rows(&contents, self.scheme)?;
        if proxies.is_empty() {
            return Err(AppError::InvalidProxy(format!(
                "Proxy file {} contains no proxies",
                self.path.display()
            )));
        }

        tracing::debug!(
            path = %self.path.display(),
            count = proxies.len(),
            "Loaded proxy file"
        );
        RotatingProxy::new(proxies)
    }
}

/// Configuration for a single static proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEnv {
    pub host: String,
    pub scheme: ProxyScheme,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyEnv {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, AppError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let host = match optional(&lookup, PROXY_HOST) {
            Some(host) => host,
            None => required(&lookup, PROXY_SERVER)
                .map_err(|_| AppError::MissingEnv(PROXY_HOST.to_string()))?,
        };
        let scheme = parse_scheme(&required(&lookup, PROXY_SCHEME)?)?;

        let raw_port = required(&lookup, PROXY_PORT)?;
        let port: u16 = raw_port.trim().parse().map_err(|_| {
            AppError::ConfigError(format!(
                "Invalid {PROXY_PORT} '{raw_port}': must be an integer between 0 and 65535"
            ))
        })?;

        Ok(Self {
            host,
            scheme,
            port,
            username: optional(&lookup, PROXY_USERNAME),
            password: optional(&lookup, PROXY_PASSWORD),
        })
    }

    pub fn proxy(&self) -> StaticProxy {
        StaticProxy {
            scheme: self.scheme,
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

/// Loads a proxy from the process environment.
///
/// See [`load_proxy_env_from`].
pub fn load_proxy_env() -> Result<AnyProxy, AppError> {
    load_proxy_env_from(process_env)
}

/// Loads a proxy from `lookup`, preferring a proxy file over a single proxy.
///
/// Only an unset required variable moves on to the next source. Invalid
/// values and unreadable files are returned as errors.
pub fn load_proxy_env_from<L>(lookup: L) -> Result<AnyProxy, AppError>
where
    L: Fn(&str) -> Option<String>,
{
    match ProxyFile::from_lookup(&lookup) {
        Ok(file) => return file.load().map(AnyProxy::Rotating),
        Err(AppError::MissingEnv(_)) => {}
        Err(e) => return Err(e),
    }

    match ProxyEnv::from_lookup(&lookup) {
        Ok(env) => Ok(AnyProxy::Static(env.proxy())),
        Err(AppError::MissingEnv(var)) => {
            tracing::debug!(missing = %var, "No proxy configuration in environment");
            Err(AppError::NoProxyConfigured)
        }
        Err(e) => Err(e),
    }
}
