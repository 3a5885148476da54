use std::time::Duration;

use thiserror::Error;

/// Error types shared by every scraper-tools crate.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed or returned a non-success status.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Operation did not finish within its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A proxy row, scheme, or port could not be parsed.
    #[error("{0}")]
    InvalidProxy(String),

    /// A required environment variable is not set.
    #[error("{0} not set")]
    MissingEnv(String),

    /// A configuration value is present but malformed.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Neither a proxy file nor a single-proxy configuration was found.
    #[error(
        "No valid proxy settings found. Provide either PROXY_FILE_PATH or PROXY_HOST, PROXY_PORT and PROXY_SCHEME"
    )]
    NoProxyConfigured,

    /// Filesystem error (e.g. reading a proxy file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Headless browser launch or CDP command failed.
    #[error("Browser error: {0}")]
    BrowserError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpError(msg) => {
                msg.contains("HTTP 429")
                    || msg.contains("HTTP 5")
                    || msg.contains("timeout")
                    || msg.contains("connect")
                    || msg.contains("reset")
            }
            _ => false,
        }
    }
}
