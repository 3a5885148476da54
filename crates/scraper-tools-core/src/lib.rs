pub mod config;
pub mod cookies;
pub mod error;
pub mod proxy;
pub mod resilience;
#[cfg(test)]
pub mod testutil;
pub mod traits;

pub use config::{ProxyEnv, ProxyFile, load_proxy_env};
pub use error::AppError;
pub use proxy::{AnyProxy, BrowserProxy, Proxy, ProxyScheme, RotatingProxy, StaticProxy};
pub use resilience::{RetryPolicy, RetryingFetcher, retry, timeout};
pub use traits::Fetcher;
