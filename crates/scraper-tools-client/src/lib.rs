#[cfg(feature = "browser")]
pub mod browser_fetcher;
pub mod cookies;
pub mod fetcher;
pub mod proxy;
pub mod resources;
#[cfg(any(feature = "browser", test))]
mod tab;

#[cfg(feature = "browser")]
pub use browser_fetcher::{BrowserFetcher, BrowserOptions, BrowserSession};
#[cfg(feature = "browser")]
pub use cookies::{CookieSource, extract_cookies};
pub use cookies::{convert_cookies, cookie_header, cookie_jar};
pub use fetcher::{ReqwestFetcher, ReqwestFetcherBuilder};
pub use proxy::ReqwestProxyExt;
#[cfg(feature = "browser")]
pub use resources::{block_resources, route_requests};
pub use resources::{LIGHT_BLOCK_PRESET, ResourceType, parse_block_list, should_block};
