use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use scraper_tools::error::AppError;
use scraper_tools::proxy::{BrowserProxy, Proxy};
use scraper_tools::traits::Fetcher;

use crate::resources::{ResourceType, route_requests};
use crate::tab::{Tab, render_in_tab};

/// Launch settings for a [`BrowserSession`].
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Deadline for opening a page and reading its content.
    pub timeout: Duration,

    /// Upstream proxy for every page of the session.
    pub proxy: Option<BrowserProxy>,

    /// Resource types aborted on every page the session opens.
    pub blocked: Vec<ResourceType>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            proxy: None,
            blocked: Vec::new(),
        }
    }
}

impl BrowserOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Selects one proxy from `proxy` for the lifetime of the session.
    ///
    /// Chromium takes a single `--proxy-server`, so a rotating proxy
    /// advances once per launched session rather than per request.
    pub fn with_proxy<P: Proxy + ?Sized>(mut self, proxy: &P) -> Self {
        self.proxy = Some(proxy.browser());
        self
    }

    pub fn block(mut self, resources: &[ResourceType]) -> Self {
        self.blocked = resources.to_vec();
        self
    }
}

/// A headless Chromium process driven over the Chrome DevTools Protocol.
///
/// Clones share the same browser process. Every page opened through
/// [`open`](Self::open) gets the session's resource blocking and proxy
/// authentication installed before it navigates.
#[derive(Clone)]
pub struct BrowserSession {
    browser: Arc<Browser>,
    options: BrowserOptions,
}

impl BrowserSession {
    /// Launches headless Chromium.
    ///
    /// Requires a Chromium / Chrome binary reachable via `$PATH`, the
    /// `CHROME_BIN` variable, or the default locations checked by
    /// `chromiumoxide`.
    pub async fn launch(options: BrowserOptions) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder();
        builder = builder.no_sandbox().disable_default_args();

        // Snap-packaged Chromium ships a wrapper that drops standard Chrome
        // flags (--headless, --disable-gpu, ...); prefer the real binary.
        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        builder = builder
            .request_timeout(options.timeout)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-translate")
            .arg("--no-first-run");

        if let Some(proxy) = &options.proxy {
            tracing::info!(server = %proxy.server, "Launching browser behind proxy");
            builder = builder.arg(format!("--proxy-server={}", proxy.server));
        }

        let config = builder
            .build()
            .map_err(|e| AppError::BrowserError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            options,
        })
    }

    /// Tries to locate the real Chrome/Chromium binary.
    ///
    /// Honours `CHROME_BIN`, then looks inside the snap, then at well-known
    /// system paths. `None` lets `chromiumoxide` do its own lookup.
    fn find_chrome_binary() -> Option<PathBuf> {
        let candidates: &[&str] = &[
            // Snap (Ubuntu default)
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            // Flatpak
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            // Common apt / manual installs
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ];

        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        candidates
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    pub fn options(&self) -> &BrowserOptions {
        &self.options
    }

    /// Opens a new tab, installs request routing, and navigates to `url`.
    ///
    /// The tab is closed again if routing or navigation fails.
    pub async fn open(&self, url: &str) -> Result<Page, AppError> {
        let page = self.new_tab().await?;
        match self.navigate(&page, url).await {
            Ok(()) => Ok(page),
            Err(e) => {
                Tab::close(page).await;
                Err(e)
            }
        }
    }

    async fn new_tab(&self) -> Result<Page, AppError> {
        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to open tab: {e}")))
    }

    async fn navigate(&self, page: &Page, url: &str) -> Result<(), AppError> {
        route_requests(page, &self.options.blocked, self.options.proxy.as_ref()).await?;

        page.goto(url)
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to navigate to {url}: {e}")))?;
        Ok(())
    }
}

impl Tab for Page {
    fn close(self) -> impl Future<Output = ()> + Send + 'static {
        async move {
            if let Err(e) = Page::close(self).await {
                tracing::debug!("Failed to close tab: {e}");
            }
        }
    }
}

/// Headless-browser [`Fetcher`] built on a [`BrowserSession`].
///
/// Unlike [`crate::ReqwestFetcher`], this renders JavaScript before
/// returning the HTML. Each [`Fetcher::fetch`] call opens a new tab, grabs
/// the rendered HTML, and closes the tab.
///
/// # Example
///
/// ```rust,no_run
/// use scraper_tools::Fetcher;
/// use scraper_tools_client::{BrowserFetcher, BrowserOptions, LIGHT_BLOCK_PRESET};
///
/// # async fn run() -> Result<(), scraper_tools::AppError> {
/// let options = BrowserOptions::default().block(LIGHT_BLOCK_PRESET);
/// let fetcher = BrowserFetcher::launch(options).await?;
/// let html = fetcher.fetch("https://example.com").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BrowserFetcher {
    session: BrowserSession,
}

impl BrowserFetcher {
    /// Launches a browser with default options (30 s timeout, no proxy,
    /// nothing blocked).
    pub async fn new() -> Result<Self, AppError> {
        Self::launch(BrowserOptions::default()).await
    }

    pub async fn launch(options: BrowserOptions) -> Result<Self, AppError> {
        Ok(Self::from_session(BrowserSession::launch(options).await?))
    }

    pub fn from_session(session: BrowserSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &BrowserSession {
        &self.session
    }
}

impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let page = self.session.new_tab().await?;

        render_in_tab(page, self.session.options.timeout, |page| async move {
            self.session.navigate(&page, url).await?;

            // Wait until <body> is present: a minimal signal that the page
            // has rendered its main content.
            page.find_element("body")
                .await
                .map_err(|e| AppError::BrowserError(format!("Page did not render body: {e}")))?;

            page.content()
                .await
                .map_err(|e| AppError::BrowserError(format!("Failed to read page content: {e}")))
        })
        .await
    }
}
