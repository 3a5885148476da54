use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scraper_tools::config::load_proxy_env;
use scraper_tools::proxy::{AnyProxy, Proxy};
use scraper_tools::resilience::{RetryPolicy, RetryingFetcher};
use scraper_tools::{AppError, Fetcher};
use scraper_tools_client::{ReqwestFetcher, ResourceType, parse_block_list};

#[derive(Parser)]
#[command(name = "scraper-tools", version, about = "Proxy, retry and browser helpers for scrapers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the proxies configured through PROXY_* environment variables
    Proxy {
        /// Number of proxies to take from the rotation
        #[arg(short, long, default_value_t = 1)]
        count: usize,

        /// Print passwords instead of masking them
        #[arg(long, default_value_t = false)]
        show_password: bool,
    },

    /// Fetch a page through the configured proxy and print its body
    Fetch {
        /// Target URL
        #[arg(short, long)]
        url: String,

        /// Total number of attempts
        #[arg(long, env = "SCRAPER_TOOLS_ATTEMPTS", default_value_t = 3)]
        attempts: u32,

        /// Delay between attempts, in milliseconds
        #[arg(long, env = "SCRAPER_TOOLS_DELAY_MS", default_value_t = 500)]
        delay_ms: u64,

        /// Per-request timeout, in seconds
        #[arg(long, env = "SCRAPER_TOOLS_TIMEOUT_SECS", default_value_t = 30)]
        timeout_secs: u64,

        /// Deadline for all attempts together, in seconds
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Connect directly even if a proxy is configured
        #[arg(long, default_value_t = false)]
        no_proxy: bool,

        /// Render the page in headless Chromium (requires the `browser` feature)
        #[arg(long, default_value_t = false)]
        browser: bool,

        /// Resources to block in the browser: `light`, `none`, or a list like `image,font`
        #[arg(long, requires = "browser", value_parser = parse_block_arg)]
        block: Option<BlockList>,
    },

    /// Open a page in headless Chromium and print its cookies as JSON
    Cookies {
        /// Target URL
        #[arg(short, long)]
        url: String,

        /// Connect directly even if a proxy is configured
        #[arg(long, default_value_t = false)]
        no_proxy: bool,

        /// Navigation timeout, in seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
}

/// Parsed `--block` value.
#[derive(Debug, Clone, PartialEq)]
struct BlockList(Vec<ResourceType>);

fn parse_block_arg(raw: &str) -> Result<BlockList, String> {
    parse_block_list(raw).map(BlockList).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("scraper_tools=info".parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Proxy {
            count,
            show_password,
        } => cmd_proxy(count, show_password)?,
        Commands::Fetch {
            url,
            attempts,
            delay_ms,
            timeout_secs,
            deadline_secs,
            no_proxy,
            browser,
            block,
        } => {
            let mut policy = RetryPolicy::new(attempts).with_delay(Duration::from_millis(delay_ms));
            if let Some(secs) = deadline_secs {
                policy = policy.with_timeout(Duration::from_secs(secs));
            }
            let proxy = resolve_proxy(no_proxy)?;
            let timeout = Duration::from_secs(timeout_secs);

            let html = if browser {
                let block = block.map(|b| b.0).unwrap_or_default();
                fetch_with_browser(&url, proxy.as_ref(), &block, timeout, policy).await?
            } else {
                fetch_with_http(&url, proxy.as_ref(), timeout, policy).await?
            };
            println!("{html}");
        }
        Commands::Cookies {
            url,
            no_proxy,
            timeout_secs,
        } => {
            let proxy = resolve_proxy(no_proxy)?;
            cmd_cookies(&url, proxy.as_ref(), Duration::from_secs(timeout_secs)).await?;
        }
    }

    Ok(())
}

/// Loads the env proxy unless `no_proxy` is set; no configuration means a
/// direct connection.
fn resolve_proxy(no_proxy: bool) -> Result<Option<AnyProxy>> {
    if no_proxy {
        return Ok(None);
    }

    match load_proxy_env() {
        Ok(proxy) => Ok(Some(proxy)),
        Err(AppError::NoProxyConfigured) => {
            tracing::info!("No proxy configured, connecting directly");
            Ok(None)
        }
        Err(e) => Err(e).context("Failed to load proxy configuration"),
    }
}

fn cmd_proxy(count: usize, show_password: bool) -> Result<()> {
    let proxy = load_proxy_env().context("Failed to load proxy configuration")?;

    let kind = match &proxy {
        AnyProxy::Static(_) => "static".to_string(),
        AnyProxy::Rotating(rotating) => format!("rotating ({} proxies)", rotating.len()),
    };
    println!("Proxy: {kind}\n");

    for i in 0..count {
        let selected = proxy.select();
        let shown = if show_password {
            selected.url()?.to_string()
        } else {
            selected.masked()
        };
        println!("  [{}] {}", i + 1, shown);
    }

    Ok(())
}

async fn fetch_with_http(
    url: &str,
    proxy: Option<&AnyProxy>,
    timeout: Duration,
    policy: RetryPolicy,
) -> Result<String> {
    let mut builder = ReqwestFetcher::builder().timeout(timeout);
    if let Some(proxy) = proxy {
        builder = builder.proxy(proxy);
    }
    let fetcher = builder.build().context("Failed to create HTTP client")?;

    tracing::info!("Fetching {}", url);
    let html = RetryingFetcher::new(fetcher, policy)
        .fetch(url)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!("Fetched {} bytes", html.len());

    Ok(html)
}

#[cfg(feature = "browser")]
async fn fetch_with_browser(
    url: &str,
    proxy: Option<&AnyProxy>,
    block: &[ResourceType],
    timeout: Duration,
    policy: RetryPolicy,
) -> Result<String> {
    use scraper_tools_client::{BrowserFetcher, BrowserOptions};

    let mut options = BrowserOptions::default().with_timeout(timeout).block(block);
    if let Some(proxy) = proxy {
        options = options.with_proxy(proxy);
    }
    let fetcher = BrowserFetcher::launch(options)
        .await
        .context("Failed to launch browser")?;

    tracing::info!("Rendering {}", url);
    let html = RetryingFetcher::new(fetcher, policy)
        .fetch(url)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!("Rendered {} bytes", html.len());

    Ok(html)
}

#[cfg(not(feature = "browser"))]
async fn fetch_with_browser(
    _url: &str,
    _proxy: Option<&AnyProxy>,
    _block: &[ResourceType],
    _timeout: Duration,
    _policy: RetryPolicy,
) -> Result<String> {
    anyhow::bail!("--browser requires scraper-tools to be built with the `browser` feature")
}

#[cfg(feature = "browser")]
async fn cmd_cookies(url: &str, proxy: Option<&AnyProxy>, timeout: Duration) -> Result<()> {
    use scraper_tools_client::{BrowserOptions, BrowserSession, extract_cookies};

    let mut options = BrowserOptions::default().with_timeout(timeout);
    if let Some(proxy) = proxy {
        options = options.with_proxy(proxy);
    }
    let session = BrowserSession::launch(options)
        .await
        .context("Failed to launch browser")?;

    tracing::info!("Opening {}", url);
    let page = scraper_tools::resilience::timeout(timeout, session.open(url))
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    let cookies = extract_cookies(&page)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    let as_json: serde_json::Map<String, serde_json::Value> = cookies
        .into_iter()
        .map(|(name, value)| (name, serde_json::Value::String(value)))
        .collect();
    println!("{}", serde_json::to_string_pretty(&as_json)?);

    Ok(())
}

#[cfg(not(feature = "browser"))]
async fn cmd_cookies(_url: &str, _proxy: Option<&AnyProxy>, _timeout: Duration) -> Result<()> {
    anyhow::bail!("cookies requires scraper-tools to be built with the `browser` feature")
}
