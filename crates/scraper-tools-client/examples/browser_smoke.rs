/// Smoke-test for `BrowserSession` with resource blocking and cookie extraction.
///
/// Launches a headless Chromium (behind the env-configured proxy, if any),
/// opens <https://example.com> with the light block preset, checks the
/// rendered `<h1>`, and prints the cookies the page set.
///
/// Run with:
///   cargo run --example browser_smoke --features browser
use scraper_tools::{AppError, load_proxy_env};
use scraper_tools_client::{BrowserOptions, BrowserSession, LIGHT_BLOCK_PRESET, extract_cookies};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let mut options = BrowserOptions::default().block(LIGHT_BLOCK_PRESET);
    match load_proxy_env() {
        Ok(proxy) => options = options.with_proxy(&proxy),
        Err(AppError::NoProxyConfigured) => println!("No proxy configured, going direct"),
        Err(e) => return Err(e.into()),
    }

    println!("Launching headless browser…");
    let session = BrowserSession::launch(options).await?;

    let url = "https://example.com";
    println!("Opening {url} …");
    let page = session.open(url).await?;
    let html = page.content().await?;

    assert!(
        html.contains("<h1>Example Domain</h1>"),
        "Expected <h1> not found in rendered HTML"
    );

    let cookies = extract_cookies(&page).await?;
    println!("OK: got {} bytes of HTML and {} cookies", html.len(), cookies.len());
    for (name, value) in cookies {
        println!("  {name}={value}");
    }
    Ok(())
}
