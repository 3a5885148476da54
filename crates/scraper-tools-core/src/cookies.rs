//! Cookie conversion between a browser session and an HTTP client.
//!
//! Browser cookies carry a lot of metadata (domain, expiry, flags); an HTTP
//! client that reuses a browser session usually only needs `name=value`.

/// Reduces cookies to `(name, value)` pairs.
///
/// Pairs with an empty name or an empty value are dropped; order is kept.
pub fn convert_cookies<I, N, V>(cookies: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (N, V)>,
    N: Into<String>,
    V: Into<String>,
{
    cookies
        .into_iter()
        .map(|(name, value)| (name.into(), value.into()))
        .filter(|(name, value)| !name.is_empty() && !value.is_empty())
        .collect()
}

/// Renders pairs as a `Cookie` request header value: `a=1; b=2`.
pub fn cookie_header(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}
