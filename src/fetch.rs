use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use reqwest::Url;
use tracing::{info, warn};

use crate::config::ALLOWED_DOMAINS;
use crate::db::FetchRow;

const USER_AGENT: &str = concat!("noaa_precip/", env!("CARGO_PKG_VERSION"));
const TIMEOUT: Duration = Duration::from_secs(30);

pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

/// Parse `url` and reject hosts outside the allow-list unless `any_host`.
pub fn check_url(url: &str, any_host: bool) -> Result<Url> {
    let parsed = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("Unsupported scheme '{}' in {}", parsed.scheme(), url);
    }
    if any_host {
        return Ok(parsed);
    }
    let host = parsed.host_str().unwrap_or_default();
    if !ALLOWED_DOMAINS.contains(&host) {
        bail!(
            "Host '{}' is not allowed (allowed: {}); pass --any-host to override",
            host,
            ALLOWED_DOMAINS.join(", ")
        );
    }
    Ok(parsed)
}

/// Fetch one page. HTTP and transport failures come back inside the row so
/// the attempt is still recorded.
pub async fn fetch_page(client: &reqwest::Client, url: &Url) -> FetchRow {
    let start = Instant::now();
    let response = client.get(url.clone()).send().await;

    let row = match response {
        Ok(resp) => {
            let status = resp.status();
            let body = resp.text().await;
            let latency_ms = Some(start.elapsed().as_millis() as i64);
            match body {
                Ok(html) if status.is_success() => FetchRow {
                    url: url.to_string(),
                    html: Some(html),
                    status: Some(status.as_u16() as i32),
                    error: None,
                    latency_ms,
                },
                Ok(_) => FetchRow {
                    url: url.to_string(),
                    html: None,
                    status: Some(status.as_u16() as i32),
                    error: Some(format!("HTTP {}", status)),
                    latency_ms,
                },
                Err(e) => FetchRow {
                    url: url.to_string(),
                    html: None,
                    status: Some(status.as_u16() as i32),
                    error: Some(e.to_string()),
                    latency_ms,
                },
            }
        }
        Err(e) => FetchRow {
            url: url.to_string(),
            html: None,
            status: None,
            error: Some(e.to_string()),
            latency_ms: Some(start.elapsed().as_millis() as i64),
        },
    };

    match &row.error {
        None => info!(
            "Fetched {} ({} bytes, {}ms)",
            row.url,
            row.html.as_ref().map_or(0, String::len),
            row.latency_ms.unwrap_or_default()
        ),
        Some(e) => warn!("Fetch failed for {}: {}", row.url, e),
    }
    row
}
