//! Upstream fetching
//!
//! One GET per relay request: browser-like headers, redirects followed under
//! the SSRF guard, a single deadline covering the whole exchange and a cap on
//! the buffered body.

use std::sync::Arc;

use axum::body::Bytes;
use hyper::ext::ReasonPhrase;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::guard::{find_block_reason, redirect_policy, GuardedResolver, SsrfGuard};
use crate::model::{BodyCap, UpstreamResponse};

/// Desktop Chrome user agent, so origins do not treat the relay as a bot
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";

/// Builds the outbound client
///
/// The guard is wired in twice: the resolver filters DNS answers and the
/// redirect policy checks every hop. Compression is negotiated and decoded
/// by the client itself.
pub fn build_client(config: &RelayConfig, guard: Arc<SsrfGuard>) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE));
    headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));

    Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(headers)
        .redirect(redirect_policy(guard.clone(), config.max_redirects))
        .dns_resolver(Arc::new(GuardedResolver::new(guard)))
        .connect_timeout(config.timeout)
        .build()
}

/// Fetches `url`, following redirects, within the configured timeout
///
/// Dropping the in-flight future on expiry aborts the connection, so a
/// hanging upstream does not outlive the request.
///
/// # Errors
///
/// - [`RelayError::Timeout`] - the deadline passed
/// - [`RelayError::Blocked`] - a redirect hop or DNS answer hit the guard
/// - [`RelayError::Upstream`] - the final response was not 2xx
/// - [`RelayError::TooLarge`] - the body exceeded a [`BodyCap::Reject`] cap
/// - [`RelayError::Connection`] - anything else on the wire
pub async fn fetch(
    client: &Client,
    url: &Url,
    config: &RelayConfig,
) -> Result<UpstreamResponse, RelayError> {
    match tokio::time::timeout(config.timeout, fetch_inner(client, url, config.body_cap)).await {
        Ok(result) => result,
        Err(_) => {
            info!(%url, timeout_ms = config.timeout.as_millis() as u64, "upstream timed out");
            Err(RelayError::Timeout)
        }
    }
}

async fn fetch_inner(
    client: &Client,
    url: &Url,
    body_cap: BodyCap,
) -> Result<UpstreamResponse, RelayError> {
    let mut response = client
        .get(url.clone())
        .send()
        .await
        .map_err(classify_transport_error)?;

    let status = response.status();
    let final_url = response.url().clone();

    if !status.is_success() {
        // hyper only records the phrase when it is not the canonical one
        let reason = response
            .extensions()
            .get::<ReasonPhrase>()
            .map(|phrase| String::from_utf8_lossy(phrase.as_bytes()).into_owned());
        return Err(RelayError::Upstream { status, reason });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if let (BodyCap::Reject(limit), Some(len)) = (body_cap, response.content_length()) {
        if len > limit as u64 {
            return Err(RelayError::TooLarge { limit });
        }
    }

    let mut body: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(classify_transport_error)? {
        match body_cap {
            BodyCap::Unlimited => body.extend_from_slice(&chunk),
            BodyCap::Reject(limit) => {
                if body.len() + chunk.len() > limit {
                    return Err(RelayError::TooLarge { limit });
                }
                body.extend_from_slice(&chunk);
            }
            BodyCap::Truncate(limit) => {
                let room = limit.saturating_sub(body.len());
                body.extend_from_slice(&chunk[..room.min(chunk.len())]);
                if body.len() >= limit {
                    debug!(%final_url, limit, "truncating upstream body");
                    break;
                }
            }
        }
    }

    debug!(
        %final_url,
        status = status.as_u16(),
        content_type = %content_type,
        bytes = body.len(),
        "upstream fetched"
    );

    Ok(UpstreamResponse {
        final_url,
        status,
        content_type,
        body: Bytes::from(body),
    })
}

/// Maps a client error onto the relay taxonomy
fn classify_transport_error(err: reqwest::Error) -> RelayError {
    if let Some(reason) = find_block_reason(&err) {
        return RelayError::Blocked(reason.clone());
    }
    if err.is_timeout() {
        return RelayError::Timeout;
    }
    RelayError::Connection {
        message: describe(&err),
    }
}

/// Error message including its sources, e.g. `error sending request: dns error: ...`
fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    message
}
