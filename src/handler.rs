//! HTTP request handler for the content relay
//!
//! This module implements the relay operation:
//! - Validating the caller-supplied URL
//! - Refusing internal or private destinations
//! - Fetching the page and dispatching on its content type
//! - Turning every failure into an HTML error page

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{info, warn};
use url::Url;

use crate::config::AppState;
use crate::error::RelayError;
use crate::fetch::fetch;
use crate::model::{ContentKind, RelayParams, RewriteContext, UpstreamResponse};
use crate::rewrite::{rewrite_css, rewrite_html};

/// Content-Security-Policy sent with every relayed HTML document
///
/// Framing is limited to the relay's own origin; everything else the page
/// needs (its own scripts, styles, images, fonts, XHR) stays allowed.
pub const RELAYED_HTML_CSP: &str = "frame-ancestors 'self'; \
     script-src 'self' 'unsafe-inline' 'unsafe-eval' *; \
     style-src 'self' 'unsafe-inline' *; \
     img-src * data: blob:; \
     font-src * data:; \
     connect-src *;";

/// Cache policy for relayed images, stylesheets and scripts
pub const STATIC_CACHE_CONTROL: &str = "public, max-age=3600";

/// Relays a remote page into the embedding iframe
///
/// # Query Parameters
///
/// - `url` (required) - Absolute http(s) URL to fetch
///
/// # Example Request
///
/// `GET /relay?url=https%3A%2F%2Fexample.com`
///
/// # Response
///
/// - **200 OK** - Rewritten HTML, or the passed-through resource
/// - **400 Bad Request** - URL missing or not an absolute http(s) URL
/// - **403 Forbidden** - Target is an internal or private address
/// - **502 Bad Gateway** - Body larger than the configured cap
/// - **504 Gateway Timeout** - Upstream did not answer in time
/// - **500 Internal Server Error** - Connection or rewrite failure
/// - Upstream's own status when it answered with a non-2xx code
///
/// Errors are always HTML pages, since they render in the same frame the
/// page would have.
pub async fn relay(
    State(state): State<AppState>,
    params: Result<Query<RelayParams>, QueryRejection>,
) -> Response {
    let raw = match params {
        Ok(Query(params)) => params.url.unwrap_or_default(),
        Err(rejection) => {
            warn!(%rejection, "unreadable relay query string");
            return RelayError::InvalidUrl {
                reason: rejection.body_text(),
            }
            .into_page_response(None);
        }
    };

    if raw.is_empty() {
        return RelayError::MissingUrl.into_page_response(None);
    }

    match relay_target(&state, &raw).await {
        Ok(response) => response,
        Err(err) => {
            warn!(target_url = %raw, code = err.error_code(), error = %err, "relay failed");
            err.into_page_response(Some(&raw))
        }
    }
}

/// Parses a caller-supplied target, accepting only absolute http(s) URLs
pub fn parse_target(raw: &str) -> Result<Url, RelayError> {
    let url = Url::parse(raw.trim()).map_err(|e| RelayError::InvalidUrl {
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(RelayError::InvalidUrl {
            reason: format!("scheme '{scheme}' is not allowed"),
        }),
    }
}

async fn relay_target(state: &AppState, raw: &str) -> Result<Response, RelayError> {
    let url = parse_target(raw)?;
    state.guard.check_url(&url)?;

    let upstream = fetch(&state.client, &url, &state.config).await?;
    let kind = upstream.kind();
    info!(
        %url,
        final_url = %upstream.final_url,
        status = upstream.status.as_u16(),
        kind = ?kind,
        bytes = upstream.body.len(),
        "relaying upstream response"
    );

    dispatch(upstream, kind)
}

/// Builds the response for a successful upstream fetch
fn dispatch(upstream: UpstreamResponse, kind: ContentKind) -> Result<Response, RelayError> {
    let ctx = RewriteContext::from_url(&upstream.final_url);

    let response = match kind {
        ContentKind::Html => {
            let html = rewrite_html(&upstream.text(), &ctx)
                .map_err(|e| RelayError::Rewrite(e.to_string()))?;
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8")),
                    (header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN")),
                    (header::CONTENT_SECURITY_POLICY, HeaderValue::from_static(RELAYED_HTML_CSP)),
                    (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
                ],
                html,
            )
                .into_response()
        }
        ContentKind::Css => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("text/css")),
                (header::CACHE_CONTROL, HeaderValue::from_static(STATIC_CACHE_CONTROL)),
            ],
            rewrite_css(&upstream.text(), &ctx),
        )
            .into_response(),
        ContentKind::Image | ContentKind::Script => {
            let mut response = (StatusCode::OK, upstream.body).into_response();
            set_content_type(&mut response, &upstream.content_type);
            response.headers_mut().insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static(STATIC_CACHE_CONTROL),
            );
            response
        }
        ContentKind::Other => {
            let mut response = (StatusCode::OK, upstream.body).into_response();
            set_content_type(&mut response, &upstream.content_type);
            response
        }
    };

    Ok(response)
}

/// Copies the upstream content type, dropping the default when there is none
fn set_content_type(response: &mut Response, content_type: &str) {
    let headers = response.headers_mut();
    match HeaderValue::from_str(content_type) {
        Ok(value) if !content_type.is_empty() => {
            headers.insert(header::CONTENT_TYPE, value);
        }
        _ => {
            headers.remove(header::CONTENT_TYPE);
        }
    }
}
