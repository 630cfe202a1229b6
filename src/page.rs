//! Error page rendering
//!
//! Error pages render inside the same iframe the relayed page would have
//! used, so they are complete HTML documents with inline styles and no
//! external resources.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use url::Url;

/// A self-contained HTML page describing a relay failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPage {
    /// Heading and document title
    pub title: String,

    /// Explanation shown under the heading
    pub message: String,

    /// Target URL, shown on the page and linked when it is http(s)
    pub url: Option<String>,
}

impl ErrorPage {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Renders the full document
    ///
    /// All interpolated values are escaped; the URL in particular is
    /// attacker-controlled.
    pub fn render(&self) -> String {
        let title = escape_html(&self.title);
        let message = escape_html(&self.message);

        let url_block = match &self.url {
            Some(url) if !is_linkable(url) => format!(r#"<div class="url">{}</div>"#, escape_html(url)),
            Some(url) => {
                let url = escape_html(url);
                format!(
                    r#"<div class="url">{url}</div>
    <a href="{url}" target="_blank" rel="noopener noreferrer" class="btn">
      <svg xmlns="http://www.w3.org/2000/svg" fill="none" viewBox="0 0 24 24" stroke="currentColor">
        <path stroke-linecap="round" stroke-linejoin="round" stroke-width="2" d="M10 6H6a2 2 0 00-2 2v10a2 2 0 002 2h10a2 2 0 002-2v-4M14 4h6m0 0v6m0-6L10 14" />
      </svg>
      Open in Browser
    </a>"#
                )
            }
            None => String::new(),
        };

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{title}</title>
  <style>{PAGE_STYLE}</style>
</head>
<body>
  <div class="container">
    <div class="icon">
      <svg xmlns="http://www.w3.org/2000/svg" fill="none" viewBox="0 0 24 24" stroke="currentColor">
        <path stroke-linecap="round" stroke-linejoin="round" stroke-width="2" d="M12 9v2m0 4h.01m-6.938 4h13.856c1.54 0 2.502-1.667 1.732-3L13.732 4c-.77-1.333-2.694-1.333-3.464 0L3.34 16c-.77 1.333.192 3 1.732 3z" />
      </svg>
    </div>
    <h1>{title}</h1>
    <p>{message}</p>
    {url_block}
  </div>
</body>
</html>"#
        )
    }

    /// Wraps the rendered page in a response with the given status
    pub fn into_response_with(self, status: StatusCode) -> Response {
        (
            status,
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8")),
                (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
            ],
            self.render(),
        )
            .into_response()
    }
}

const PAGE_STYLE: &str = r#"
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body {
      font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
      background: linear-gradient(135deg, #1a1a2e 0%, #16213e 100%);
      color: #fff;
      min-height: 100vh;
      display: flex;
      align-items: center;
      justify-content: center;
      padding: 2rem;
    }
    .container { text-align: center; max-width: 400px; }
    .icon {
      width: 80px;
      height: 80px;
      margin: 0 auto 1.5rem;
      background: rgba(239, 68, 68, 0.2);
      border-radius: 50%;
      display: flex;
      align-items: center;
      justify-content: center;
    }
    .icon svg { width: 40px; height: 40px; color: #ef4444; }
    h1 { font-size: 1.5rem; margin-bottom: 0.75rem; font-weight: 600; }
    p { color: rgba(255,255,255,0.7); line-height: 1.6; margin-bottom: 1.5rem; }
    .url {
      background: rgba(255,255,255,0.1);
      padding: 0.75rem 1rem;
      border-radius: 8px;
      font-size: 0.875rem;
      word-break: break-all;
      margin-bottom: 1.5rem;
    }
    .btn {
      display: inline-flex;
      align-items: center;
      gap: 0.5rem;
      padding: 0.75rem 1.5rem;
      background: #3b82f6;
      color: #fff;
      border-radius: 8px;
      font-size: 0.875rem;
      text-decoration: none;
      transition: background 0.2s;
    }
    .btn:hover { background: #2563eb; }
    .btn svg { width: 16px; height: 16px; }
  "#;

/// Only http(s) targets get a link; anything else is shown as text
fn is_linkable(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

/// Escapes text for use in HTML content and double-quoted attributes
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
