//! Data models for the content relay
//!
//! Everything here lives for a single request: the inbound query, the
//! fetched upstream response and the context used to rewrite its body.

use axum::body::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

/// Query parameters accepted by the relay endpoint
///
/// # Example
/// Query string: `?url=https%3A%2F%2Fexample.com%2Fdocs`
#[derive(Deserialize, Debug, Default)]
pub struct RelayParams {
    /// Target URL to fetch (untrusted, straight from the caller)
    pub url: Option<String>,
}

/// Policy for upstream bodies larger than a configured size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyCap {
    /// Buffer whatever the upstream sends
    Unlimited,

    /// Fail the request once the body exceeds this many bytes
    Reject(usize),

    /// Keep only the first bytes and drop the rest
    Truncate(usize),
}

impl BodyCap {
    /// Byte limit, if any
    pub fn limit(&self) -> Option<usize> {
        match *self {
            BodyCap::Unlimited => None,
            BodyCap::Reject(n) | BodyCap::Truncate(n) => Some(n),
        }
    }
}

/// How an upstream body is treated, derived from its `content-type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Image,
    Css,
    Script,
    Other,
}

impl ContentKind {
    /// Classifies a raw `content-type` header value
    ///
    /// The order of the checks matters: `text/html` wins over everything,
    /// and anything mentioning `javascript` counts as a script.
    pub fn classify(content_type: &str) -> Self {
        let lowered = content_type.to_ascii_lowercase();

        if lowered.contains("text/html") {
            ContentKind::Html
        } else if lowered.starts_with("image/") {
            ContentKind::Image
        } else if lowered.contains("text/css") {
            ContentKind::Css
        } else if lowered.contains("javascript") {
            ContentKind::Script
        } else {
            ContentKind::Other
        }
    }
}

/// A fetched upstream response, fully buffered
#[derive(Debug)]
pub struct UpstreamResponse {
    /// URL after all redirects were followed
    pub final_url: Url,

    /// Upstream status (always 2xx once it reaches the dispatcher)
    pub status: StatusCode,

    /// Raw `content-type` header, empty when the upstream sent none
    pub content_type: String,

    /// Response body, possibly truncated by [`BodyCap::Truncate`]
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn kind(&self) -> ContentKind {
        ContentKind::classify(&self.content_type)
    }

    /// Charset label from the `content-type` parameters, if present
    pub fn charset(&self) -> Option<&str> {
        self.content_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.trim().trim_matches('"'))
    }

    /// Decodes the body as text using the declared charset
    ///
    /// A byte order mark overrides the declared charset. Unknown or missing
    /// labels fall back to UTF-8, and invalid sequences become U+FFFD.
    pub fn text(&self) -> String {
        let encoding = self
            .charset()
            .and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes()))
            .unwrap_or(encoding_rs::UTF_8);

        let (text, _, _) = encoding.decode(&self.body);
        text.into_owned()
    }
}

/// Origin used to absolutize relative references in a fetched document
///
/// Always derived from the final (post-redirect) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteContext {
    origin: String,
}

impl RewriteContext {
    pub fn from_url(url: &Url) -> Self {
        Self {
            origin: url.origin().ascii_serialization(),
        }
    }

    /// `scheme://host[:port]`, without a trailing slash
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Prefixes a root-relative path (`/x`, not `//x`) with the origin
    ///
    /// Returns `None` for anything that is not root-relative, so absolute
    /// URLs are never prefixed twice.
    pub fn absolutize(&self, value: &str) -> Option<String> {
        if is_root_relative(value) {
            Some(format!("{}{}", self.origin, value))
        } else {
            None
        }
    }
}

/// `true` for `/path`, `false` for `//host/path` and everything else
pub fn is_root_relative(value: &str) -> bool {
    value.starts_with('/') && !value.starts_with("//")
}
