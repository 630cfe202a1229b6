//! Relay error taxonomy
//!
//! Every failure the relay can hit maps to one variant here, and every
//! variant renders as a self-describing HTML page with its own status code.

use axum::http::StatusCode;
use axum::response::Response;
use thiserror::Error;

use crate::guard::BlockReason;
use crate::page::ErrorPage;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("no URL provided")]
    MissingUrl,

    #[error("invalid URL: {reason}")]
    InvalidUrl { reason: String },

    #[error("blocked: {0}")]
    Blocked(#[from] BlockReason),

    /// `reason` is the upstream's own reason phrase when it differs from
    /// the standard one for `status`
    #[error("upstream returned {status}")]
    Upstream {
        status: StatusCode,
        reason: Option<String>,
    },

    #[error("upstream timed out")]
    Timeout,

    #[error("connection failed: {message}")]
    Connection { message: String },

    #[error("upstream body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to rewrite document: {0}")]
    Rewrite(String),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::MissingUrl => StatusCode::BAD_REQUEST,
            RelayError::InvalidUrl { .. } => StatusCode::BAD_REQUEST,
            RelayError::Blocked(_) => StatusCode::FORBIDDEN,
            RelayError::Upstream { status, .. } => *status,
            RelayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Connection { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::TooLarge { .. } => StatusCode::BAD_GATEWAY,
            RelayError::Rewrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RelayError::MissingUrl => "MISSING_URL",
            RelayError::InvalidUrl { .. } => "INVALID_URL",
            RelayError::Blocked(_) => "BLOCKED",
            RelayError::Upstream { .. } => "UPSTREAM_ERROR",
            RelayError::Timeout => "TIMEOUT",
            RelayError::Connection { .. } => "CONNECTION_FAILED",
            RelayError::TooLarge { .. } => "TOO_LARGE",
            RelayError::Rewrite(_) => "REWRITE_FAILED",
        }
    }

    /// The page shown in the frame for this error
    ///
    /// `target` is the URL exactly as the caller sent it. It is shown on
    /// the page and offered as an "Open in Browser" link.
    pub fn page(&self, target: Option<&str>) -> ErrorPage {
        let page = match self {
            RelayError::MissingUrl => {
                return ErrorPage::new("No URL Provided", "Please enter a URL to browse.")
            }
            RelayError::InvalidUrl { .. } => ErrorPage::new(
                "Invalid URL",
                "The URL you entered is not valid. Make sure it starts with http:// or https://",
            ),
            RelayError::Blocked(_) => ErrorPage::new(
                "Access Denied",
                "Access to internal or private network addresses is not allowed for security reasons.",
            ),
            RelayError::Upstream { status, reason } => ErrorPage::new(
                format!("Error {}", status.as_u16()),
                format!(
                    "The server returned an error: {}. The page may not exist or may be temporarily unavailable.",
                    reason
                        .as_deref()
                        .or(status.canonical_reason())
                        .unwrap_or("Unknown Status")
                ),
            ),
            RelayError::Timeout => ErrorPage::new(
                "Request Timed Out",
                "The page took too long to respond. Please try again or check if the site is available.",
            ),
            RelayError::Connection { message } => ErrorPage::new(
                "Connection Failed",
                format!("Unable to connect to the server: {message}"),
            ),
            RelayError::TooLarge { limit } => ErrorPage::new(
                "Page Too Large",
                format!("The page is larger than the {limit} bytes this browser can load."),
            ),
            RelayError::Rewrite(_) => ErrorPage::new(
                "Something Went Wrong",
                "An unexpected error occurred while loading this page.",
            ),
        };

        match target {
            Some(url) => page.with_url(url),
            None => page,
        }
    }

    /// Renders the error page response for this error
    pub fn into_page_response(self, target: Option<&str>) -> Response {
        self.page(target).into_response_with(self.status_code())
    }
}
