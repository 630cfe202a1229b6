//! Route definitions for the content relay
//!
//! This module maps the relay endpoint (and its alias) to the handler and
//! attaches the application state.

use axum::routing::get;
use axum::Router;

use crate::config::AppState;
use crate::handler::relay;

/// Creates and configures the Axum application router
///
/// # Route Definitions
///
/// - `GET /relay?url=...` - Fetches and rewrites the target for the iframe
/// - `GET /api/browser/proxy?url=...` - Same handler, at the path the
///   embedded browser widget requests
///
/// # Example Usage
///
/// ```no_run
/// # use browser_relay::config::{AppState, RelayConfig};
/// # use browser_relay::route::create_app;
/// let state = AppState::new(RelayConfig::default()).unwrap();
/// let app = create_app(state);
/// // axum::serve(listener, app).await.unwrap();
/// ```
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/relay", get(relay))
        .route("/api/browser/proxy", get(relay))
        .with_state(state)
}
