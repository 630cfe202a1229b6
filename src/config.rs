//! Runtime configuration and shared application state
//!
//! This module reads the relay settings from the environment and builds the
//! state that is handed to every request handler.

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::fetch::build_client;
use crate::guard::SsrfGuard;
use crate::model::BodyCap;

/// Default upstream timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default body cap (25 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Default redirect hop limit
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Relay settings
///
/// All values come from environment variables (see [`RelayConfig::from_env`]).
/// `Default` gives the production defaults.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Port the HTTP server listens on
    pub port: u16,

    /// Upper bound for the whole upstream exchange (connect, redirects, body)
    pub timeout: Duration,

    /// What to do with bodies larger than the configured size
    pub body_cap: BodyCap,

    /// Maximum number of redirects followed before giving up
    pub max_redirects: usize,

    /// Admit `localhost` and loopback addresses as targets
    ///
    /// Meant for local development only. Private ranges stay blocked.
    pub allow_loopback: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            body_cap: BodyCap::Reject(DEFAULT_MAX_BODY_BYTES),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            allow_loopback: false,
        }
    }
}

impl RelayConfig {
    /// Builds the configuration from environment variables
    ///
    /// # Environment Variables
    ///
    /// - `PORT` - Server port number (default: 8080)
    /// - `RELAY_TIMEOUT_SECS` - Upstream timeout (default: 10)
    /// - `RELAY_MAX_BODY_BYTES` - Body cap in bytes, `0` disables it (default: 25 MiB)
    /// - `RELAY_BODY_CAP_MODE` - `reject` or `truncate` (default: reject)
    /// - `RELAY_MAX_REDIRECTS` - Redirect hop limit (default: 10)
    /// - `RELAY_ALLOW_LOOPBACK` - Admit loopback targets (default: false)
    ///
    /// Values that fail to parse fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_body: usize = env_or("RELAY_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES);
        let body_cap = match (max_body, env::var("RELAY_BODY_CAP_MODE").ok().as_deref()) {
            (0, _) => BodyCap::Unlimited,
            (n, Some(mode)) if mode.eq_ignore_ascii_case("truncate") => BodyCap::Truncate(n),
            (n, Some(mode)) if !mode.eq_ignore_ascii_case("reject") => {
                warn!(value = mode, "unknown RELAY_BODY_CAP_MODE, using reject");
                BodyCap::Reject(n)
            }
            (n, _) => BodyCap::Reject(n),
        };

        Self {
            port: env_or("PORT", defaults.port),
            timeout: Duration::from_secs(env_or("RELAY_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)),
            body_cap,
            max_redirects: env_or("RELAY_MAX_REDIRECTS", defaults.max_redirects),
            allow_loopback: env_or("RELAY_ALLOW_LOOPBACK", defaults.allow_loopback),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "ignoring unparseable environment value");
            default
        }),
        Err(_) => default,
    }
}

/// Application state shared across all request handlers
///
/// Everything in here is immutable after startup. The `reqwest::Client`
/// is cheap to clone and pools connections internally.
#[derive(Clone)]
pub struct AppState {
    /// Relay settings
    pub config: Arc<RelayConfig>,

    /// Host and address policy applied before and during fetches
    pub guard: Arc<SsrfGuard>,

    /// Outbound HTTP client with the guard wired into DNS and redirects
    pub client: reqwest::Client,
}

impl AppState {
    /// Builds the state (guard plus HTTP client) for a configuration
    pub fn new(config: RelayConfig) -> Result<Self, reqwest::Error> {
        let guard = Arc::new(SsrfGuard::new(config.allow_loopback));
        let client = build_client(&config, guard.clone())?;

        Ok(Self {
            config: Arc::new(config),
            guard,
            client,
        })
    }
}
