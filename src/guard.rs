//! SSRF guard
//!
//! Decides whether the relay may talk to a host. The same policy is applied
//! at three points:
//!
//! 1. before any network access, against the host of the requested URL
//! 2. on every redirect hop, through [`redirect_policy`]
//! 3. when a domain name is resolved, through [`GuardedResolver`], so names
//!    that point at private addresses (or are rebound to them) never connect
//!
//! Every check fails closed.

use std::error::Error as StdError;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use ipnet::IpNet;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect::Policy;
use thiserror::Error;
use tracing::{debug, warn};
use url::{Host, Url};

/// Address ranges the relay never connects to
pub const BLOCKED_CIDRS: &[&str] = &[
    // IPv4
    "0.0.0.0/8",
    "10.0.0.0/8",
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.0.0.0/24",
    "192.0.2.0/24",
    "192.168.0.0/16",
    "198.18.0.0/15",
    "198.51.100.0/24",
    "203.0.113.0/24",
    "224.0.0.0/4",
    "240.0.0.0/4",
    // IPv6
    "::/128",
    "::1/128",
    "::/96",
    "64:ff9b::/96",
    "fc00::/7",
    "fe80::/10",
    "ff00::/8",
    "2001:db8::/32",
];

/// Substrings that mark a host name as belonging to an internal network
pub const BLOCKED_NAME_FRAGMENTS: &[&str] = &["internal", "intranet"];

/// Why a host was refused
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockReason {
    #[error("URL has no host")]
    MissingHost,

    #[error("host '{0}' is a local name")]
    LocalName(String),

    #[error("host '{0}' looks like an internal network name")]
    InternalName(String),

    #[error("address {ip} is inside blocked range {net}")]
    PrivateAddress { ip: IpAddr, net: IpNet },

    #[error("host '{0}' only resolves to blocked addresses")]
    ResolvesPrivate(String),
}

/// Host and address policy
#[derive(Debug, Clone)]
pub struct SsrfGuard {
    blocked: Vec<IpNet>,
    allow_loopback: bool,
}

impl Default for SsrfGuard {
    fn default() -> Self {
        Self::new(false)
    }
}

impl SsrfGuard {
    /// Creates a guard over [`BLOCKED_CIDRS`]
    ///
    /// With `allow_loopback`, `localhost` and loopback addresses pass.
    /// Every other blocked range stays blocked.
    pub fn new(allow_loopback: bool) -> Self {
        let blocked = BLOCKED_CIDRS
            .iter()
            .filter_map(|cidr| cidr.parse::<IpNet>().ok())
            .collect();

        Self {
            blocked,
            allow_loopback,
        }
    }

    /// Checks the host of a parsed URL
    ///
    /// IP literals are already normalized by the URL parser, so decimal,
    /// hex and shortened IPv4 forms arrive here as plain addresses.
    pub fn check_url(&self, url: &Url) -> Result<(), BlockReason> {
        match url.host() {
            None => Err(BlockReason::MissingHost),
            Some(Host::Domain(name)) => self.check_name(name),
            Some(Host::Ipv4(ip)) => self.check_ip(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => self.check_ip(IpAddr::V6(ip)),
        }
    }

    /// Checks a host name by its spelling only (no DNS)
    pub fn check_name(&self, name: &str) -> Result<(), BlockReason> {
        let name = name.trim_end_matches('.').to_ascii_lowercase();

        if let Ok(ip) = name.trim_matches(['[', ']']).parse::<IpAddr>() {
            return self.check_ip(ip);
        }

        if name.is_empty() {
            return Err(BlockReason::MissingHost);
        }

        if name == "localhost" || name.ends_with(".localhost") {
            if self.allow_loopback {
                return Ok(());
            }
            return Err(BlockReason::LocalName(name));
        }

        if BLOCKED_NAME_FRAGMENTS
            .iter()
            .any(|fragment| name.contains(fragment))
        {
            return Err(BlockReason::InternalName(name));
        }

        Ok(())
    }

    /// Checks a concrete address against the blocked ranges
    pub fn check_ip(&self, ip: IpAddr) -> Result<(), BlockReason> {
        // ::ffff:a.b.c.d is judged as a.b.c.d
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
            v4 => v4,
        };

        if self.allow_loopback && ip.is_loopback() {
            return Ok(());
        }

        match self.blocked.iter().find(|net| net.contains(&ip)) {
            Some(net) => Err(BlockReason::PrivateAddress { ip, net: *net }),
            None => Ok(()),
        }
    }
}

/// Finds a [`BlockReason`] anywhere in an error's source chain
///
/// Refusals raised inside the HTTP client (redirect policy, resolver) come
/// back wrapped in a `reqwest::Error`.
pub fn find_block_reason<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a BlockReason> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(reason) = e.downcast_ref::<BlockReason>() {
            return Some(reason);
        }
        current = e.source();
    }
    None
}

/// Redirect policy that re-runs the guard on every hop
pub fn redirect_policy(guard: Arc<SsrfGuard>, max_redirects: usize) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            return attempt.error(format!("too many redirects (limit {max_redirects})"));
        }

        match guard.check_url(attempt.url()) {
            Ok(()) => {
                debug!(to = %attempt.url(), hop = attempt.previous().len(), "following redirect");
                attempt.follow()
            }
            Err(reason) => {
                warn!(to = %attempt.url(), %reason, "redirect target blocked");
                attempt.error(reason)
            }
        }
    })
}

/// Keeps the resolved addresses the guard admits
///
/// Fails with [`BlockReason::ResolvesPrivate`] when none are left, so a
/// name never connects through a blocked address even if some of its
/// answers are public.
pub fn filter_answers(
    guard: &SsrfGuard,
    host: &str,
    answers: Vec<SocketAddr>,
) -> Result<Vec<SocketAddr>, BlockReason> {
    let total = answers.len();
    let allowed: Vec<SocketAddr> = answers
        .into_iter()
        .filter(|addr| guard.check_ip(addr.ip()).is_ok())
        .collect();

    if allowed.is_empty() {
        warn!(%host, "all resolved addresses are blocked");
        return Err(BlockReason::ResolvesPrivate(host.to_string()));
    }
    if allowed.len() < total {
        debug!(%host, dropped = total - allowed.len(), "dropped blocked addresses");
    }

    Ok(allowed)
}

/// DNS resolver that drops blocked addresses from every answer
///
/// A name whose answers are all blocked fails with
/// [`BlockReason::ResolvesPrivate`].
#[derive(Debug, Clone)]
pub struct GuardedResolver {
    guard: Arc<SsrfGuard>,
}

impl GuardedResolver {
    pub fn new(guard: Arc<SsrfGuard>) -> Self {
        Self { guard }
    }
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let guard = self.guard.clone();
        let host = name.as_str().to_string();

        Box::pin(async move {
            guard.check_name(&host)?;

            // The connector overwrites the port, so 0 is fine here
            let answers: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
                .await?
                .collect();

            if answers.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no addresses found for '{host}'"),
                )
                .into());
            }

            let allowed = filter_answers(&guard, &host, answers)?;

            let addrs: Addrs = Box::new(allowed.into_iter());
            Ok::<_, Box<dyn StdError + Send + Sync>>(addrs)
        })
    }
}
