//! Tests for the SSRF guard

use std::error::Error;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use url::Url;

use browser_relay::guard::{filter_answers, find_block_reason, BlockReason, SsrfGuard};

fn check(guard: &SsrfGuard, raw: &str) -> Result<(), BlockReason> {
    let url = Url::parse(raw).unwrap_or_else(|e| panic!("{raw} should parse: {e}"));
    guard.check_url(&url)
}

#[test]
fn test_loopback_and_private_hosts_are_blocked() {
    let guard = SsrfGuard::default();

    for target in [
        "http://127.0.0.1/",
        "http://localhost/",
        "http://192.168.1.5/",
        "http://10.0.0.1/",
        "http://172.16.0.1/",
        "http://0.0.0.0/",
    ] {
        assert!(check(&guard, target).is_err(), "{target} should be blocked");
    }
}

#[test]
fn test_public_hosts_are_allowed() {
    let guard = SsrfGuard::default();

    assert_eq!(check(&guard, "http://8.8.8.8/"), Ok(()));
    assert_eq!(check(&guard, "https://example.com/"), Ok(()));
    assert_eq!(check(&guard, "https://sub.example.co.uk:8443/x"), Ok(()));
    assert_eq!(check(&guard, "http://[2606:4700:4700::1111]/"), Ok(()));
}

#[test]
fn test_172_outside_private_block_is_allowed() {
    let guard = SsrfGuard::default();

    assert_eq!(check(&guard, "http://172.217.16.14/"), Ok(()));
    assert!(check(&guard, "http://172.31.255.255/").is_err());
}

#[test]
fn test_encoded_ipv4_forms_are_normalized_and_blocked() {
    let guard = SsrfGuard::default();

    for target in [
        "http://2130706433/",
        "http://0x7f.0.0.1/",
        "http://0177.0.0.1/",
        "http://127.1/",
        "http://0xa9fea9fe/",
    ] {
        assert!(check(&guard, target).is_err(), "{target} should be blocked");
    }
}

#[test]
fn test_reserved_ranges_are_blocked() {
    let guard = SsrfGuard::default();

    for target in [
        "http://169.254.169.254/latest/meta-data/",
        "http://100.64.0.1/",
        "http://224.0.0.1/",
        "http://[::1]/",
        "http://[::]/",
        "http://[fd00::1]/",
        "http://[fe80::1]/",
        "http://[::ffff:10.0.0.1]/",
        "http://[::ffff:127.0.0.1]/",
        "http://[::a00:1]/",
        "http://[64:ff9b::a9fe:a9fe]/",
    ] {
        assert!(check(&guard, target).is_err(), "{target} should be blocked");
    }
}

#[test]
fn test_internal_names_are_blocked() {
    let guard = SsrfGuard::default();

    assert!(matches!(
        check(&guard, "http://metadata.internal/"),
        Err(BlockReason::InternalName(_))
    ));
    assert!(matches!(
        check(&guard, "http://intranet.corp.example/"),
        Err(BlockReason::InternalName(_))
    ));
    assert!(matches!(
        check(&guard, "http://app.localhost/"),
        Err(BlockReason::LocalName(_))
    ));
    assert!(matches!(
        check(&guard, "http://LOCALHOST./"),
        Err(BlockReason::LocalName(_))
    ));
}

#[test]
fn test_block_reason_names_the_range() {
    let guard = SsrfGuard::default();

    let reason = check(&guard, "http://10.1.1.1/admin").unwrap_err();

    match reason {
        BlockReason::PrivateAddress { ip, net } => {
            assert_eq!(ip, "10.1.1.1".parse::<IpAddr>().unwrap());
            assert_eq!(net.to_string(), "10.0.0.0/8");
        }
        other => panic!("unexpected reason: {other:?}"),
    }
}

#[test]
fn test_allow_loopback_admits_only_loopback() {
    let guard = SsrfGuard::new(true);

    assert_eq!(check(&guard, "http://127.0.0.1:3000/"), Ok(()));
    assert_eq!(check(&guard, "http://localhost:3000/"), Ok(()));
    assert_eq!(check(&guard, "http://[::1]/"), Ok(()));

    assert!(check(&guard, "http://10.0.0.1/").is_err());
    assert!(check(&guard, "http://192.168.0.10/").is_err());
    assert!(check(&guard, "http://169.254.169.254/").is_err());
    assert!(check(&guard, "http://intranet.example/").is_err());
}

#[test]
fn test_check_ip_directly() {
    let guard = SsrfGuard::default();

    assert!(guard.check_ip("10.0.0.5".parse().unwrap()).is_err());
    assert!(guard.check_ip("::ffff:192.168.1.1".parse().unwrap()).is_err());
    assert_eq!(guard.check_ip("93.184.216.34".parse().unwrap()), Ok(()));
}

#[test]
fn test_check_name_handles_ip_spellings() {
    let guard = SsrfGuard::default();

    assert!(guard.check_name("127.0.0.1").is_err());
    assert!(guard.check_name("[::1]").is_err());
    assert!(guard.check_name("").is_err());
    assert_eq!(guard.check_name("example.org"), Ok(()));
}

/// Error wrapper that exposes its cause through `source()`
#[derive(Debug)]
struct Wrapped(BlockReason);

impl fmt::Display for Wrapped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request failed")
    }
}

impl Error for Wrapped {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

#[test]
fn test_find_block_reason_walks_source_chain() {
    let wrapped = Wrapped(BlockReason::ResolvesPrivate("rebind.example".to_string()));

    assert_eq!(
        find_block_reason(&wrapped),
        Some(&BlockReason::ResolvesPrivate("rebind.example".to_string()))
    );

    let unrelated = std::io::Error::new(std::io::ErrorKind::Other, "boom");
    assert_eq!(find_block_reason(&unrelated), None);
}

fn answers(ips: &[&str]) -> Vec<SocketAddr> {
    ips.iter()
        .map(|ip| SocketAddr::new(ip.parse().unwrap(), 443))
        .collect()
}

#[test]
fn test_filter_answers_rejects_all_private() {
    let guard = SsrfGuard::default();

    let result = filter_answers(&guard, "rebind.example", answers(&["10.0.0.1", "127.0.0.1", "fd00::1"]));

    assert_eq!(result, Err(BlockReason::ResolvesPrivate("rebind.example".to_string())));
}

#[test]
fn test_filter_answers_drops_private_from_mixed() {
    let guard = SsrfGuard::default();

    let result = filter_answers(
        &guard,
        "mixed.example",
        answers(&["192.168.0.7", "93.184.216.34", "::ffff:10.1.2.3", "2606:4700:4700::1111"]),
    );

    assert_eq!(result, Ok(answers(&["93.184.216.34", "2606:4700:4700::1111"])));
}

#[test]
fn test_filter_answers_keeps_all_public() {
    let guard = SsrfGuard::default();
    let public = answers(&["93.184.216.34", "8.8.8.8"]);

    assert_eq!(filter_answers(&guard, "example.com", public.clone()), Ok(public));
}

#[test]
fn test_filter_answers_with_loopback_allowed() {
    let guard = SsrfGuard::new(true);

    let result = filter_answers(&guard, "dev.example", answers(&["10.0.0.1", "127.0.0.1"]));

    assert_eq!(result, Ok(answers(&["127.0.0.1"])));
}
