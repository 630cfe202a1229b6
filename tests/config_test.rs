use std::env;
use std::sync::Mutex;
use std::time::Duration;

use browser_relay::config::{RelayConfig, DEFAULT_MAX_BODY_BYTES};
use browser_relay::model::BodyCap;

// Mutex to ensure tests that modify env vars don't run in parallel
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const RELAY_VARS: &[&str] = &[
    "PORT",
    "RELAY_TIMEOUT_SECS",
    "RELAY_MAX_BODY_BYTES",
    "RELAY_BODY_CAP_MODE",
    "RELAY_MAX_REDIRECTS",
    "RELAY_ALLOW_LOOPBACK",
];

fn clear_relay_env() {
    for var in RELAY_VARS {
        env::remove_var(var);
    }
}

#[test]
fn test_config_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_relay_env();

    let config = RelayConfig::from_env();

    assert_eq!(config.port, 8080);
    assert_eq!(config.timeout, Duration::from_secs(10));
    assert_eq!(config.body_cap, BodyCap::Reject(DEFAULT_MAX_BODY_BYTES));
    assert_eq!(config.max_redirects, 10);
    assert!(!config.allow_loopback);
}

#[test]
fn test_config_from_env_values() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_relay_env();
    env::set_var("PORT", "9090");
    env::set_var("RELAY_TIMEOUT_SECS", "3");
    env::set_var("RELAY_MAX_BODY_BYTES", "2048");
    env::set_var("RELAY_BODY_CAP_MODE", "truncate");
    env::set_var("RELAY_MAX_REDIRECTS", "2");
    env::set_var("RELAY_ALLOW_LOOPBACK", "true");

    let config = RelayConfig::from_env();

    assert_eq!(config.port, 9090);
    assert_eq!(config.timeout, Duration::from_secs(3));
    assert_eq!(config.body_cap, BodyCap::Truncate(2048));
    assert_eq!(config.max_redirects, 2);
    assert!(config.allow_loopback);

    clear_relay_env();
}

#[test]
fn test_zero_body_cap_disables_limit() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_relay_env();
    env::set_var("RELAY_MAX_BODY_BYTES", "0");
    env::set_var("RELAY_BODY_CAP_MODE", "truncate");

    let config = RelayConfig::from_env();

    assert_eq!(config.body_cap, BodyCap::Unlimited);
    assert_eq!(config.body_cap.limit(), None);

    clear_relay_env();
}

#[test]
fn test_unparseable_values_fall_back_to_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_relay_env();
    env::set_var("PORT", "not-a-port");
    env::set_var("RELAY_TIMEOUT_SECS", "-5");
    env::set_var("RELAY_BODY_CAP_MODE", "explode");
    env::set_var("RELAY_ALLOW_LOOPBACK", "maybe");

    let config = RelayConfig::from_env();

    assert_eq!(config.port, 8080);
    assert_eq!(config.timeout, Duration::from_secs(10));
    assert_eq!(config.body_cap, BodyCap::Reject(DEFAULT_MAX_BODY_BYTES));
    assert!(!config.allow_loopback);

    clear_relay_env();
}
