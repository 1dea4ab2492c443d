#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Tests for logging configuration and subscriber installation
//!
//! # Test Coverage
//!
//! - `GW_LOG_*` variables parsed into `LogConfig`, with defaults
//! - Invalid boolean values fall back to the defaults
//! - The global subscriber installs once and refuses a second install
//!
//! This file is its own test binary, so the global subscriber installed here
//! does not leak into the other suites.

use gateway_dispatch::logging::{init_logging_with_config, LogConfig, LogFormat};
use tracing::Level;

fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[test]
fn test_defaults_without_variables() {
    let config = LogConfig::from_vars(vars(&[("PATH", "/usr/bin")]));

    assert_eq!(config.log_level, "info");
    assert_eq!(config.level(), Level::INFO);
    assert_eq!(config.format, LogFormat::Json);
    assert!(config.async_logging);
    assert!(config.target_filter.is_none());
    assert!(!config.include_location);
}

#[test]
fn test_variables_override_defaults() {
    let config = LogConfig::from_vars(vars(&[
        ("GW_LOG_LEVEL", "debug"),
        ("GW_LOG_FORMAT", "pretty"),
        ("GW_LOG_ASYNC", "false"),
        ("GW_LOG_TARGET_FILTER", "gateway_dispatch::dispatcher=trace"),
        ("GW_LOG_INCLUDE_LOCATION", "true"),
    ]));

    assert_eq!(config.level(), Level::DEBUG);
    assert_eq!(config.format, LogFormat::Pretty);
    assert!(!config.async_logging);
    assert_eq!(
        config.target_filter.as_deref(),
        Some("gateway_dispatch::dispatcher=trace")
    );
    assert!(config.include_location);
}

#[test]
fn test_invalid_booleans_keep_defaults() {
    let config = LogConfig::from_vars(vars(&[
        ("GW_LOG_ASYNC", "sometimes"),
        ("GW_LOG_INCLUDE_LOCATION", "yes"),
    ]));

    assert!(config.async_logging);
    assert!(!config.include_location);
}

#[test]
fn test_subscriber_installs_once() {
    let config = LogConfig::from_vars(vars(&[
        ("GW_LOG_ASYNC", "false"),
        ("GW_LOG_TARGET_FILTER", "gateway_dispatch=debug, not a directive"),
    ]));

    init_logging_with_config(&config).unwrap();
    tracing::info!(target: "gateway_dispatch", "subscriber installed");

    assert!(init_logging_with_config(&config).is_err());
}
