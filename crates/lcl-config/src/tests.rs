// crates/lcl-config/src/tests.rs
// ============================================================================
// Module: Configuration Tests
// Description: Unit tests for defaults, overrides, and validation.
// Purpose: Pin the environment contract without touching process env.
// Dependencies: envy
// ============================================================================

//! Unit tests for configuration resolution.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::path::PathBuf;

use super::ControlConfig;

fn from_pairs(pairs: &[(&str, &str)]) -> ControlConfig {
    let iter = pairs.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string()));
    envy::from_iter(iter).expect("config")
}

#[test]
fn defaults_cover_every_field() {
    let config = from_pairs(&[]);
    assert_eq!(config.port, 8080);
    assert_eq!(config.idempotency_db_path, PathBuf::from("data/idempotency.db"));
    assert_eq!(config.signal_log_db_path, PathBuf::from("data/signal_log.db"));
    assert_eq!(config.state_store_db_path, PathBuf::from("data/state_store.db"));
    assert_eq!(config.decision_db_path, PathBuf::from("data/decisions.db"));
    assert_eq!(config.decision_policy_path, PathBuf::from("policies/default.json"));
    config.validate().expect("valid");
}

#[test]
fn environment_overrides_are_honored() {
    let config = from_pairs(&[
        ("PORT", "9191"),
        ("IDEMPOTENCY_DB_PATH", ":memory:"),
        ("SIGNAL_LOG_DB_PATH", ":memory:"),
        ("STATE_STORE_DB_PATH", ":memory:"),
        ("DECISION_DB_PATH", ":memory:"),
        ("DECISION_POLICY_PATH", "/etc/lcl/policy.json"),
    ]);
    assert_eq!(config.port, 9191);
    assert_eq!(config.signal_log_db_path, PathBuf::from(":memory:"));
    assert_eq!(config.decision_policy_path, PathBuf::from("/etc/lcl/policy.json"));
    config.validate().expect("valid");
}

#[test]
fn empty_paths_fail_validation() {
    let config = from_pairs(&[("DECISION_POLICY_PATH", "")]);
    let error = config.validate().expect_err("invalid");
    assert!(error.to_string().contains("decision_policy_path"));
}

#[test]
fn non_numeric_port_is_an_env_error() {
    let iter = [("PORT".to_string(), "not-a-port".to_string())].into_iter();
    let result: Result<ControlConfig, _> = envy::from_iter(iter);
    assert!(result.is_err());
}

#[test]
fn default_trait_matches_empty_environment() {
    let from_env = from_pairs(&[]);
    let from_default = ControlConfig::default();
    assert_eq!(from_env.port, from_default.port);
    assert_eq!(from_env.decision_policy_path, from_default.decision_policy_path);
}
