// crates/lcl-config/src/lib.rs
// ============================================================================
// Module: Learning Control Layer Configuration
// Description: Environment-variable configuration with defaults.
// Purpose: Resolve ports, store paths, and the policy path at startup.
// Dependencies: envy, serde, thiserror
// ============================================================================

//! ## Overview
//! All runtime configuration comes from environment variables; every value
//! has a default so a bare process starts with local on-disk stores and the
//! bundled policy file. `:memory:` is accepted for any store path (used by
//! tests). Validation happens once at startup; a bad configuration is fatal
//! to the host.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PORT` | `8080` |
//! | `IDEMPOTENCY_DB_PATH` | `data/idempotency.db` |
//! | `SIGNAL_LOG_DB_PATH` | `data/signal_log.db` |
//! | `STATE_STORE_DB_PATH` | `data/state_store.db` |
//! | `DECISION_DB_PATH` | `data/decisions.db` |
//! | `DECISION_POLICY_PATH` | `policies/default.json` (cwd-relative) |

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable could not be deserialized.
    #[error("configuration error: {0}")]
    Env(String),
    /// A resolved value violates its constraints.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Resolved control layer configuration.
///
/// # Invariants
/// - Paths are non-empty; `:memory:` is a valid store path.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// HTTP port the server binds to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Idempotency index database path.
    #[serde(default = "default_idempotency_db_path")]
    pub idempotency_db_path: PathBuf,
    /// Signal log database path.
    #[serde(default = "default_signal_log_db_path")]
    pub signal_log_db_path: PathBuf,
    /// Learner state database path.
    #[serde(default = "default_state_store_db_path")]
    pub state_store_db_path: PathBuf,
    /// Decision database path.
    #[serde(default = "default_decision_db_path")]
    pub decision_db_path: PathBuf,
    /// Policy definition path, resolved against the working directory.
    #[serde(default = "default_decision_policy_path")]
    pub decision_policy_path: PathBuf,
}

/// Returns the default HTTP port.
const fn default_port() -> u16 {
    8080
}

/// Returns the default idempotency database path.
fn default_idempotency_db_path() -> PathBuf {
    PathBuf::from("data/idempotency.db")
}

/// Returns the default signal log database path.
fn default_signal_log_db_path() -> PathBuf {
    PathBuf::from("data/signal_log.db")
}

/// Returns the default state database path.
fn default_state_store_db_path() -> PathBuf {
    PathBuf::from("data/state_store.db")
}

/// Returns the default decision database path.
fn default_decision_db_path() -> PathBuf {
    PathBuf::from("data/decisions.db")
}

/// Returns the default policy path.
fn default_decision_policy_path() -> PathBuf {
    PathBuf::from("policies/default.json")
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            idempotency_db_path: default_idempotency_db_path(),
            signal_log_db_path: default_signal_log_db_path(),
            state_store_db_path: default_state_store_db_path(),
            decision_db_path: default_decision_db_path(),
            decision_policy_path: default_decision_policy_path(),
        }
    }
}

impl ControlConfig {
    /// Resolves configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable cannot be deserialized or a
    /// resolved value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self =
            envy::from_env().map_err(|err| ConfigError::Env(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates resolved values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for empty paths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (label, path) in [
            ("idempotency_db_path", &self.idempotency_db_path),
            ("signal_log_db_path", &self.signal_log_db_path),
            ("state_store_db_path", &self.state_store_db_path),
            ("decision_db_path", &self.decision_db_path),
            ("decision_policy_path", &self.decision_policy_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!("{label} must not be empty")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
