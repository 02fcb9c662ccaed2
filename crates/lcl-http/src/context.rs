// crates/lcl-http/src/context.rs
// ============================================================================
// Module: Application Context
// Description: Process-wide stores, policy cache, and pipeline wiring.
// Purpose: Initialize shared resources once, before route registration.
// Dependencies: lcl-config, lcl-core, lcl-store-sqlite
// ============================================================================

//! ## Overview
//! The context owns everything the handlers share: the four durable stores,
//! the policy cache (read-only after load), and the wired ingestion pipeline.
//! Initialization order is policy first — a bad policy is fatal before any
//! store is touched — then stores, then engines. The context is created once
//! at startup and dropped at shutdown.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use lcl_config::ControlConfig;
use lcl_core::DecisionEngine;
use lcl_core::IngestPipeline;
use lcl_core::StateEngine;
use lcl_core::policy::PolicyDefinition;
use lcl_core::policy::PolicyLoadError;
use lcl_core::policy::load_policy_file;
use lcl_store_sqlite::SqliteDecisionStore;
use lcl_store_sqlite::SqliteIdempotencyIndex;
use lcl_store_sqlite::SqliteSignalLog;
use lcl_store_sqlite::SqliteStateStore;
use lcl_store_sqlite::SqliteStoreConfig;
use lcl_store_sqlite::SqliteStoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Initialization failures; all are fatal to the host process.
#[derive(Debug, Error)]
pub enum InitError {
    /// The policy definition failed to load or validate.
    #[error("policy initialization failed: {0}")]
    Policy(#[from] PolicyLoadError),
    /// A store failed to open or initialize.
    #[error("store initialization failed: {0}")]
    Store(#[from] SqliteStoreError),
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Concrete pipeline type over the SQLite stores.
pub type ControlPipeline = IngestPipeline<
    SqliteSignalLog,
    SqliteIdempotencyIndex,
    SqliteStateStore,
    SqliteDecisionStore,
>;

/// Shared application context for the REST surface.
///
/// # Invariants
/// - The policy cache is read-only after construction (no hot-reload).
pub struct AppContext {
    /// Append-only signal log.
    pub signal_log: Arc<SqliteSignalLog>,
    /// First-wins idempotency index.
    pub idempotency: Arc<SqliteIdempotencyIndex>,
    /// Versioned learner state store.
    pub state_store: Arc<SqliteStateStore>,
    /// Append-only decision store.
    pub decision_store: Arc<SqliteDecisionStore>,
    /// Process-wide policy cache.
    pub policy: Arc<PolicyDefinition>,
    /// Wired ingestion pipeline.
    pub pipeline: ControlPipeline,
}

impl AppContext {
    /// Builds the context from resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] when the policy or any store fails to
    /// initialize; callers treat this as fatal.
    pub fn from_config(config: &ControlConfig) -> Result<Self, InitError> {
        let policy = Arc::new(load_policy_file(&config.decision_policy_path)?);

        let signal_log =
            Arc::new(SqliteSignalLog::open(&SqliteStoreConfig::new(&config.signal_log_db_path))?);
        let idempotency = Arc::new(SqliteIdempotencyIndex::open(&SqliteStoreConfig::new(
            &config.idempotency_db_path,
        ))?);
        let state_store =
            Arc::new(SqliteStateStore::open(&SqliteStoreConfig::new(&config.state_store_db_path))?);
        let decision_store =
            Arc::new(SqliteDecisionStore::open(&SqliteStoreConfig::new(&config.decision_db_path))?);

        let state_engine = StateEngine::new(Arc::clone(&signal_log), Arc::clone(&state_store));
        let decision_engine = DecisionEngine::new(
            Arc::clone(&state_store),
            Arc::clone(&decision_store),
            Some(Arc::clone(&policy)),
        );
        let pipeline = IngestPipeline::new(
            Arc::clone(&signal_log),
            Arc::clone(&idempotency),
            state_engine,
            decision_engine,
        );

        Ok(Self {
            signal_log,
            idempotency,
            state_store,
            decision_store,
            policy,
            pipeline,
        })
    }

    /// Checks that every store answers a liveness probe.
    ///
    /// # Errors
    ///
    /// Returns the first failing store's error message.
    pub fn readiness(&self) -> Result<(), String> {
        use lcl_core::DecisionStore;
        use lcl_core::IdempotencyIndex;
        use lcl_core::SignalLog;
        use lcl_core::StateStore;

        self.signal_log.readiness().map_err(|err| err.to_string())?;
        self.idempotency.readiness().map_err(|err| err.to_string())?;
        self.state_store.readiness().map_err(|err| err.to_string())?;
        self.decision_store.readiness().map_err(|err| err.to_string())?;
        Ok(())
    }
}
