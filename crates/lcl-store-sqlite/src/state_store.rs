// crates/lcl-store-sqlite/src/state_store.rs
// ============================================================================
// Module: SQLite State Store
// Description: Durable versioned learner state with applied-signal rows.
// Purpose: Persist every state version atomically with its applications.
// Dependencies: lcl-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! The state store keeps every learner state version forever. A new version
//! and all of its applied-signal rows commit in one transaction; the
//! `UNIQUE (org_id, learner_reference, state_version)` constraint is the only
//! synchronization primitive between concurrent appliers — a constraint
//! violation surfaces as the vendor-neutral version conflict the engine
//! retries on.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use lcl_core::AppliedSignal;
use lcl_core::LearnerRef;
use lcl_core::LearnerState;
use lcl_core::OrgId;
use lcl_core::SignalId;
use lcl_core::StateId;
use lcl_core::StateProvenance;
use lcl_core::StateStore;
use lcl_core::StateStoreError;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use rusqlite::types::Value as SqlValue;

use crate::connection::SqliteStoreConfig;
use crate::connection::SqliteStoreError;
use crate::connection::initialize_schema;
use crate::connection::open_connection;

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Schema version for the state database.
const SCHEMA_VERSION: i64 = 1;

/// DDL for the learner state and applied-signal tables.
const SCHEMA_DDL: &str = "CREATE TABLE IF NOT EXISTS learner_state (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    org_id TEXT NOT NULL,
    learner_reference TEXT NOT NULL,
    state_id TEXT NOT NULL UNIQUE,
    state_version INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    state TEXT NOT NULL,
    last_signal_id TEXT NOT NULL,
    last_signal_timestamp TEXT NOT NULL,
    UNIQUE (org_id, learner_reference, state_version)
);
CREATE INDEX IF NOT EXISTS idx_learner_state_latest
    ON learner_state (org_id, learner_reference, state_version DESC);
CREATE TABLE IF NOT EXISTS applied_signals (
    org_id TEXT NOT NULL,
    learner_reference TEXT NOT NULL,
    signal_id TEXT NOT NULL,
    state_version INTEGER NOT NULL,
    applied_at TEXT NOT NULL,
    PRIMARY KEY (org_id, learner_reference, signal_id)
);";

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed versioned learner state store.
///
/// # Invariants
/// - Rows are never updated or deleted; all versions are preserved.
/// - Snapshot and applied rows commit together or not at all.
#[derive(Clone)]
pub struct SqliteStateStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStateStore {
    /// Opens (and initializes) a state database.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// carries a foreign schema version.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection, SCHEMA_VERSION, SCHEMA_DDL)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StateStoreError> {
        self.connection
            .lock()
            .map_err(|_| StateStoreError::Store("state store mutex poisoned".to_string()))
    }

    /// Returns every persisted version for a learner, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the query fails.
    pub fn versions(
        &self,
        org_id: &OrgId,
        learner_reference: &LearnerRef,
    ) -> Result<Vec<LearnerState>, StateStoreError> {
        let guard = self.lock()?;
        let mut stmt = guard
            .prepare_cached(&format!(
                "SELECT {STATE_COLUMNS} FROM learner_state WHERE org_id = ?1 AND \
                 learner_reference = ?2 ORDER BY state_version ASC"
            ))
            .map_err(|err| StateStoreError::Store(err.to_string()))?;
        let rows = stmt
            .query_map(params![org_id.as_str(), learner_reference.as_str()], state_from_row)
            .map_err(|err| StateStoreError::Store(err.to_string()))?;
        let mut versions = Vec::new();
        for row in rows {
            versions.push(row.map_err(|err| StateStoreError::Store(err.to_string()))?);
        }
        Ok(versions)
    }
}

/// Column list shared by every state-producing query.
const STATE_COLUMNS: &str = "org_id, learner_reference, state_id, state_version, updated_at, \
                             state, last_signal_id, last_signal_timestamp";

/// Maps a learner state row to its domain type.
fn state_from_row(row: &Row<'_>) -> Result<LearnerState, rusqlite::Error> {
    let org_id: String = row.get(0)?;
    let learner_reference: String = row.get(1)?;
    let state_id: String = row.get(2)?;
    let state_version: i64 = row.get(3)?;
    let updated_at: String = row.get(4)?;
    let state: String = row.get(5)?;
    let last_signal_id: String = row.get(6)?;
    let last_signal_timestamp: String = row.get(7)?;
    let state = serde_json::from_str(&state).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(err))
    })?;
    Ok(LearnerState {
        org_id: OrgId::new(org_id),
        learner_reference: LearnerRef::new(learner_reference),
        state_id: StateId::new(state_id),
        state_version,
        updated_at,
        state,
        provenance: StateProvenance {
            last_signal_id: SignalId::new(last_signal_id),
            last_signal_timestamp,
        },
    })
}

impl StateStore for SqliteStateStore {
    fn latest(
        &self,
        org_id: &OrgId,
        learner_reference: &LearnerRef,
    ) -> Result<Option<LearnerState>, StateStoreError> {
        let guard = self.lock()?;
        guard
            .query_row(
                &format!(
                    "SELECT {STATE_COLUMNS} FROM learner_state WHERE org_id = ?1 AND \
                     learner_reference = ?2 ORDER BY state_version DESC LIMIT 1"
                ),
                params![org_id.as_str(), learner_reference.as_str()],
                state_from_row,
            )
            .optional()
            .map_err(|err| StateStoreError::Store(err.to_string()))
    }

    fn already_applied(
        &self,
        org_id: &OrgId,
        learner_reference: &LearnerRef,
        signal_ids: &[SignalId],
    ) -> Result<Vec<SignalId>, StateStoreError> {
        if signal_ids.is_empty() {
            return Ok(Vec::new());
        }
        let guard = self.lock()?;
        let mut placeholders = String::new();
        for index in 0 .. signal_ids.len() {
            if index > 0 {
                placeholders.push_str(", ");
            }
            placeholders.push_str(&format!("?{}", index + 3));
        }
        let mut stmt = guard
            .prepare(&format!(
                "SELECT signal_id FROM applied_signals WHERE org_id = ?1 AND learner_reference = \
                 ?2 AND signal_id IN ({placeholders})"
            ))
            .map_err(|err| StateStoreError::Store(err.to_string()))?;
        let mut bindings: Vec<SqlValue> = Vec::with_capacity(signal_ids.len() + 2);
        bindings.push(SqlValue::Text(org_id.as_str().to_string()));
        bindings.push(SqlValue::Text(learner_reference.as_str().to_string()));
        for signal_id in signal_ids {
            bindings.push(SqlValue::Text(signal_id.as_str().to_string()));
        }
        let rows = stmt
            .query_map(rusqlite::params_from_iter(bindings), |row| row.get::<_, String>(0))
            .map_err(|err| StateStoreError::Store(err.to_string()))?;
        let mut applied = Vec::new();
        for row in rows {
            applied
                .push(SignalId::new(row.map_err(|err| StateStoreError::Store(err.to_string()))?));
        }
        Ok(applied)
    }

    fn insert_version(
        &self,
        state: &LearnerState,
        applied: &[AppliedSignal],
    ) -> Result<(), StateStoreError> {
        let state_json = serde_json::to_string(&state.state)
            .map_err(|err| StateStoreError::Invalid(err.to_string()))?;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StateStoreError::Store(err.to_string()))?;
        let insert = tx.execute(
            "INSERT INTO learner_state (org_id, learner_reference, state_id, state_version, \
             updated_at, state, last_signal_id, last_signal_timestamp) VALUES (?1, ?2, ?3, ?4, \
             ?5, ?6, ?7, ?8)",
            params![
                state.org_id.as_str(),
                state.learner_reference.as_str(),
                state.state_id.as_str(),
                state.state_version,
                state.updated_at,
                state_json,
                state.provenance.last_signal_id.as_str(),
                state.provenance.last_signal_timestamp
            ],
        );
        if let Err(error) = insert {
            return Err(map_constraint(error, state));
        }
        for row in applied {
            let insert = tx.execute(
                "INSERT INTO applied_signals (org_id, learner_reference, signal_id, \
                 state_version, applied_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    row.org_id.as_str(),
                    row.learner_reference.as_str(),
                    row.signal_id.as_str(),
                    row.state_version,
                    row.applied_at
                ],
            );
            if let Err(error) = insert {
                return Err(map_constraint(error, state));
            }
        }
        tx.commit().map_err(|err| StateStoreError::Store(err.to_string()))
    }

    fn readiness(&self) -> Result<(), StateStoreError> {
        let guard = self.lock()?;
        guard
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|err| StateStoreError::Store(err.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a constraint violation in the insert transaction to a conflict.
///
/// Both the state-version constraint and the applied-signal primary key mark
/// a concurrent writer that already folded this work; the engine re-reads and
/// retries either way.
fn map_constraint(error: rusqlite::Error, state: &LearnerState) -> StateStoreError {
    match error {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            StateStoreError::VersionConflict {
                org_id: state.org_id.as_str().to_string(),
                learner_reference: state.learner_reference.as_str().to_string(),
                state_version: state.state_version,
            }
        }
        other => StateStoreError::Store(other.to_string()),
    }
}
