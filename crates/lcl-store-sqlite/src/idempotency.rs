// crates/lcl-store-sqlite/src/idempotency.rs
// ============================================================================
// Module: SQLite Idempotency Index
// Description: Durable first-wins (org_id, signal_id) acceptance index.
// Purpose: Record each tenant-scoped signal id exactly once.
// Dependencies: lcl-core, rusqlite
// ============================================================================

//! ## Overview
//! One row per `(org_id, signal_id)` pair with the first acceptance
//! timestamp. The insert-if-absent and read happen inside one transaction, so
//! concurrent submitters observe a single winner. The same `signal_id` under
//! two different tenants is two independent rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use lcl_core::IdempotencyError;
use lcl_core::IdempotencyIndex;
use lcl_core::IdempotencyOutcome;
use lcl_core::OrgId;
use lcl_core::SignalId;
use rusqlite::Connection;
use rusqlite::params;

use crate::connection::SqliteStoreConfig;
use crate::connection::SqliteStoreError;
use crate::connection::initialize_schema;
use crate::connection::open_connection;

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Schema version for the idempotency database.
const SCHEMA_VERSION: i64 = 1;

/// DDL for the idempotency table.
const SCHEMA_DDL: &str = "CREATE TABLE IF NOT EXISTS signal_ids (
    org_id TEXT NOT NULL,
    signal_id TEXT NOT NULL,
    received_at TEXT NOT NULL,
    PRIMARY KEY (org_id, signal_id)
);";

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed first-wins idempotency index.
///
/// # Invariants
/// - Rows are never updated; the first acceptance timestamp is permanent.
#[derive(Clone)]
pub struct SqliteIdempotencyIndex {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteIdempotencyIndex {
    /// Opens (and initializes) an idempotency database.
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
}

impl IdempotencyIndex for SqliteIdempotencyIndex {
    fn check_and_store(
        &self,
        org_id: &OrgId,
        signal_id: &SignalId,
        received_at: &str,
    ) -> Result<IdempotencyOutcome, IdempotencyError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| IdempotencyError::Store("idempotency mutex poisoned".to_string()))?;
        let tx =
            guard.transaction().map_err(|err| IdempotencyError::Store(err.to_string()))?;
        let inserted = tx
            .execute(
                "INSERT INTO signal_ids (org_id, signal_id, received_at) VALUES (?1, ?2, ?3) ON \
                 CONFLICT (org_id, signal_id) DO NOTHING",
                params![org_id.as_str(), signal_id.as_str(), received_at],
            )
            .map_err(|err| IdempotencyError::Store(err.to_string()))?;
        let stored: String = tx
            .query_row(
                "SELECT received_at FROM signal_ids WHERE org_id = ?1 AND signal_id = ?2",
                params![org_id.as_str(), signal_id.as_str()],
                |row| row.get(0),
            )
            .map_err(|err| IdempotencyError::Store(err.to_string()))?;
        tx.commit().map_err(|err| IdempotencyError::Store(err.to_string()))?;
        Ok(IdempotencyOutcome {
            is_duplicate: inserted == 0,
            received_at: stored,
        })
    }

    fn readiness(&self) -> Result<(), IdempotencyError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| IdempotencyError::Store("idempotency mutex poisoned".to_string()))?;
        guard
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|err| IdempotencyError::Store(err.to_string()))?;
        Ok(())
    }
}
