// crates/lcl-store-sqlite/src/signal_log.rs
// ============================================================================
// Module: SQLite Signal Log
// Description: Durable append-only, per-tenant ordered signal log.
// Purpose: Persist accepted signals with deterministic range and id reads.
// Dependencies: lcl-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! The signal log is insert-only: rows are never updated or deleted, and
//! `(org_id, signal_id)` is unique. Reads order by `(accepted_at, id)` where
//! `id` is the SQLite rowid assigned at insert, so identical queries return
//! byte-identical sequences. The accepted-at string is stored verbatim for
//! round-trip fidelity next to a derived millisecond column used for range
//! filters and ordering.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use lcl_core::OrgId;
use lcl_core::RangeQuery;
use lcl_core::SignalEnvelope;
use lcl_core::SignalId;
use lcl_core::SignalLog;
use lcl_core::SignalLogError;
use lcl_core::SignalPage;
use lcl_core::SignalRecord;
use lcl_core::core::time::rfc3339_to_unix_millis;
use lcl_core::interfaces::cursor::PageCursor;
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

/// Schema version for the signal log database.
const SCHEMA_VERSION: i64 = 1;

/// DDL for the signal log tables.
const SCHEMA_DDL: &str = "CREATE TABLE IF NOT EXISTS signal_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    org_id TEXT NOT NULL,
    signal_id TEXT NOT NULL,
    source_system TEXT NOT NULL,
    learner_reference TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    schema_version TEXT NOT NULL,
    payload TEXT NOT NULL,
    metadata TEXT,
    accepted_at TEXT NOT NULL,
    accepted_at_ms INTEGER NOT NULL,
    UNIQUE (org_id, signal_id)
);
CREATE INDEX IF NOT EXISTS idx_signal_log_learner
    ON signal_log (org_id, learner_reference, accepted_at_ms);";

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed append-only signal log.
///
/// # Invariants
/// - Rows are never updated or deleted.
/// - Every read filters on `org_id` inside the SQL query.
#[derive(Clone, Debug)]
pub struct SqliteSignalLog {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteSignalLog {
    /// Opens (and initializes) a signal log database.
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
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SignalLogError> {
        self.connection
            .lock()
            .map_err(|_| SignalLogError::Store("signal log mutex poisoned".to_string()))
    }
}

/// Maps a signal log row (id, envelope columns, accepted_at) to a record.
fn record_from_row(row: &Row<'_>) -> Result<SignalRecord, rusqlite::Error> {
    let record_id: i64 = row.get(0)?;
    let org_id: String = row.get(1)?;
    let signal_id: String = row.get(2)?;
    let source_system: String = row.get(3)?;
    let learner_reference: String = row.get(4)?;
    let timestamp: String = row.get(5)?;
    let schema_version: String = row.get(6)?;
    let payload: String = row.get(7)?;
    let metadata: Option<String> = row.get(8)?;
    let accepted_at: String = row.get(9)?;
    let payload = serde_json::from_str(&payload).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(err))
    })?;
    let metadata = match metadata {
        None => None,
        Some(raw) => Some(serde_json::from_str(&raw).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(err))
        })?),
    };
    Ok(SignalRecord {
        envelope: SignalEnvelope {
            org_id: OrgId::new(org_id),
            signal_id: SignalId::new(signal_id),
            source_system,
            learner_reference: learner_reference.into(),
            timestamp,
            schema_version,
            payload,
            metadata,
        },
        accepted_at,
        record_id,
    })
}

/// Column list shared by every record-producing query.
const RECORD_COLUMNS: &str = "id, org_id, signal_id, source_system, learner_reference, timestamp, \
                              schema_version, payload, metadata, accepted_at";

impl SignalLog for SqliteSignalLog {
    fn append(
        &self,
        envelope: &SignalEnvelope,
        accepted_at: &str,
    ) -> Result<SignalRecord, SignalLogError> {
        let accepted_at_ms = rfc3339_to_unix_millis(accepted_at)
            .map_err(|err| SignalLogError::Invalid(err.to_string()))?;
        let payload = serde_json::to_string(&envelope.payload)
            .map_err(|err| SignalLogError::Invalid(err.to_string()))?;
        let metadata = match &envelope.metadata {
            None => None,
            Some(metadata) => Some(
                serde_json::to_string(metadata)
                    .map_err(|err| SignalLogError::Invalid(err.to_string()))?,
            ),
        };

        let guard = self.lock()?;
        let result = guard.execute(
            "INSERT INTO signal_log (org_id, signal_id, source_system, learner_reference, \
             timestamp, schema_version, payload, metadata, accepted_at, accepted_at_ms) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                envelope.org_id.as_str(),
                envelope.signal_id.as_str(),
                envelope.source_system,
                envelope.learner_reference.as_str(),
                envelope.timestamp,
                envelope.schema_version,
                payload,
                metadata,
                accepted_at,
                accepted_at_ms
            ],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(SignalLogError::Store(format!(
                    "duplicate signal {} in org {}",
                    envelope.signal_id, envelope.org_id
                )));
            }
            Err(err) => return Err(SignalLogError::Store(err.to_string())),
        }
        let record_id = guard.last_insert_rowid();
        drop(guard);
        Ok(SignalRecord {
            envelope: envelope.clone(),
            accepted_at: accepted_at.to_string(),
            record_id,
        })
    }

    fn query_range(&self, query: &RangeQuery) -> Result<SignalPage, SignalLogError> {
        let guard = self.lock()?;
        let anchor = match query.cursor {
            None => None,
            Some(cursor) => {
                let anchor_ms: Option<i64> = guard
                    .query_row(
                        "SELECT accepted_at_ms FROM signal_log WHERE id = ?1 AND org_id = ?2 AND \
                         learner_reference = ?3",
                        params![
                            cursor.last_row_id(),
                            query.org_id.as_str(),
                            query.learner_reference.as_str()
                        ],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(|err| SignalLogError::Store(err.to_string()))?;
                let Some(anchor_ms) = anchor_ms else {
                    return Err(SignalLogError::UnknownPageToken);
                };
                Some((anchor_ms, cursor.last_row_id()))
            }
        };

        let limit = i64::try_from(query.page_size)
            .map_err(|_| SignalLogError::Invalid("page size too large".to_string()))?
            + 1;
        let (anchor_ms, anchor_id) = anchor.unwrap_or((i64::MIN, i64::MIN));
        let mut stmt = guard
            .prepare_cached(&format!(
                "SELECT {RECORD_COLUMNS} FROM signal_log WHERE org_id = ?1 AND learner_reference \
                 = ?2 AND accepted_at_ms >= ?3 AND accepted_at_ms <= ?4 AND (accepted_at_ms > ?5 \
                 OR (accepted_at_ms = ?5 AND id > ?6)) ORDER BY accepted_at_ms ASC, id ASC LIMIT \
                 ?7"
            ))
            .map_err(|err| SignalLogError::Store(err.to_string()))?;
        let rows = stmt
            .query_map(
                params![
                    query.org_id.as_str(),
                    query.learner_reference.as_str(),
                    query.from_ms,
                    query.to_ms,
                    anchor_ms,
                    anchor_id,
                    limit
                ],
                record_from_row,
            )
            .map_err(|err| SignalLogError::Store(err.to_string()))?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|err| SignalLogError::Store(err.to_string()))?);
        }
        drop(stmt);
        drop(guard);

        let next_cursor = if records.len() > query.page_size {
            records.truncate(query.page_size);
            records.last().map(|record| PageCursor::new(record.record_id))
        } else {
            None
        };
        Ok(SignalPage {
            records,
            next_cursor,
        })
    }

    fn get_by_ids(
        &self,
        org_id: &OrgId,
        signal_ids: &[SignalId],
    ) -> Result<Vec<SignalRecord>, SignalLogError> {
        if signal_ids.is_empty() {
            return Ok(Vec::new());
        }
        let guard = self.lock()?;
        let placeholders = placeholders_for(signal_ids.len());
        let mut stmt = guard
            .prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM signal_log WHERE org_id = ?1 AND signal_id IN \
                 ({placeholders}) ORDER BY accepted_at_ms ASC, id ASC"
            ))
            .map_err(|err| SignalLogError::Store(err.to_string()))?;
        let mut bindings: Vec<SqlValue> = Vec::with_capacity(signal_ids.len() + 1);
        bindings.push(SqlValue::Text(org_id.as_str().to_string()));
        for signal_id in signal_ids {
            bindings.push(SqlValue::Text(signal_id.as_str().to_string()));
        }
        let rows = stmt
            .query_map(rusqlite::params_from_iter(bindings), record_from_row)
            .map_err(|err| SignalLogError::Store(err.to_string()))?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|err| SignalLogError::Store(err.to_string()))?);
        }
        drop(stmt);

        if records.len() < signal_ids.len() {
            // Secondary existence check without the org filter distinguishes
            // unknown ids from cross-tenant ids; unknown takes precedence.
            let mut unknown: Vec<String> = Vec::new();
            let mut foreign: Vec<String> = Vec::new();
            for signal_id in signal_ids {
                if records.iter().any(|record| &record.envelope.signal_id == signal_id) {
                    continue;
                }
                let exists: Option<i64> = guard
                    .query_row(
                        "SELECT 1 FROM signal_log WHERE signal_id = ?1 LIMIT 1",
                        params![signal_id.as_str()],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(|err| SignalLogError::Store(err.to_string()))?;
                if exists.is_some() {
                    foreign.push(signal_id.as_str().to_string());
                } else {
                    unknown.push(signal_id.as_str().to_string());
                }
            }
            drop(guard);
            if !unknown.is_empty() {
                return Err(SignalLogError::UnknownSignalIds {
                    ids: unknown,
                });
            }
            if !foreign.is_empty() {
                return Err(SignalLogError::NotInOrgScope {
                    ids: foreign,
                });
            }
        } else {
            drop(guard);
        }
        Ok(records)
    }

    fn readiness(&self) -> Result<(), SignalLogError> {
        let guard = self.lock()?;
        guard
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|err| SignalLogError::Store(err.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds `?2, ?3, ...` placeholders following the org binding.
fn placeholders_for(count: usize) -> String {
    let mut rendered = String::new();
    for index in 0 .. count {
        if index > 0 {
            rendered.push_str(", ");
        }
        rendered.push_str(&format!("?{}", index + 2));
    }
    rendered
}
