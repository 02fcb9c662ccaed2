// crates/lcl-store-sqlite/src/decision_store.rs
// ============================================================================
// Module: SQLite Decision Store
// Description: Durable append-only decision store with trace columns.
// Purpose: Persist immutable decisions with deterministic range reads.
// Dependencies: lcl-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! Decisions are insert-only with `(org_id, decision_id)` unique. The trace
//! is flattened into columns so range reads never re-parse JSON, while the
//! decision context round-trips byte-identically through a TEXT column.
//! Reads order by `(decided_at, id)` with the rowid as the tie-break.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;

use lcl_core::Decision;
use lcl_core::DecisionId;
use lcl_core::DecisionPage;
use lcl_core::DecisionStore;
use lcl_core::DecisionStoreError;
use lcl_core::DecisionTrace;
use lcl_core::DecisionType;
use lcl_core::LearnerRef;
use lcl_core::OrgId;
use lcl_core::RangeQuery;
use lcl_core::StateId;
use lcl_core::core::time::rfc3339_to_unix_millis;
use lcl_core::interfaces::cursor::PageCursor;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;

use crate::connection::SqliteStoreConfig;
use crate::connection::SqliteStoreError;
use crate::connection::initialize_schema;
use crate::connection::open_connection;

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Schema version for the decision database.
const SCHEMA_VERSION: i64 = 1;

/// DDL for the decision table.
const SCHEMA_DDL: &str = "CREATE TABLE IF NOT EXISTS decisions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    org_id TEXT NOT NULL,
    decision_id TEXT NOT NULL UNIQUE,
    learner_reference TEXT NOT NULL,
    decision_type TEXT NOT NULL,
    decided_at TEXT NOT NULL,
    decided_at_ms INTEGER NOT NULL,
    decision_context TEXT NOT NULL,
    trace_state_id TEXT NOT NULL,
    trace_state_version INTEGER NOT NULL,
    trace_policy_version TEXT NOT NULL,
    trace_matched_rule_id TEXT,
    UNIQUE (org_id, decision_id)
);
CREATE INDEX IF NOT EXISTS idx_decisions_learner
    ON decisions (org_id, learner_reference, decided_at_ms);";

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed append-only decision store.
///
/// # Invariants
/// - Rows are never updated or deleted.
/// - Every read filters on `org_id` inside the SQL query.
#[derive(Clone)]
pub struct SqliteDecisionStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteDecisionStore {
    /// Opens (and initializes) a decision database.
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
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, DecisionStoreError> {
        self.connection
            .lock()
            .map_err(|_| DecisionStoreError::Store("decision store mutex poisoned".to_string()))
    }
}

/// Column list shared by every decision-producing query.
const DECISION_COLUMNS: &str = "id, org_id, decision_id, learner_reference, decision_type, \
                                decided_at, decision_context, trace_state_id, \
                                trace_state_version, trace_policy_version, trace_matched_rule_id";

/// Maps a decision row to its domain type.
fn decision_from_row(row: &Row<'_>) -> Result<Decision, rusqlite::Error> {
    let record_id: i64 = row.get(0)?;
    let org_id: String = row.get(1)?;
    let decision_id: String = row.get(2)?;
    let learner_reference: String = row.get(3)?;
    let decision_type: String = row.get(4)?;
    let decided_at: String = row.get(5)?;
    let decision_context: String = row.get(6)?;
    let trace_state_id: String = row.get(7)?;
    let trace_state_version: i64 = row.get(8)?;
    let trace_policy_version: String = row.get(9)?;
    let trace_matched_rule_id: Option<String> = row.get(10)?;

    let decision_id = DecisionId::from_str(&decision_id).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(err))
    })?;
    let decision_type = DecisionType::from_str(&decision_type).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(err))
    })?;
    let decision_context = serde_json::from_str(&decision_context).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(err))
    })?;
    Ok(Decision {
        org_id: OrgId::new(org_id),
        decision_id,
        learner_reference: LearnerRef::new(learner_reference),
        decision_type,
        decided_at,
        decision_context,
        trace: DecisionTrace {
            state_id: StateId::new(trace_state_id),
            state_version: trace_state_version,
            policy_version: trace_policy_version,
            matched_rule_id: trace_matched_rule_id,
        },
        record_id,
    })
}

impl DecisionStore for SqliteDecisionStore {
    fn save(&self, decision: &Decision) -> Result<(), DecisionStoreError> {
        if decision.trace.state_id.as_str().trim().is_empty() {
            return Err(DecisionStoreError::MissingTrace {
                decision_id: decision.decision_id.to_string(),
            });
        }
        let decided_at_ms = rfc3339_to_unix_millis(&decision.decided_at)
            .map_err(|err| DecisionStoreError::Invalid(err.to_string()))?;
        let context = serde_json::to_string(&decision.decision_context)
            .map_err(|err| DecisionStoreError::Invalid(err.to_string()))?;

        let guard = self.lock()?;
        let result = guard.execute(
            "INSERT INTO decisions (org_id, decision_id, learner_reference, decision_type, \
             decided_at, decided_at_ms, decision_context, trace_state_id, trace_state_version, \
             trace_policy_version, trace_matched_rule_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, \
             ?8, ?9, ?10, ?11)",
            params![
                decision.org_id.as_str(),
                decision.decision_id.to_string(),
                decision.learner_reference.as_str(),
                decision.decision_type.as_str(),
                decision.decided_at,
                decided_at_ms,
                context,
                decision.trace.state_id.as_str(),
                decision.trace.state_version,
                decision.trace.policy_version,
                decision.trace.matched_rule_id
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(DecisionStoreError::Duplicate {
                    decision_id: decision.decision_id.to_string(),
                })
            }
            Err(err) => Err(DecisionStoreError::Store(err.to_string())),
        }
    }

    fn query_range(&self, query: &RangeQuery) -> Result<DecisionPage, DecisionStoreError> {
        let guard = self.lock()?;
        let anchor = match query.cursor {
            None => None,
            Some(cursor) => {
                let anchor_ms: Option<i64> = guard
                    .query_row(
                        "SELECT decided_at_ms FROM decisions WHERE id = ?1 AND org_id = ?2 AND \
                         learner_reference = ?3",
                        params![
                            cursor.last_row_id(),
                            query.org_id.as_str(),
                            query.learner_reference.as_str()
                        ],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(|err| DecisionStoreError::Store(err.to_string()))?;
                let Some(anchor_ms) = anchor_ms else {
                    return Err(DecisionStoreError::UnknownPageToken);
                };
                Some((anchor_ms, cursor.last_row_id()))
            }
        };

        let limit = i64::try_from(query.page_size)
            .map_err(|_| DecisionStoreError::Invalid("page size too large".to_string()))?
            + 1;
        let (anchor_ms, anchor_id) = anchor.unwrap_or((i64::MIN, i64::MIN));
        let mut stmt = guard
            .prepare_cached(&format!(
                "SELECT {DECISION_COLUMNS} FROM decisions WHERE org_id = ?1 AND \
                 learner_reference = ?2 AND decided_at_ms >= ?3 AND decided_at_ms <= ?4 AND \
                 (decided_at_ms > ?5 OR (decided_at_ms = ?5 AND id > ?6)) ORDER BY decided_at_ms \
                 ASC, id ASC LIMIT ?7"
            ))
            .map_err(|err| DecisionStoreError::Store(err.to_string()))?;
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
                decision_from_row,
            )
            .map_err(|err| DecisionStoreError::Store(err.to_string()))?;
        let mut decisions = Vec::new();
        for row in rows {
            decisions.push(row.map_err(|err| DecisionStoreError::Store(err.to_string()))?);
        }
        drop(stmt);
        drop(guard);

        let next_cursor = if decisions.len() > query.page_size {
            decisions.truncate(query.page_size);
            decisions.last().map(|decision| PageCursor::new(decision.record_id))
        } else {
            None
        };
        Ok(DecisionPage {
            decisions,
            next_cursor,
        })
    }

    fn get_by_id(
        &self,
        org_id: &OrgId,
        decision_id: &DecisionId,
    ) -> Result<Option<Decision>, DecisionStoreError> {
        let guard = self.lock()?;
        guard
            .query_row(
                &format!(
                    "SELECT {DECISION_COLUMNS} FROM decisions WHERE org_id = ?1 AND decision_id \
                     = ?2"
                ),
                params![org_id.as_str(), decision_id.to_string()],
                decision_from_row,
            )
            .optional()
            .map_err(|err| DecisionStoreError::Store(err.to_string()))
    }

    fn readiness(&self) -> Result<(), DecisionStoreError> {
        let guard = self.lock()?;
        guard
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|err| DecisionStoreError::Store(err.to_string()))?;
        Ok(())
    }
}
