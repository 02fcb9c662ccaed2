// crates/lcl-core/src/runtime/memory.rs
// ============================================================================
// Module: In-Memory Stores
// Description: Reference implementations of the storage interfaces.
// Purpose: Back engine tests and embedded use without a database.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! These stores implement the full storage contracts — tenant scoping inside
//! the query, canonical ordering, keyset pagination, the optimistic version
//! constraint, and the unknown-vs-cross-tenant classification — over plain
//! mutex-guarded vectors. They mirror the durable SQLite stores closely
//! enough that engine tests are portable across backends.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::core::decision::Decision;
use crate::core::decision::DecisionId;
use crate::core::envelope::SignalEnvelope;
use crate::core::envelope::SignalRecord;
use crate::core::identifiers::LearnerRef;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::SignalId;
use crate::core::state::AppliedSignal;
use crate::core::state::LearnerState;
use crate::core::time::rfc3339_to_unix_millis;
use crate::interfaces::DecisionPage;
use crate::interfaces::DecisionStore;
use crate::interfaces::DecisionStoreError;
use crate::interfaces::IdempotencyError;
use crate::interfaces::IdempotencyIndex;
use crate::interfaces::IdempotencyOutcome;
use crate::interfaces::RangeQuery;
use crate::interfaces::SignalLog;
use crate::interfaces::SignalLogError;
use crate::interfaces::SignalPage;
use crate::interfaces::StateStore;
use crate::interfaces::StateStoreError;
use crate::interfaces::cursor::PageCursor;

// ============================================================================
// SECTION: Signal Log
// ============================================================================

/// In-memory append-only signal log.
///
/// # Invariants
/// - `(org_id, signal_id)` is unique across the log.
/// - Insertion ids are assigned monotonically starting at 1.
#[derive(Debug, Default)]
pub struct InMemorySignalLog {
    /// Stored records in insertion order.
    records: Mutex<Vec<SignalRecord>>,
}

impl InMemorySignalLog {
    /// Creates an empty in-memory signal log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalLog for InMemorySignalLog {
    fn append(
        &self,
        envelope: &SignalEnvelope,
        accepted_at: &str,
    ) -> Result<SignalRecord, SignalLogError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| SignalLogError::Store("signal log mutex poisoned".to_string()))?;
        let exists = records.iter().any(|record| {
            record.envelope.org_id == envelope.org_id
                && record.envelope.signal_id == envelope.signal_id
        });
        if exists {
            return Err(SignalLogError::Store(format!(
                "duplicate signal {} in org {}",
                envelope.signal_id, envelope.org_id
            )));
        }
        let record_id = i64::try_from(records.len())
            .map_err(|_| SignalLogError::Store("signal log insertion id overflow".to_string()))?
            + 1;
        let record = SignalRecord {
            envelope: envelope.clone(),
            accepted_at: accepted_at.to_string(),
            record_id,
        };
        records.push(record.clone());
        Ok(record)
    }

    fn query_range(&self, query: &RangeQuery) -> Result<SignalPage, SignalLogError> {
        let records = self
            .records
            .lock()
            .map_err(|_| SignalLogError::Store("signal log mutex poisoned".to_string()))?;
        let mut matched: Vec<(i64, SignalRecord)> = Vec::new();
        for record in records.iter() {
            if record.envelope.org_id != query.org_id
                || record.envelope.learner_reference != query.learner_reference
            {
                continue;
            }
            let millis = rfc3339_to_unix_millis(&record.accepted_at)
                .map_err(|err| SignalLogError::Invalid(err.to_string()))?;
            if millis < query.from_ms || millis > query.to_ms {
                continue;
            }
            matched.push((millis, record.clone()));
        }
        matched.sort_by_key(|(millis, record)| (*millis, record.record_id));

        let start_after = match query.cursor {
            None => None,
            Some(cursor) => {
                let row = records.iter().find(|record| {
                    record.record_id == cursor.last_row_id()
                        && record.envelope.org_id == query.org_id
                        && record.envelope.learner_reference == query.learner_reference
                });
                let Some(row) = row else {
                    return Err(SignalLogError::UnknownPageToken);
                };
                let millis = rfc3339_to_unix_millis(&row.accepted_at)
                    .map_err(|err| SignalLogError::Invalid(err.to_string()))?;
                Some((millis, row.record_id))
            }
        };
        let mut page: Vec<SignalRecord> = matched
            .into_iter()
            .filter(|(millis, record)| match start_after {
                None => true,
                Some(anchor) => (*millis, record.record_id) > anchor,
            })
            .map(|(_, record)| record)
            .collect();

        let next_cursor = if page.len() > query.page_size {
            page.truncate(query.page_size);
            page.last().map(|record| PageCursor::new(record.record_id))
        } else {
            None
        };
        Ok(SignalPage {
            records: page,
            next_cursor,
        })
    }

    fn get_by_ids(
        &self,
        org_id: &OrgId,
        signal_ids: &[SignalId],
    ) -> Result<Vec<SignalRecord>, SignalLogError> {
        let records = self
            .records
            .lock()
            .map_err(|_| SignalLogError::Store("signal log mutex poisoned".to_string()))?;
        let mut found: Vec<SignalRecord> = records
            .iter()
            .filter(|record| {
                &record.envelope.org_id == org_id
                    && signal_ids.contains(&record.envelope.signal_id)
            })
            .cloned()
            .collect();
        if found.len() < signal_ids.len() {
            let mut unknown: Vec<String> = Vec::new();
            let mut foreign: Vec<String> = Vec::new();
            for signal_id in signal_ids {
                if found.iter().any(|record| &record.envelope.signal_id == signal_id) {
                    continue;
                }
                let exists_anywhere =
                    records.iter().any(|record| &record.envelope.signal_id == signal_id);
                if exists_anywhere {
                    foreign.push(signal_id.as_str().to_string());
                } else {
                    unknown.push(signal_id.as_str().to_string());
                }
            }
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
        }
        let mut keyed: Vec<(i64, SignalRecord)> = Vec::with_capacity(found.len());
        for record in found.drain(..) {
            let millis = rfc3339_to_unix_millis(&record.accepted_at)
                .map_err(|err| SignalLogError::Invalid(err.to_string()))?;
            keyed.push((millis, record));
        }
        keyed.sort_by_key(|(millis, record)| (*millis, record.record_id));
        Ok(keyed.into_iter().map(|(_, record)| record).collect())
    }
}

// ============================================================================
// SECTION: Idempotency Index
// ============================================================================

/// In-memory first-wins `(org_id, signal_id)` index.
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyIndex {
    /// First-acceptance timestamps keyed by `(org_id, signal_id)`.
    entries: Mutex<BTreeMap<(String, String), String>>,
}

impl InMemoryIdempotencyIndex {
    /// Creates an empty in-memory index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdempotencyIndex for InMemoryIdempotencyIndex {
    fn check_and_store(
        &self,
        org_id: &OrgId,
        signal_id: &SignalId,
        received_at: &str,
    ) -> Result<IdempotencyOutcome, IdempotencyError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| IdempotencyError::Store("idempotency mutex poisoned".to_string()))?;
        let key = (org_id.as_str().to_string(), signal_id.as_str().to_string());
        if let Some(original) = entries.get(&key) {
            return Ok(IdempotencyOutcome {
                is_duplicate: true,
                received_at: original.clone(),
            });
        }
        entries.insert(key, received_at.to_string());
        Ok(IdempotencyOutcome {
            is_duplicate: false,
            received_at: received_at.to_string(),
        })
    }
}

// ============================================================================
// SECTION: State Store
// ============================================================================

/// Inner rows guarded by one mutex so inserts stay atomic.
#[derive(Debug, Default)]
struct StateRows {
    /// All persisted state versions, insertion order.
    states: Vec<LearnerState>,
    /// All applied-signal rows, insertion order.
    applied: Vec<AppliedSignal>,
}

/// In-memory versioned learner state store.
///
/// # Invariants
/// - `(org_id, learner_reference, state_version)` is unique.
/// - Snapshot and applied rows are inserted under one lock.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    /// Guarded state and applied-signal rows.
    rows: Mutex<StateRows>,
}

impl InMemoryStateStore {
    /// Creates an empty in-memory state store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every persisted version for a learner, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the store is unavailable.
    pub fn versions(
        &self,
        org_id: &OrgId,
        learner_reference: &LearnerRef,
    ) -> Result<Vec<LearnerState>, StateStoreError> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| StateStoreError::Store("state store mutex poisoned".to_string()))?;
        let mut versions: Vec<LearnerState> = rows
            .states
            .iter()
            .filter(|state| {
                &state.org_id == org_id && &state.learner_reference == learner_reference
            })
            .cloned()
            .collect();
        versions.sort_by_key(|state| state.state_version);
        Ok(versions)
    }
}

impl StateStore for InMemoryStateStore {
    fn latest(
        &self,
        org_id: &OrgId,
        learner_reference: &LearnerRef,
    ) -> Result<Option<LearnerState>, StateStoreError> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| StateStoreError::Store("state store mutex poisoned".to_string()))?;
        Ok(rows
            .states
            .iter()
            .filter(|state| {
                &state.org_id == org_id && &state.learner_reference == learner_reference
            })
            .max_by_key(|state| state.state_version)
            .cloned())
    }

    fn already_applied(
        &self,
        org_id: &OrgId,
        learner_reference: &LearnerRef,
        signal_ids: &[SignalId],
    ) -> Result<Vec<SignalId>, StateStoreError> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| StateStoreError::Store("state store mutex poisoned".to_string()))?;
        Ok(signal_ids
            .iter()
            .filter(|signal_id| {
                rows.applied.iter().any(|row| {
                    &row.org_id == org_id
                        && &row.learner_reference == learner_reference
                        && row.signal_id == **signal_id
                })
            })
            .cloned()
            .collect())
    }

    fn insert_version(
        &self,
        state: &LearnerState,
        applied: &[AppliedSignal],
    ) -> Result<(), StateStoreError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StateStoreError::Store("state store mutex poisoned".to_string()))?;
        let conflict = rows.states.iter().any(|existing| {
            existing.org_id == state.org_id
                && existing.learner_reference == state.learner_reference
                && existing.state_version == state.state_version
        });
        if conflict {
            return Err(StateStoreError::VersionConflict {
                org_id: state.org_id.as_str().to_string(),
                learner_reference: state.learner_reference.as_str().to_string(),
                state_version: state.state_version,
            });
        }
        let replayed = applied.iter().any(|row| {
            rows.applied.iter().any(|existing| {
                existing.org_id == row.org_id
                    && existing.learner_reference == row.learner_reference
                    && existing.signal_id == row.signal_id
            })
        });
        if replayed {
            return Err(StateStoreError::Invalid(
                "applied signal already recorded for learner".to_string(),
            ));
        }
        rows.states.push(state.clone());
        rows.applied.extend(applied.iter().cloned());
        Ok(())
    }
}

// ============================================================================
// SECTION: Decision Store
// ============================================================================

/// In-memory append-only decision store.
///
/// # Invariants
/// - `(org_id, decision_id)` is unique.
#[derive(Debug, Default)]
pub struct InMemoryDecisionStore {
    /// Stored decisions in insertion order.
    decisions: Mutex<Vec<Decision>>,
}

impl InMemoryDecisionStore {
    /// Creates an empty in-memory decision store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DecisionStore for InMemoryDecisionStore {
    fn save(&self, decision: &Decision) -> Result<(), DecisionStoreError> {
        if decision.trace.state_id.as_str().trim().is_empty() {
            return Err(DecisionStoreError::MissingTrace {
                decision_id: decision.decision_id.to_string(),
            });
        }
        let mut decisions = self
            .decisions
            .lock()
            .map_err(|_| DecisionStoreError::Store("decision store mutex poisoned".to_string()))?;
        let exists = decisions.iter().any(|existing| {
            existing.org_id == decision.org_id && existing.decision_id == decision.decision_id
        });
        if exists {
            return Err(DecisionStoreError::Duplicate {
                decision_id: decision.decision_id.to_string(),
            });
        }
        let record_id = i64::try_from(decisions.len())
            .map_err(|_| DecisionStoreError::Store("decision insertion id overflow".to_string()))?
            + 1;
        let mut stored = decision.clone();
        stored.record_id = record_id;
        decisions.push(stored);
        Ok(())
    }

    fn query_range(&self, query: &RangeQuery) -> Result<DecisionPage, DecisionStoreError> {
        let decisions = self
            .decisions
            .lock()
            .map_err(|_| DecisionStoreError::Store("decision store mutex poisoned".to_string()))?;
        let mut matched: Vec<(i64, Decision)> = Vec::new();
        for decision in decisions.iter() {
            if decision.org_id != query.org_id
                || decision.learner_reference != query.learner_reference
            {
                continue;
            }
            let millis = rfc3339_to_unix_millis(&decision.decided_at)
                .map_err(|err| DecisionStoreError::Invalid(err.to_string()))?;
            if millis < query.from_ms || millis > query.to_ms {
                continue;
            }
            matched.push((millis, decision.clone()));
        }
        matched.sort_by_key(|(millis, decision)| (*millis, decision.record_id));

        let start_after = match query.cursor {
            None => None,
            Some(cursor) => {
                let row = decisions.iter().find(|decision| {
                    decision.record_id == cursor.last_row_id()
                        && decision.org_id == query.org_id
                        && decision.learner_reference == query.learner_reference
                });
                let Some(row) = row else {
                    return Err(DecisionStoreError::UnknownPageToken);
                };
                let millis = rfc3339_to_unix_millis(&row.decided_at)
                    .map_err(|err| DecisionStoreError::Invalid(err.to_string()))?;
                Some((millis, row.record_id))
            }
        };
        let mut page: Vec<Decision> = matched
            .into_iter()
            .filter(|(millis, decision)| match start_after {
                None => true,
                Some(anchor) => (*millis, decision.record_id) > anchor,
            })
            .map(|(_, decision)| decision)
            .collect();

        let next_cursor = if page.len() > query.page_size {
            page.truncate(query.page_size);
            page.last().map(|decision| PageCursor::new(decision.record_id))
        } else {
            None
        };
        Ok(DecisionPage {
            decisions: page,
            next_cursor,
        })
    }

    fn get_by_id(
        &self,
        org_id: &OrgId,
        decision_id: &DecisionId,
    ) -> Result<Option<Decision>, DecisionStoreError> {
        let decisions = self
            .decisions
            .lock()
            .map_err(|_| DecisionStoreError::Store("decision store mutex poisoned".to_string()))?;
        Ok(decisions
            .iter()
            .find(|decision| {
                &decision.org_id == org_id && &decision.decision_id == decision_id
            })
            .cloned())
    }
}
