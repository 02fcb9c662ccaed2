// crates/lcl-core/src/runtime/state_engine.rs
// ============================================================================
// Module: STATE Engine
// Description: Deterministic reducer from accepted signals to learner state.
// Purpose: Fold signal batches into monotonically versioned state snapshots.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The STATE engine is the only writer of learner state. It fetches the
//! referenced signal records with tenant scoping, sorts them into the
//! canonical `(accepted_at, id)` order, drops signals that were already
//! applied to the learner, folds the remainder through the deep-merge
//! reducer, and persists the new snapshot together with its applied-signal
//! rows in one atomic insert. Optimistic concurrency rides on the
//! `(org_id, learner_reference, state_version)` uniqueness constraint; a lost
//! race is retried exactly once, then rejected deterministically.
//!
//! Rejections are values ([`Rejection`]); the engine never panics on bad
//! input. Backend faults surface separately as [`StateEngineError::Store`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::envelope::SignalRecord;
use crate::core::errors::ErrorCode;
use crate::core::errors::FieldError;
use crate::core::errors::Rejection;
use crate::core::identifiers::LearnerRef;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::SignalId;
use crate::core::identifiers::StateId;
use crate::core::merge::deep_merge;
use crate::core::scan::scan_value;
use crate::core::state::AppliedSignal;
use crate::core::state::LearnerState;
use crate::core::state::StateProvenance;
use crate::core::time::rfc3339_to_unix_millis;
use crate::interfaces::SignalLog;
use crate::interfaces::SignalLogError;
use crate::interfaces::StateStore;
use crate::interfaces::StateStoreError;

// ============================================================================
// SECTION: Requests and Results
// ============================================================================

/// Request to fold a batch of accepted signals into learner state.
///
/// # Invariants
/// - `requested_at` is supplied by the caller; the engine never reads
///   wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplySignalsRequest {
    /// Tenant scope of the batch.
    pub org_id: String,
    /// Learner the batch applies to.
    pub learner_reference: String,
    /// Identifiers of previously accepted signals.
    pub signal_ids: Vec<String>,
    /// Caller-supplied request timestamp (RFC3339).
    pub requested_at: String,
}

/// Result of a successful apply, including idempotent no-op replays.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyResult {
    /// Tenant scope of the result.
    pub org_id: OrgId,
    /// Learner the result belongs to.
    pub learner_reference: LearnerRef,
    /// Canonical identifier of the resulting state.
    pub state_id: StateId,
    /// Version of the resulting state (unchanged for no-op replays).
    pub state_version: i64,
    /// Signals newly applied by this call, in canonical order.
    pub applied_signal_ids: Vec<SignalId>,
    /// The resulting state document.
    pub state: Value,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// STATE engine failures.
///
/// # Invariants
/// - `Rejected` carries the full coded rejection; `Store` is reserved for
///   backend faults outside the rejection taxonomy.
#[derive(Debug, Error)]
pub enum StateEngineError {
    /// The request was rejected with stable error codes.
    #[error("apply rejected: {0}")]
    Rejected(Rejection),
    /// A storage backend failed.
    #[error("state engine store failure: {0}")]
    Store(String),
}

impl StateEngineError {
    /// Builds a single-entry rejection.
    fn rejected(code: ErrorCode, message: impl Into<String>, field_path: &str) -> Self {
        Self::Rejected(Rejection::single(FieldError::at(code, message, field_path)))
    }
}

/// Outcome classification for a single apply attempt.
enum AttemptError {
    /// A concurrent writer took the target version; the caller may retry.
    Conflict,
    /// Terminal failure; surfaced unchanged.
    Terminal(StateEngineError),
}

impl From<StateStoreError> for AttemptError {
    fn from(error: StateStoreError) -> Self {
        match error {
            StateStoreError::VersionConflict {
                ..
            } => Self::Conflict,
            other => Self::Terminal(StateEngineError::Store(other.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Deterministic reducer from accepted signals to learner state versions.
///
/// # Invariants
/// - State versions per learner are gap-free and strictly monotonic.
/// - A signal is folded into a learner's state at most once.
pub struct StateEngine<L, S> {
    /// Source of accepted signal records.
    signal_log: Arc<L>,
    /// Learner state persistence.
    state_store: Arc<S>,
}

impl<L, S> Clone for StateEngine<L, S> {
    fn clone(&self) -> Self {
        Self {
            signal_log: Arc::clone(&self.signal_log),
            state_store: Arc::clone(&self.state_store),
        }
    }
}

impl<L, S> StateEngine<L, S>
where
    L: SignalLog,
    S: StateStore,
{
    /// Creates a STATE engine over a signal log and a state store.
    #[must_use]
    pub const fn new(signal_log: Arc<L>, state_store: Arc<S>) -> Self {
        Self {
            signal_log,
            state_store,
        }
    }

    /// Folds the referenced signals into a new learner state version.
    ///
    /// Replaying an already-applied batch is a no-op success with an empty
    /// `applied_signal_ids` and the prior version. A cross-tenant or unknown
    /// id anywhere in the batch rejects the whole batch.
    ///
    /// # Errors
    ///
    /// Returns [`StateEngineError::Rejected`] with stable codes
    /// (`org_scope_required`, `missing_required_field`, `unknown_signal_id`,
    /// `signals_not_in_org_scope`, `forbidden_semantic_key_detected`,
    /// `state_payload_not_object`, `state_version_conflict`), or
    /// [`StateEngineError::Store`] for backend faults.
    pub fn apply_signals(
        &self,
        request: &ApplySignalsRequest,
    ) -> Result<ApplyResult, StateEngineError> {
        let (org_id, learner_reference, signal_ids) = validate_request(request)?;
        let mut records = self.fetch_records(&org_id, &signal_ids)?;
        sort_canonical(&mut records)?;

        // One initial attempt plus exactly one retry after a lost race.
        let mut conflict_seen = false;
        loop {
            match self.apply_once(&org_id, &learner_reference, &records, &request.requested_at) {
                Ok(result) => return Ok(result),
                Err(AttemptError::Conflict) if !conflict_seen => {
                    conflict_seen = true;
                }
                Err(AttemptError::Conflict) => {
                    return Err(StateEngineError::rejected(
                        ErrorCode::StateVersionConflict,
                        "concurrent state update won twice; retry the request",
                        "state_version",
                    ));
                }
                Err(AttemptError::Terminal(error)) => return Err(error),
            }
        }
    }

    /// Fetches the batch's records, mapping scope violations to rejections.
    fn fetch_records(
        &self,
        org_id: &OrgId,
        signal_ids: &[SignalId],
    ) -> Result<Vec<SignalRecord>, StateEngineError> {
        match self.signal_log.get_by_ids(org_id, signal_ids) {
            Ok(records) => Ok(records),
            Err(SignalLogError::UnknownSignalIds {
                ids,
            }) => Err(StateEngineError::rejected(
                ErrorCode::UnknownSignalId,
                format!("unknown signal ids: {}", ids.join(", ")),
                "signal_ids",
            )),
            Err(SignalLogError::NotInOrgScope {
                ids,
            }) => Err(StateEngineError::rejected(
                ErrorCode::SignalsNotInOrgScope,
                format!("signals outside org scope: {}", ids.join(", ")),
                "signal_ids",
            )),
            Err(err) => Err(StateEngineError::Store(err.to_string())),
        }
    }

    /// Runs one full apply attempt against the current stored state.
    fn apply_once(
        &self,
        org_id: &OrgId,
        learner_reference: &LearnerRef,
        records: &[SignalRecord],
        requested_at: &str,
    ) -> Result<ApplyResult, AttemptError> {
        let prior = self.state_store.latest(org_id, learner_reference).map_err(AttemptError::from)?;
        let prior_version = prior.as_ref().map_or(0, |state| state.state_version);

        let batch_ids: Vec<SignalId> =
            records.iter().map(|record| record.envelope.signal_id.clone()).collect();
        let already = self
            .state_store
            .already_applied(org_id, learner_reference, &batch_ids)
            .map_err(AttemptError::from)?;
        let remaining: Vec<&SignalRecord> = records
            .iter()
            .filter(|record| !already.contains(&record.envelope.signal_id))
            .collect();

        let Some(last_record) = remaining.last() else {
            // Idempotent replay: nothing new to fold, prior coordinates stand.
            let state_id = prior.as_ref().map_or_else(
                || StateId::for_version(org_id, learner_reference, 0),
                |state| state.state_id.clone(),
            );
            let state = prior
                .as_ref()
                .map_or_else(|| Value::Object(Map::new()), |state| state.state.clone());
            return Ok(ApplyResult {
                org_id: org_id.clone(),
                learner_reference: learner_reference.clone(),
                state_id,
                state_version: prior_version,
                applied_signal_ids: Vec::new(),
                state,
            });
        };
        let last_record = (*last_record).clone();

        let base = prior
            .as_ref()
            .map_or_else(|| Value::Object(Map::new()), |state| state.state.clone());
        let next_state = remaining
            .iter()
            .fold(base, |accumulated, record| deep_merge(&accumulated, &record.envelope.payload));

        if let Some(hit) = scan_value(&next_state, "state") {
            return Err(AttemptError::Terminal(StateEngineError::rejected(
                ErrorCode::ForbiddenSemanticKeyDetected,
                format!("forbidden semantic key `{}` in derived state", hit.key),
                &hit.path,
            )));
        }
        if !next_state.is_object() {
            return Err(AttemptError::Terminal(StateEngineError::rejected(
                ErrorCode::StatePayloadNotObject,
                "derived state must be a JSON object",
                "state",
            )));
        }

        let next_version = prior_version + 1;
        let state_id = StateId::for_version(org_id, learner_reference, next_version);
        let snapshot = LearnerState {
            org_id: org_id.clone(),
            learner_reference: learner_reference.clone(),
            state_id: state_id.clone(),
            state_version: next_version,
            updated_at: requested_at.to_string(),
            state: next_state.clone(),
            provenance: StateProvenance {
                last_signal_id: last_record.envelope.signal_id.clone(),
                last_signal_timestamp: last_record.envelope.timestamp.clone(),
            },
        };
        let applied: Vec<AppliedSignal> = remaining
            .iter()
            .map(|record| AppliedSignal {
                org_id: org_id.clone(),
                learner_reference: learner_reference.clone(),
                signal_id: record.envelope.signal_id.clone(),
                state_version: next_version,
                applied_at: requested_at.to_string(),
            })
            .collect();

        self.state_store.insert_version(&snapshot, &applied).map_err(AttemptError::from)?;
        Ok(ApplyResult {
            org_id: org_id.clone(),
            learner_reference: learner_reference.clone(),
            state_id,
            state_version: next_version,
            applied_signal_ids: applied.into_iter().map(|row| row.signal_id).collect(),
            state: next_state,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates the apply request fields.
fn validate_request(
    request: &ApplySignalsRequest,
) -> Result<(OrgId, LearnerRef, Vec<SignalId>), StateEngineError> {
    if request.org_id.trim().is_empty() {
        return Err(StateEngineError::rejected(
            ErrorCode::OrgScopeRequired,
            "org_id must not be blank",
            "org_id",
        ));
    }
    if request.learner_reference.trim().is_empty() {
        return Err(StateEngineError::rejected(
            ErrorCode::MissingRequiredField,
            "learner_reference must not be blank",
            "learner_reference",
        ));
    }
    if request.signal_ids.is_empty() {
        return Err(StateEngineError::rejected(
            ErrorCode::MissingRequiredField,
            "signal_ids must not be empty",
            "signal_ids",
        ));
    }
    let mut unique: Vec<SignalId> = Vec::with_capacity(request.signal_ids.len());
    for raw in &request.signal_ids {
        let id = SignalId::new(raw.clone());
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    Ok((
        OrgId::new(request.org_id.clone()),
        LearnerRef::new(request.learner_reference.clone()),
        unique,
    ))
}

/// Sorts records into the canonical `(accepted_at, id)` application order.
fn sort_canonical(records: &mut [SignalRecord]) -> Result<(), StateEngineError> {
    for record in records.iter() {
        rfc3339_to_unix_millis(&record.accepted_at)
            .map_err(|err| StateEngineError::Store(format!("stored accepted_at invalid: {err}")))?;
    }
    records.sort_by_key(|record| {
        let millis = rfc3339_to_unix_millis(&record.accepted_at).unwrap_or(i64::MAX);
        (millis, record.record_id)
    });
    Ok(())
}
