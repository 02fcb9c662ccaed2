// crates/lcl-core/src/runtime/ingest.rs
// ============================================================================
// Module: Ingestion Pipeline
// Description: Synchronous per-signal orchestration across pipeline stages.
// Purpose: Validate, dedupe, append, then trigger state and decision stages.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! One inbound signal traverses the stages in a fixed order: structural
//! validation, forbidden-key scan of the payload, idempotency check,
//! append to the signal log, STATE apply, decision evaluation. Failure
//! isolation is a first-class invariant: once the append succeeds the signal
//! is `accepted` regardless of downstream outcomes; STATE and decision
//! failures are reported back for logging, never propagated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::errors::ErrorCode;
use crate::core::errors::FieldError;
use crate::core::scan::scan_value;
use crate::core::validate::validate_envelope;
use crate::interfaces::DecisionStore;
use crate::interfaces::IdempotencyIndex;
use crate::interfaces::SignalLog;
use crate::interfaces::StateStore;
use crate::runtime::decision_engine::DecisionEngine;
use crate::runtime::decision_engine::EvaluateStateRequest;
use crate::runtime::state_engine::ApplySignalsRequest;
use crate::runtime::state_engine::StateEngine;

// ============================================================================
// SECTION: Ingest Results
// ============================================================================

/// Terminal status of one ingestion attempt.
///
/// # Invariants
/// - Wire forms are snake_case and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// The signal was validated and appended.
    Accepted,
    /// The `(org_id, signal_id)` pair was accepted earlier.
    Duplicate,
    /// The signal failed validation and nothing was stored.
    Rejected,
}

/// Result returned to the ingestion caller.
///
/// # Invariants
/// - `received_at` is present for `accepted` (now) and `duplicate` (the
///   original acceptance time).
/// - `rejection_reason` is present iff `status` is `rejected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalIngestResult {
    /// Terminal ingestion status.
    pub status: IngestStatus,
    /// Acceptance timestamp, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<String>,
    /// First rejection entry, when rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<FieldError>,
}

impl SignalIngestResult {
    /// Builds an `accepted` result.
    #[must_use]
    pub fn accepted(received_at: impl Into<String>) -> Self {
        Self {
            status: IngestStatus::Accepted,
            received_at: Some(received_at.into()),
            rejection_reason: None,
        }
    }

    /// Builds a `duplicate` result carrying the original acceptance time.
    #[must_use]
    pub fn duplicate(received_at: impl Into<String>) -> Self {
        Self {
            status: IngestStatus::Duplicate,
            received_at: Some(received_at.into()),
            rejection_reason: None,
        }
    }

    /// Builds a `rejected` result from the first rejection entry.
    #[must_use]
    pub const fn rejected(reason: FieldError) -> Self {
        Self {
            status: IngestStatus::Rejected,
            received_at: None,
            rejection_reason: Some(reason),
        }
    }
}

/// Full per-signal ingestion report, including isolated stage failures.
///
/// # Invariants
/// - `state_error` and `decision_error` never affect `result`.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    /// Result returned to the caller.
    pub result: SignalIngestResult,
    /// Isolated STATE stage failure, for logging.
    pub state_error: Option<String>,
    /// Isolated decision stage failure, for logging.
    pub decision_error: Option<String>,
}

impl IngestReport {
    /// Wraps a result with no isolated failures.
    const fn clean(result: SignalIngestResult) -> Self {
        Self {
            result,
            state_error: None,
            decision_error: None,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Ingestion infrastructure failures (stages C and D).
///
/// # Invariants
/// - Raised only before or during the append; later stages are isolated.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The idempotency index or signal log backend failed.
    #[error("ingest infrastructure failure: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Synchronous per-signal ingestion orchestrator.
///
/// # Invariants
/// - Stage order is fixed: validate, scan, idempotency, append, STATE,
///   decision.
/// - A successful append makes the request `accepted` regardless of
///   downstream outcomes.
pub struct IngestPipeline<L, I, S, D> {
    /// Append-only signal log (stage D).
    signal_log: Arc<L>,
    /// Idempotency index (stage C).
    idempotency: Arc<I>,
    /// STATE engine (stage E).
    state_engine: StateEngine<L, S>,
    /// Decision engine (stage G).
    decision_engine: DecisionEngine<S, D>,
}

impl<L, I, S, D> IngestPipeline<L, I, S, D>
where
    L: SignalLog,
    I: IdempotencyIndex,
    S: StateStore,
    D: DecisionStore,
{
    /// Wires the pipeline stages together.
    #[must_use]
    pub const fn new(
        signal_log: Arc<L>,
        idempotency: Arc<I>,
        state_engine: StateEngine<L, S>,
        decision_engine: DecisionEngine<S, D>,
    ) -> Self {
        Self {
            signal_log,
            idempotency,
            state_engine,
            decision_engine,
        }
    }

    /// Ingests one raw signal envelope.
    ///
    /// `received_at` is the host-supplied wall-clock timestamp for this
    /// request; it becomes `accepted_at`, `requested_at`, and `decided_at`
    /// downstream.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] only for idempotency/append backend faults;
    /// validation failures are reported inside the result, and STATE or
    /// decision failures are isolated into the report.
    pub fn ingest(&self, raw: &Value, received_at: &str) -> Result<IngestReport, IngestError> {
        // Stage B: structural validation; first entry becomes the reason.
        let envelope = match validate_envelope(raw) {
            Ok(envelope) => envelope,
            Err(rejection) => {
                let reason = rejection
                    .errors
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| {
                        FieldError::new(ErrorCode::InvalidType, "signal envelope is invalid")
                    });
                return Ok(IngestReport::clean(SignalIngestResult::rejected(reason)));
            }
        };

        // Stage A: forbidden-key scan over the opaque payload.
        if let Some(hit) = scan_value(&envelope.payload, "payload") {
            let reason = FieldError::at(
                ErrorCode::ForbiddenSemanticKeyDetected,
                format!("forbidden semantic key `{}`", hit.key),
                hit.path,
            );
            return Ok(IngestReport::clean(SignalIngestResult::rejected(reason)));
        }

        // Stage C: first-wins idempotency.
        let idempotency = self
            .idempotency
            .check_and_store(&envelope.org_id, &envelope.signal_id, received_at)
            .map_err(|err| IngestError::Store(err.to_string()))?;
        if idempotency.is_duplicate {
            return Ok(IngestReport::clean(SignalIngestResult::duplicate(idempotency.received_at)));
        }

        // Stage D: append-only log insert.
        self.signal_log
            .append(&envelope, received_at)
            .map_err(|err| IngestError::Store(err.to_string()))?;

        // Stage E: STATE apply; failures are isolated.
        let mut report = IngestReport::clean(SignalIngestResult::accepted(received_at));
        let apply_request = ApplySignalsRequest {
            org_id: envelope.org_id.as_str().to_string(),
            learner_reference: envelope.learner_reference.as_str().to_string(),
            signal_ids: vec![envelope.signal_id.as_str().to_string()],
            requested_at: received_at.to_string(),
        };
        let apply_result = match self.state_engine.apply_signals(&apply_request) {
            Ok(result) => Some(result),
            Err(err) => {
                report.state_error = Some(err.to_string());
                None
            }
        };

        // Stage G: decision evaluation; failures are isolated.
        if let Some(apply_result) = apply_result {
            let evaluate_request = EvaluateStateRequest {
                org_id: envelope.org_id.as_str().to_string(),
                learner_reference: envelope.learner_reference.as_str().to_string(),
                state_id: apply_result.state_id.as_str().to_string(),
                state_version: apply_result.state_version,
                requested_at: received_at.to_string(),
                evaluation_context: None,
            };
            if let Err(err) = self.decision_engine.evaluate_state(&evaluate_request) {
                report.decision_error = Some(err.to_string());
            }
        }

        Ok(report)
    }
}
