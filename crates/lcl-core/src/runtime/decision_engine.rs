// crates/lcl-core/src/runtime/decision_engine.rs
// ============================================================================
// Module: Decision Engine
// Description: Policy evaluation over a pinned state version with tracing.
// Purpose: Emit immutable decisions bound to exact state/policy coordinates.
// Dependencies: crate::core, crate::interfaces, crate::policy
// ============================================================================

//! ## Overview
//! The decision engine evaluates the cached policy against a specific
//! `(state_id, state_version)` pair. Stale coordinates are rejected rather
//! than silently re-resolved, so every persisted decision's trace provably
//! refers to the state that produced it. Persistence happens only on success;
//! rejection paths never write.
//!
//! `evaluation_context` on the request is accepted, never consumed, and never
//! persisted anywhere visible.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::decision::Decision;
use crate::core::decision::DecisionTrace;
use crate::core::errors::ErrorCode;
use crate::core::errors::FieldError;
use crate::core::errors::Rejection;
use crate::core::identifiers::DecisionId;
use crate::core::identifiers::LearnerRef;
use crate::core::identifiers::OrgId;
use crate::core::scan::scan_value;
use crate::interfaces::DecisionStore;
use crate::interfaces::StateStore;
use crate::policy::definition::PolicyDefinition;
use crate::policy::evaluate::evaluate_policy;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Request to evaluate policy against a pinned state version.
///
/// # Invariants
/// - `requested_at` is supplied by the caller; the engine never reads
///   wall-clock time.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateStateRequest {
    /// Tenant scope of the evaluation.
    pub org_id: String,
    /// Learner the evaluation concerns.
    pub learner_reference: String,
    /// Expected canonical state identifier.
    pub state_id: String,
    /// Expected state version.
    pub state_version: i64,
    /// Caller-supplied request timestamp (RFC3339); becomes `decided_at`.
    pub requested_at: String,
    /// Opaque caller context; accepted but never consumed or persisted.
    pub evaluation_context: Option<Value>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Decision engine failures.
///
/// # Invariants
/// - `Rejected` carries the full coded rejection; `Store` is reserved for
///   backend faults outside the rejection taxonomy.
#[derive(Debug, Error)]
pub enum DecisionEngineError {
    /// The request was rejected with stable error codes.
    #[error("evaluation rejected: {0}")]
    Rejected(Rejection),
    /// A storage backend failed.
    #[error("decision engine store failure: {0}")]
    Store(String),
}

impl DecisionEngineError {
    /// Builds a single-entry rejection.
    fn rejected(code: ErrorCode, message: impl Into<String>, field_path: &str) -> Self {
        Self::Rejected(Rejection::single(FieldError::at(code, message, field_path)))
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Policy evaluator emitting immutable, fully traced decisions.
///
/// # Invariants
/// - Identical `(state_id, state_version, policy_version)` coordinates yield
///   identical `decision_type` and `matched_rule_id`.
/// - Persistence happens only on success.
pub struct DecisionEngine<S, D> {
    /// Learner state reads.
    state_store: Arc<S>,
    /// Decision persistence.
    decision_store: Arc<D>,
    /// Process-wide policy cache, loaded once at startup.
    policy: Option<Arc<PolicyDefinition>>,
}

impl<S, D> Clone for DecisionEngine<S, D> {
    fn clone(&self) -> Self {
        Self {
            state_store: Arc::clone(&self.state_store),
            decision_store: Arc::clone(&self.decision_store),
            policy: self.policy.clone(),
        }
    }
}

impl<S, D> DecisionEngine<S, D>
where
    S: StateStore,
    D: DecisionStore,
{
    /// Creates a decision engine over the stores and an optional policy.
    #[must_use]
    pub const fn new(
        state_store: Arc<S>,
        decision_store: Arc<D>,
        policy: Option<Arc<PolicyDefinition>>,
    ) -> Self {
        Self {
            state_store,
            decision_store,
            policy,
        }
    }

    /// Evaluates the cached policy against the requested state coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionEngineError::Rejected`] with stable codes
    /// (`org_scope_required`, `missing_required_field`, `state_not_found`,
    /// `trace_state_mismatch`, `policy_not_found`,
    /// `decision_context_not_object`, `forbidden_semantic_key_detected`), or
    /// [`DecisionEngineError::Store`] for backend faults.
    pub fn evaluate_state(
        &self,
        request: &EvaluateStateRequest,
    ) -> Result<Decision, DecisionEngineError> {
        let (org_id, learner_reference) = validate_request(request)?;

        let current = self
            .state_store
            .latest(&org_id, &learner_reference)
            .map_err(|err| DecisionEngineError::Store(err.to_string()))?;
        let Some(current) = current else {
            return Err(DecisionEngineError::rejected(
                ErrorCode::StateNotFound,
                format!("no state exists for learner {learner_reference}"),
                "state_id",
            ));
        };
        if current.state_id.as_str() != request.state_id
            || current.state_version != request.state_version
        {
            return Err(DecisionEngineError::rejected(
                ErrorCode::TraceStateMismatch,
                format!(
                    "requested {} v{} but current state is {} v{}",
                    request.state_id,
                    request.state_version,
                    current.state_id.as_str(),
                    current.state_version
                ),
                "state_version",
            ));
        }

        let Some(policy) = self.policy.as_ref() else {
            return Err(DecisionEngineError::rejected(
                ErrorCode::PolicyNotFound,
                "no policy definition is loaded",
                "policy_version",
            ));
        };
        let outcome = evaluate_policy(&current.state, policy);

        let decision_context = build_decision_context();
        if let Some(hit) = scan_value(&decision_context, "decision_context") {
            return Err(DecisionEngineError::rejected(
                ErrorCode::ForbiddenSemanticKeyDetected,
                format!("forbidden semantic key `{}` in decision context", hit.key),
                &hit.path,
            ));
        }
        if !decision_context.is_object() {
            return Err(DecisionEngineError::rejected(
                ErrorCode::DecisionContextNotObject,
                "decision context must be a JSON object",
                "decision_context",
            ));
        }

        let decision = Decision {
            org_id,
            decision_id: DecisionId::random(),
            learner_reference,
            decision_type: outcome.decision_type,
            decided_at: request.requested_at.clone(),
            decision_context,
            trace: DecisionTrace {
                state_id: current.state_id,
                state_version: current.state_version,
                policy_version: policy.policy_version.clone(),
                matched_rule_id: outcome.matched_rule_id,
            },
            record_id: 0,
        };
        self.decision_store
            .save(&decision)
            .map_err(|err| DecisionEngineError::Store(err.to_string()))?;
        Ok(decision)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates the evaluation request fields.
fn validate_request(
    request: &EvaluateStateRequest,
) -> Result<(OrgId, LearnerRef), DecisionEngineError> {
    if request.org_id.trim().is_empty() {
        return Err(DecisionEngineError::rejected(
            ErrorCode::OrgScopeRequired,
            "org_id must not be blank",
            "org_id",
        ));
    }
    if request.learner_reference.trim().is_empty() {
        return Err(DecisionEngineError::rejected(
            ErrorCode::MissingRequiredField,
            "learner_reference must not be blank",
            "learner_reference",
        ));
    }
    if request.state_id.trim().is_empty() {
        return Err(DecisionEngineError::rejected(
            ErrorCode::MissingRequiredField,
            "state_id must not be blank",
            "state_id",
        ));
    }
    Ok((OrgId::new(request.org_id.clone()), LearnerRef::new(request.learner_reference.clone())))
}

/// Builds the decision context document (empty object in this version).
fn build_decision_context() -> Value {
    Value::Object(Map::new())
}
