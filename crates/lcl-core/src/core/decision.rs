// crates/lcl-core/src/core/decision.rs
// ============================================================================
// Module: Decision Model
// Description: Immutable decisions with full state/policy traces.
// Purpose: Bind every emitted decision to the exact state and rule that produced it.
// Dependencies: crate::core::identifiers, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`Decision`] is an immutable directive emitted for downstream consumers.
//! The control layer never executes decisions. The [`DecisionTrace`] binds a
//! decision to the exact `(state_id, state_version, policy_version,
//! matched_rule_id)` coordinates, which makes replays verifiable: identical
//! coordinates always yield the identical decision type and rule.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

pub(crate) use crate::core::identifiers::DecisionId;
use crate::core::identifiers::LearnerRef;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::StateId;

// ============================================================================
// SECTION: Decision Types
// ============================================================================

/// Closed set of decision types; fixed, not extensible at runtime.
///
/// # Invariants
/// - Wire forms are snake_case and stable for contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    /// Reinforce previously acquired material.
    Reinforce,
    /// Advance to the next unit of work.
    Advance,
    /// Intervene with targeted support.
    Intervene,
    /// Pause the learner's progression.
    Pause,
    /// Escalate to a human reviewer.
    Escalate,
    /// Recommend supplementary material.
    Recommend,
    /// Reroute through an alternative path.
    Reroute,
}

impl DecisionType {
    /// All decision types in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Reinforce,
        Self::Advance,
        Self::Intervene,
        Self::Pause,
        Self::Escalate,
        Self::Recommend,
        Self::Reroute,
    ];

    /// Returns the stable snake_case wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reinforce => "reinforce",
            Self::Advance => "advance",
            Self::Intervene => "intervene",
            Self::Pause => "pause",
            Self::Escalate => "escalate",
            Self::Recommend => "recommend",
            Self::Reroute => "reroute",
        }
    }
}

impl fmt::Display for DecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is outside the closed decision-type set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDecisionType {
    /// The unrecognized value.
    pub value: String,
}

impl fmt::Display for UnknownDecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown decision type `{}`", self.value)
    }
}

impl std::error::Error for UnknownDecisionType {}

impl FromStr for DecisionType {
    type Err = UnknownDecisionType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == value)
            .ok_or_else(|| UnknownDecisionType {
                value: value.to_string(),
            })
    }
}

// ============================================================================
// SECTION: Trace
// ============================================================================

/// Provenance block binding a decision to its inputs.
///
/// # Invariants
/// - `matched_rule_id` is `Some` iff a rule fired; `None` iff the policy's
///   default decision type was used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTrace {
    /// State snapshot the decision was evaluated against.
    pub state_id: StateId,
    /// Version of that snapshot.
    pub state_version: i64,
    /// Version of the policy that was evaluated.
    pub policy_version: String,
    /// Identifier of the first matching rule, or `null` for the default path.
    pub matched_rule_id: Option<String>,
}

// ============================================================================
// SECTION: Decision
// ============================================================================

/// Immutable emitted decision.
///
/// # Invariants
/// - Never updated or deleted after insert.
/// - `decision_context` is a JSON object free of forbidden semantic keys.
/// - `record_id` is store-internal and never leaves the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Tenant scope of the decision.
    pub org_id: OrgId,
    /// Globally unique decision identifier.
    pub decision_id: DecisionId,
    /// Learner the decision concerns.
    pub learner_reference: LearnerRef,
    /// Emitted decision type.
    pub decision_type: DecisionType,
    /// Timestamp when the decision was produced (RFC3339).
    pub decided_at: String,
    /// Opaque decision context (empty object in this version).
    pub decision_context: Value,
    /// Provenance trace for the decision.
    pub trace: DecisionTrace,
    /// Store-internal monotonic insertion id.
    #[serde(skip)]
    pub record_id: i64,
}
