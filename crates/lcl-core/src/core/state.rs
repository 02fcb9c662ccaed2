// crates/lcl-core/src/core/state.rs
// ============================================================================
// Module: Learner State Model
// Description: Versioned learner state snapshots and applied-signal records.
// Purpose: Capture the canonical per-learner state history for replay.
// Dependencies: crate::core::identifiers, serde, serde_json
// ============================================================================

//! ## Overview
//! Learner state is derived exclusively by folding accepted signals through
//! the deterministic reducer. Every version is preserved; rows are never
//! updated or deleted. `state_version` starts at 0 (implicit, no row) and
//! increments by exactly one per successful apply.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::LearnerRef;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::SignalId;
use crate::core::identifiers::StateId;

// ============================================================================
// SECTION: Learner State
// ============================================================================

/// Provenance of the last signal folded into a state version.
///
/// # Invariants
/// - Refers to a `SignalRecord` in the same tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateProvenance {
    /// Identifier of the last applied signal.
    pub last_signal_id: SignalId,
    /// Source-supplied timestamp of the last applied signal.
    pub last_signal_timestamp: String,
}

/// Immutable learner state snapshot.
///
/// # Invariants
/// - `state_id` equals `"{org_id}:{learner_reference}:v{state_version}"`.
/// - `state_version` is strictly monotonic and gap-free per
///   `(org_id, learner_reference)`.
/// - `state` is a JSON object free of forbidden semantic keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerState {
    /// Tenant scope of the snapshot.
    pub org_id: OrgId,
    /// Learner the snapshot belongs to.
    pub learner_reference: LearnerRef,
    /// Canonical snapshot identifier.
    pub state_id: StateId,
    /// Monotonic snapshot version (>= 1 for persisted rows).
    pub state_version: i64,
    /// Timestamp when this version was produced (RFC3339).
    pub updated_at: String,
    /// Derived state document.
    pub state: Value,
    /// Provenance of the last folded signal.
    pub provenance: StateProvenance,
}

// ============================================================================
// SECTION: Applied Signals
// ============================================================================

/// Record marking a signal as applied to a learner state version.
///
/// # Invariants
/// - Primary key is `(org_id, learner_reference, signal_id)`; a signal is
///   applied at most once per learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedSignal {
    /// Tenant scope of the application.
    pub org_id: OrgId,
    /// Learner the signal was applied to.
    pub learner_reference: LearnerRef,
    /// Identifier of the applied signal.
    pub signal_id: SignalId,
    /// State version the application produced.
    pub state_version: i64,
    /// Timestamp when the application was recorded (RFC3339).
    pub applied_at: String,
}
