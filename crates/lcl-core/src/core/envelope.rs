// crates/lcl-core/src/core/envelope.rs
// ============================================================================
// Module: Signal Envelope
// Description: Inbound signal envelope and its stored record form.
// Purpose: Capture opaque learner signals with tenant scope and provenance.
// Dependencies: crate::core::identifiers, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`SignalEnvelope`] is the inbound wire form of a learner signal. The
//! payload is opaque JSON subject only to structural checks and the
//! forbidden-key scan; the control layer never interprets it. A
//! [`SignalRecord`] is the immutable stored form: the envelope plus the
//! `accepted_at` timestamp assigned at append time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::LearnerRef;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::SignalId;

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// Optional transport metadata carried alongside a signal.
///
/// # Invariants
/// - Fields are opaque correlation strings; the core never interprets them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMetadata {
    /// Optional caller-assigned correlation identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Optional distributed trace identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// Inbound signal envelope.
///
/// # Invariants
/// - `payload` is a JSON object (never null, never an array).
/// - `timestamp` is RFC3339 with an explicit offset.
/// - Structural constraints are enforced by the validator before construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    /// Tenant scope of the signal.
    pub org_id: OrgId,
    /// Tenant-unique signal identifier.
    pub signal_id: SignalId,
    /// Name of the emitting system.
    pub source_system: String,
    /// Learner the signal refers to.
    pub learner_reference: LearnerRef,
    /// Event timestamp supplied by the source (RFC3339 with offset).
    pub timestamp: String,
    /// Payload schema version (`v<digits>`).
    pub schema_version: String,
    /// Opaque JSON payload.
    pub payload: Value,
    /// Optional transport metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SignalMetadata>,
}

// ============================================================================
// SECTION: Stored Record
// ============================================================================

/// Immutable stored form of an accepted signal.
///
/// # Invariants
/// - Never updated or deleted after insert.
/// - `record_id` is the log-internal monotonic insertion id; it never leaves
///   the process and breaks ordering ties deterministically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    /// The accepted envelope, exactly as validated.
    #[serde(flatten)]
    pub envelope: SignalEnvelope,
    /// Timestamp assigned when the log accepted the signal (RFC3339).
    pub accepted_at: String,
    /// Log-internal monotonic insertion id.
    #[serde(skip)]
    pub record_id: i64,
}
