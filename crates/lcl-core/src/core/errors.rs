// crates/lcl-core/src/core/errors.rs
// ============================================================================
// Module: Control Layer Error Model
// Description: Stable error codes, field errors, and rejection values.
// Purpose: Give every rejection a stable machine-readable code and path.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Rejections are values, not panics. Every rejection carries one or more
//! [`FieldError`] entries with a stable [`ErrorCode`] and an optional
//! dot-notation field path. Consumers branch on `code`; `message` is
//! human-facing and free to vary between releases.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Closed set of stable rejection codes.
///
/// # Invariants
/// - Wire forms are snake_case and never change once released.
/// - Identical invalid input yields the identical code and field path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A required envelope or request field is absent or blank.
    MissingRequiredField,
    /// A field is present with the wrong JSON type.
    InvalidType,
    /// A field value does not match its expected format.
    InvalidFormat,
    /// A timestamp is not RFC3339 with an explicit offset.
    InvalidTimestamp,
    /// A field value violates its length bounds.
    InvalidLength,
    /// A field value contains characters outside its allowed charset.
    InvalidCharset,
    /// `schema_version` does not match `^v[0-9]+$`.
    InvalidSchemaVersion,
    /// The envelope payload is not a JSON object.
    PayloadNotObject,
    /// The serialized request exceeds the accepted size limit.
    RequestTooLarge,
    /// The tenant scope (`org_id`) is absent or blank.
    OrgScopeRequired,
    /// A forbidden semantic key was found in a nested payload.
    ForbiddenSemanticKeyDetected,
    /// The `(org_id, signal_id)` pair was already accepted.
    DuplicateSignalId,
    /// `from_time` is later than `to_time`.
    InvalidTimeRange,
    /// The page token is malformed or does not resolve to a stored row.
    InvalidPageToken,
    /// The page size is outside the accepted bounds.
    PageSizeOutOfRange,
    /// A referenced signal identifier does not exist.
    UnknownSignalId,
    /// A referenced signal exists in a different tenant.
    SignalsNotInOrgScope,
    /// A computed learner state is not a JSON object.
    StatePayloadNotObject,
    /// Optimistic concurrency lost twice in a row.
    StateVersionConflict,
    /// No learner state exists for the requested coordinates.
    StateNotFound,
    /// The persisted state does not match the requested coordinates.
    TraceStateMismatch,
    /// No policy definition is available.
    PolicyNotFound,
    /// The policy version is not valid semver.
    InvalidPolicyVersion,
    /// A decision type is outside the closed set.
    InvalidDecisionType,
    /// The decision context is not a JSON object.
    DecisionContextNotObject,
    /// A decision is missing its state/policy trace.
    MissingTrace,
}

impl ErrorCode {
    /// Returns the stable snake_case wire form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingRequiredField => "missing_required_field",
            Self::InvalidType => "invalid_type",
            Self::InvalidFormat => "invalid_format",
            Self::InvalidTimestamp => "invalid_timestamp",
            Self::InvalidLength => "invalid_length",
            Self::InvalidCharset => "invalid_charset",
            Self::InvalidSchemaVersion => "invalid_schema_version",
            Self::PayloadNotObject => "payload_not_object",
            Self::RequestTooLarge => "request_too_large",
            Self::OrgScopeRequired => "org_scope_required",
            Self::ForbiddenSemanticKeyDetected => "forbidden_semantic_key_detected",
            Self::DuplicateSignalId => "duplicate_signal_id",
            Self::InvalidTimeRange => "invalid_time_range",
            Self::InvalidPageToken => "invalid_page_token",
            Self::PageSizeOutOfRange => "page_size_out_of_range",
            Self::UnknownSignalId => "unknown_signal_id",
            Self::SignalsNotInOrgScope => "signals_not_in_org_scope",
            Self::StatePayloadNotObject => "state_payload_not_object",
            Self::StateVersionConflict => "state_version_conflict",
            Self::StateNotFound => "state_not_found",
            Self::TraceStateMismatch => "trace_state_mismatch",
            Self::PolicyNotFound => "policy_not_found",
            Self::InvalidPolicyVersion => "invalid_policy_version",
            Self::InvalidDecisionType => "invalid_decision_type",
            Self::DecisionContextNotObject => "decision_context_not_object",
            Self::MissingTrace => "missing_trace",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Field Errors
// ============================================================================

/// Single rejection entry with a stable code and optional field path.
///
/// # Invariants
/// - `code` and `field_path` are deterministic for identical invalid input.
/// - `message` is advisory and must not be used for control flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Stable rejection code.
    pub code: ErrorCode,
    /// Human-readable description of the rejection.
    pub message: String,
    /// Dot-notation path of the offending field, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
}

impl FieldError {
    /// Creates a field error without a path.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field_path: None,
        }
    }

    /// Creates a field error anchored to a field path.
    #[must_use]
    pub fn at(code: ErrorCode, message: impl Into<String>, field_path: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field_path: Some(field_path.into()),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field_path {
            Some(path) => write!(f, "{}: {} ({path})", self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

// ============================================================================
// SECTION: Rejections
// ============================================================================

/// Rejection value carrying one or more field errors.
///
/// # Invariants
/// - Always contains at least one entry.
/// - Entry order is deterministic for identical invalid input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Rejection entries in detection order.
    pub errors: Vec<FieldError>,
}

impl Rejection {
    /// Creates a rejection from a single field error.
    #[must_use]
    pub fn single(error: FieldError) -> Self {
        Self {
            errors: vec![error],
        }
    }

    /// Creates a rejection from a list of field errors.
    #[must_use]
    pub const fn new(errors: Vec<FieldError>) -> Self {
        Self {
            errors,
        }
    }

    /// Returns the first rejection entry.
    #[must_use]
    pub fn first(&self) -> Option<&FieldError> {
        self.errors.first()
    }

    /// Returns the first rejection code, if any.
    #[must_use]
    pub fn first_code(&self) -> Option<ErrorCode> {
        self.errors.first().map(|error| error.code)
    }
}

impl From<FieldError> for Rejection {
    fn from(error: FieldError) -> Self {
        Self::single(error)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.errors {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
            first = false;
        }
        Ok(())
    }
}
