// crates/lcl-core/src/core/validate.rs
// ============================================================================
// Module: Structural Validator
// Description: Envelope shape validation with stable error codes and paths.
// Purpose: Reject malformed signals before anything is stored.
// Dependencies: crate::core::{envelope, errors, identifiers, time}, serde_json
// ============================================================================

//! ## Overview
//! The validator inspects a raw JSON value against the envelope contract and
//! collects **all** violations in a single pass: required fields, JSON types,
//! length bounds, the `signal_id` charset, RFC3339 timestamps with a mandatory
//! offset, and the `v<digits>` schema version form. Identical invalid input
//! yields identical codes and field paths; messages are advisory only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::core::envelope::SignalEnvelope;
use crate::core::envelope::SignalMetadata;
use crate::core::errors::ErrorCode;
use crate::core::errors::FieldError;
use crate::core::errors::Rejection;
use crate::core::identifiers::LearnerRef;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::SignalId;
use crate::core::time::parse_rfc3339;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum accepted length for `org_id`.
pub const MAX_ORG_ID_LENGTH: usize = 128;
/// Maximum accepted length for `signal_id`.
pub const MAX_SIGNAL_ID_LENGTH: usize = 256;
/// Maximum accepted length for `learner_reference`.
pub const MAX_LEARNER_REFERENCE_LENGTH: usize = 256;
/// Maximum accepted serialized envelope size in bytes.
pub const MAX_ENVELOPE_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Envelope Validation
// ============================================================================

/// Validates a raw JSON value against the signal envelope contract.
///
/// All violations found in one pass are reported together, in field order.
///
/// # Errors
///
/// Returns a [`Rejection`] whose entries carry stable codes and field paths.
pub fn validate_envelope(raw: &Value) -> Result<SignalEnvelope, Rejection> {
    let Value::Object(entries) = raw else {
        return Err(Rejection::single(FieldError::new(
            ErrorCode::InvalidType,
            "signal envelope must be a JSON object",
        )));
    };
    if serialized_size(raw) > MAX_ENVELOPE_BYTES {
        return Err(Rejection::single(FieldError::new(
            ErrorCode::RequestTooLarge,
            format!("signal envelope exceeds {MAX_ENVELOPE_BYTES} bytes"),
        )));
    }

    let mut errors: Vec<FieldError> = Vec::new();

    let org_id = validate_org_id(entries.get("org_id"), &mut errors);
    let signal_id = validate_signal_id(entries.get("signal_id"), &mut errors);
    let source_system = validate_source_system(entries.get("source_system"), &mut errors);
    let learner_reference =
        validate_learner_reference(entries.get("learner_reference"), &mut errors);
    let timestamp = validate_timestamp(entries.get("timestamp"), "timestamp", &mut errors);
    let schema_version = validate_schema_version(entries.get("schema_version"), &mut errors);
    let payload = validate_payload(entries.get("payload"), &mut errors);
    let metadata = validate_metadata(entries.get("metadata"), &mut errors);

    if !errors.is_empty() {
        return Err(Rejection::new(errors));
    }
    match (org_id, signal_id, source_system, learner_reference, timestamp, schema_version, payload)
    {
        (
            Some(org_id),
            Some(signal_id),
            Some(source_system),
            Some(learner_reference),
            Some(timestamp),
            Some(schema_version),
            Some(payload),
        ) => Ok(SignalEnvelope {
            org_id: OrgId::new(org_id),
            signal_id: SignalId::new(signal_id),
            source_system,
            learner_reference: LearnerRef::new(learner_reference),
            timestamp,
            schema_version,
            payload,
            metadata,
        }),
        _ => Err(Rejection::single(FieldError::new(
            ErrorCode::InvalidType,
            "signal envelope could not be assembled",
        ))),
    }
}

// ============================================================================
// SECTION: Field Checks
// ============================================================================

/// Validates `org_id`: required, non-blank, bounded length.
fn validate_org_id(value: Option<&Value>, errors: &mut Vec<FieldError>) -> Option<String> {
    let raw = match require_string(value, "org_id", errors) {
        Some(raw) => raw,
        None => return None,
    };
    if raw.trim().is_empty() {
        errors.push(FieldError::at(
            ErrorCode::OrgScopeRequired,
            "org_id must not be blank",
            "org_id",
        ));
        return None;
    }
    if raw.len() > MAX_ORG_ID_LENGTH {
        errors.push(FieldError::at(
            ErrorCode::InvalidLength,
            format!("org_id must be at most {MAX_ORG_ID_LENGTH} characters"),
            "org_id",
        ));
        return None;
    }
    Some(raw)
}

/// Validates `signal_id`: required, bounded length, restricted charset.
fn validate_signal_id(value: Option<&Value>, errors: &mut Vec<FieldError>) -> Option<String> {
    let raw = match require_string(value, "signal_id", errors) {
        Some(raw) => raw,
        None => return None,
    };
    if raw.is_empty() || raw.len() > MAX_SIGNAL_ID_LENGTH {
        errors.push(FieldError::at(
            ErrorCode::InvalidLength,
            format!("signal_id must be 1 to {MAX_SIGNAL_ID_LENGTH} characters"),
            "signal_id",
        ));
        return None;
    }
    if !raw.chars().all(is_signal_id_char) {
        errors.push(FieldError::at(
            ErrorCode::InvalidCharset,
            "signal_id may only contain letters, digits, '.', '_', ':', and '-'",
            "signal_id",
        ));
        return None;
    }
    Some(raw)
}

/// Returns whether a character is allowed in a `signal_id`.
const fn is_signal_id_char(character: char) -> bool {
    character.is_ascii_alphanumeric()
        || matches!(character, '.' | '_' | ':' | '-')
}

/// Validates `source_system`: required, non-blank.
fn validate_source_system(value: Option<&Value>, errors: &mut Vec<FieldError>) -> Option<String> {
    let raw = match require_string(value, "source_system", errors) {
        Some(raw) => raw,
        None => return None,
    };
    if raw.trim().is_empty() {
        errors.push(FieldError::at(
            ErrorCode::MissingRequiredField,
            "source_system must not be blank",
            "source_system",
        ));
        return None;
    }
    Some(raw)
}

/// Validates `learner_reference`: required, bounded length.
fn validate_learner_reference(
    value: Option<&Value>,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let raw = match require_string(value, "learner_reference", errors) {
        Some(raw) => raw,
        None => return None,
    };
    if raw.is_empty() || raw.len() > MAX_LEARNER_REFERENCE_LENGTH {
        errors.push(FieldError::at(
            ErrorCode::InvalidLength,
            format!("learner_reference must be 1 to {MAX_LEARNER_REFERENCE_LENGTH} characters"),
            "learner_reference",
        ));
        return None;
    }
    Some(raw)
}

/// Validates an RFC3339 timestamp field with a mandatory offset.
fn validate_timestamp(
    value: Option<&Value>,
    field_path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let raw = match require_string(value, field_path, errors) {
        Some(raw) => raw,
        None => return None,
    };
    if parse_rfc3339(&raw).is_err() {
        errors.push(FieldError::at(
            ErrorCode::InvalidTimestamp,
            format!("{field_path} must be RFC3339 with an explicit timezone offset"),
            field_path,
        ));
        return None;
    }
    Some(raw)
}

/// Validates `schema_version` against `^v[0-9]+$`.
fn validate_schema_version(value: Option<&Value>, errors: &mut Vec<FieldError>) -> Option<String> {
    let raw = match require_string(value, "schema_version", errors) {
        Some(raw) => raw,
        None => return None,
    };
    if !is_schema_version(&raw) {
        errors.push(FieldError::at(
            ErrorCode::InvalidSchemaVersion,
            "schema_version must match v<digits> (for example v2)",
            "schema_version",
        ));
        return None;
    }
    Some(raw)
}

/// Returns whether a value matches the `v<digits>` schema version form.
fn is_schema_version(raw: &str) -> bool {
    let Some(digits) = raw.strip_prefix('v') else {
        return false;
    };
    !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit())
}

/// Validates `payload`: required, non-null JSON object (not an array).
fn validate_payload(value: Option<&Value>, errors: &mut Vec<FieldError>) -> Option<Value> {
    let Some(raw) = value else {
        errors.push(FieldError::at(
            ErrorCode::MissingRequiredField,
            "payload is required",
            "payload",
        ));
        return None;
    };
    if !raw.is_object() {
        errors.push(FieldError::at(
            ErrorCode::PayloadNotObject,
            "payload must be a JSON object",
            "payload",
        ));
        return None;
    }
    Some(raw.clone())
}

/// Validates optional `metadata.{correlation_id, trace_id}`.
fn validate_metadata(
    value: Option<&Value>,
    errors: &mut Vec<FieldError>,
) -> Option<SignalMetadata> {
    let raw = match value {
        None | Some(Value::Null) => return None,
        Some(raw) => raw,
    };
    let Value::Object(entries) = raw else {
        errors.push(FieldError::at(
            ErrorCode::InvalidType,
            "metadata must be a JSON object",
            "metadata",
        ));
        return None;
    };
    let correlation_id =
        optional_string(entries.get("correlation_id"), "metadata.correlation_id", errors);
    let trace_id = optional_string(entries.get("trace_id"), "metadata.trace_id", errors);
    Some(SignalMetadata {
        correlation_id,
        trace_id,
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts a required string field, reporting missing/type violations.
fn require_string(
    value: Option<&Value>,
    field_path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match value {
        None | Some(Value::Null) => {
            errors.push(FieldError::at(
                ErrorCode::MissingRequiredField,
                format!("{field_path} is required"),
                field_path,
            ));
            None
        }
        Some(Value::String(raw)) => Some(raw.clone()),
        Some(_) => {
            errors.push(FieldError::at(
                ErrorCode::InvalidType,
                format!("{field_path} must be a string"),
                field_path,
            ));
            None
        }
    }
}

/// Extracts an optional string field, reporting type violations.
fn optional_string(
    value: Option<&Value>,
    field_path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => Some(raw.clone()),
        Some(_) => {
            errors.push(FieldError::at(
                ErrorCode::InvalidType,
                format!("{field_path} must be a string"),
                field_path,
            ));
            None
        }
    }
}

/// Returns the serialized byte length of a JSON value.
fn serialized_size(raw: &Value) -> usize {
    serde_json::to_string(raw).map_or(usize::MAX, |rendered| rendered.len())
}
