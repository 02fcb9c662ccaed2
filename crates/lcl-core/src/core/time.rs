// crates/lcl-core/src/core/time.rs
// ============================================================================
// Module: Control Layer Time Model
// Description: RFC3339 timestamp parsing and ordering helpers.
// Purpose: Provide deterministic timestamp handling for envelopes and stores.
// Dependencies: thiserror, time
// ============================================================================

//! ## Overview
//! All externally visible timestamps are RFC3339 strings with a mandatory
//! offset. The core never reads wall-clock time; hosts supply `requested_at`
//! and `accepted_at` values explicitly. This module parses and converts those
//! strings; a string without an explicit offset (or with a space separator) is
//! rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Timestamp parsing failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// Value is not a valid RFC3339 timestamp with an explicit offset.
    #[error("invalid RFC3339 timestamp: {0}")]
    InvalidTimestamp(String),
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses an RFC3339 timestamp that carries an explicit offset.
///
/// # Errors
///
/// Returns [`TimeError::InvalidTimestamp`] when the value is malformed, uses a
/// space separator, or omits the offset.
pub fn parse_rfc3339(value: &str) -> Result<OffsetDateTime, TimeError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|_| TimeError::InvalidTimestamp(value.to_string()))
}

/// Converts an RFC3339 timestamp into unix epoch milliseconds.
///
/// # Errors
///
/// Returns [`TimeError::InvalidTimestamp`] when the value cannot be parsed.
pub fn rfc3339_to_unix_millis(value: &str) -> Result<i64, TimeError> {
    let moment = parse_rfc3339(value)?;
    Ok(unix_millis_of(&moment))
}

/// Returns the unix epoch milliseconds for a parsed timestamp.
#[must_use]
pub fn unix_millis_of(moment: &OffsetDateTime) -> i64 {
    let millis = moment.unix_timestamp_nanos() / 1_000_000;
    i64::try_from(millis).unwrap_or(i64::MAX)
}
