// crates/lcl-core/src/interfaces/mod.rs
// ============================================================================
// Module: Control Layer Interfaces
// Description: Backend-agnostic storage interfaces for the pipeline stages.
// Purpose: Define the contract surfaces the engines depend on.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the engines reach storage without embedding a
//! backend. Implementations must be deterministic: identical queries return
//! byte-identical orderings and identical page tokens, and `org_id` filtering
//! happens inside the store query, never after it.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cursor;

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::decision::Decision;
use crate::core::decision::DecisionId;
use crate::core::envelope::SignalEnvelope;
use crate::core::envelope::SignalRecord;
use crate::core::errors::ErrorCode;
use crate::core::errors::FieldError;
use crate::core::errors::Rejection;
use crate::core::identifiers::LearnerRef;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::SignalId;
use crate::core::state::AppliedSignal;
use crate::core::state::LearnerState;
use crate::core::time::rfc3339_to_unix_millis;
use crate::interfaces::cursor::PageCursor;

// ============================================================================
// SECTION: Pagination
// ============================================================================

/// Minimum accepted page size.
pub const MIN_PAGE_SIZE: usize = 1;
/// Maximum accepted page size.
pub const MAX_PAGE_SIZE: usize = 1000;
/// Default page size when none is requested.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Validated, tenant-scoped range query.
///
/// # Invariants
/// - `from_ms <= to_ms`.
/// - `page_size` is within `[MIN_PAGE_SIZE, MAX_PAGE_SIZE]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
    /// Tenant scope of the query.
    pub org_id: OrgId,
    /// Learner the query is scoped to.
    pub learner_reference: LearnerRef,
    /// Inclusive range start in unix milliseconds.
    pub from_ms: i64,
    /// Inclusive range end in unix milliseconds.
    pub to_ms: i64,
    /// Optional keyset cursor from a previous page.
    pub cursor: Option<PageCursor>,
    /// Page size within the accepted bounds.
    pub page_size: usize,
}

impl RangeQuery {
    /// Validates raw query parameters into a range query.
    ///
    /// All violations found in one pass are reported together.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] with stable codes: `org_scope_required`,
    /// `missing_required_field`, `invalid_timestamp`, `invalid_time_range`,
    /// `invalid_page_token`, and `page_size_out_of_range`.
    pub fn from_params(
        org_id: Option<&str>,
        learner_reference: Option<&str>,
        from_time: Option<&str>,
        to_time: Option<&str>,
        page_token: Option<&str>,
        page_size: Option<i64>,
    ) -> Result<Self, Rejection> {
        let mut errors: Vec<FieldError> = Vec::new();

        let org_id = match org_id {
            Some(raw) if !raw.trim().is_empty() => Some(OrgId::new(raw)),
            _ => {
                errors.push(FieldError::at(
                    ErrorCode::OrgScopeRequired,
                    "org_id is required",
                    "org_id",
                ));
                None
            }
        };
        let learner_reference = match learner_reference {
            Some(raw) if !raw.trim().is_empty() => Some(LearnerRef::new(raw)),
            _ => {
                errors.push(FieldError::at(
                    ErrorCode::MissingRequiredField,
                    "learner_reference is required",
                    "learner_reference",
                ));
                None
            }
        };
        let from_ms = parse_bound(from_time, "from_time", &mut errors);
        let to_ms = parse_bound(to_time, "to_time", &mut errors);
        if let (Some(from_ms), Some(to_ms)) = (from_ms, to_ms)
            && from_ms > to_ms
        {
            errors.push(FieldError::at(
                ErrorCode::InvalidTimeRange,
                "from_time must not be later than to_time",
                "from_time",
            ));
        }
        let cursor = match page_token {
            None => None,
            Some(token) => match PageCursor::decode(token) {
                Ok(cursor) => Some(cursor),
                Err(_) => {
                    errors.push(FieldError::at(
                        ErrorCode::InvalidPageToken,
                        "page_token is malformed",
                        "page_token",
                    ));
                    None
                }
            },
        };
        let page_size = match page_size {
            None => DEFAULT_PAGE_SIZE,
            Some(requested) => match usize::try_from(requested) {
                Ok(size) if (MIN_PAGE_SIZE ..= MAX_PAGE_SIZE).contains(&size) => size,
                _ => {
                    errors.push(FieldError::at(
                        ErrorCode::PageSizeOutOfRange,
                        format!("page_size must be between {MIN_PAGE_SIZE} and {MAX_PAGE_SIZE}"),
                        "page_size",
                    ));
                    DEFAULT_PAGE_SIZE
                }
            },
        };

        if !errors.is_empty() {
            return Err(Rejection::new(errors));
        }
        match (org_id, learner_reference, from_ms, to_ms) {
            (Some(org_id), Some(learner_reference), Some(from_ms), Some(to_ms)) => Ok(Self {
                org_id,
                learner_reference,
                from_ms,
                to_ms,
                cursor,
                page_size,
            }),
            _ => Err(Rejection::single(FieldError::new(
                ErrorCode::InvalidType,
                "range query could not be assembled",
            ))),
        }
    }
}

/// Parses a required RFC3339 range bound into unix milliseconds.
fn parse_bound(
    value: Option<&str>,
    field_path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<i64> {
    let Some(raw) = value else {
        errors.push(FieldError::at(
            ErrorCode::MissingRequiredField,
            format!("{field_path} is required"),
            field_path,
        ));
        return None;
    };
    match rfc3339_to_unix_millis(raw) {
        Ok(millis) => Some(millis),
        Err(_) => {
            errors.push(FieldError::at(
                ErrorCode::InvalidTimestamp,
                format!("{field_path} must be RFC3339 with an explicit timezone offset"),
                field_path,
            ));
            None
        }
    }
}

/// One page of signal records.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalPage {
    /// Records ordered by `(accepted_at ASC, id ASC)`.
    pub records: Vec<SignalRecord>,
    /// Cursor for the next page, when more rows exist.
    pub next_cursor: Option<PageCursor>,
}

/// One page of decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionPage {
    /// Decisions ordered by `(decided_at ASC, id ASC)`.
    pub decisions: Vec<Decision>,
    /// Cursor for the next page, when more rows exist.
    pub next_cursor: Option<PageCursor>,
}

// ============================================================================
// SECTION: Signal Log
// ============================================================================

/// Signal log errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SignalLogError {
    /// Signal log I/O error.
    #[error("signal log io error: {0}")]
    Io(String),
    /// Signal log backend error.
    #[error("signal log store error: {0}")]
    Store(String),
    /// Signal log data is invalid.
    #[error("signal log invalid data: {0}")]
    Invalid(String),
    /// Signal log schema version is incompatible.
    #[error("signal log version mismatch: {0}")]
    VersionMismatch(String),
    /// A page token does not resolve to a stored row.
    #[error("page token does not resolve to a stored row")]
    UnknownPageToken,
    /// One or more referenced signal identifiers do not exist anywhere.
    #[error("unknown signal ids: {}", ids.join(", "))]
    UnknownSignalIds {
        /// The unknown identifiers, in request order.
        ids: Vec<String>,
    },
    /// One or more referenced signals exist only in another tenant.
    #[error("signals outside org scope: {}", ids.join(", "))]
    NotInOrgScope {
        /// The cross-tenant identifiers, in request order.
        ids: Vec<String>,
    },
}

/// Append-only, per-tenant ordered signal log.
pub trait SignalLog: Send + Sync {
    /// Appends an accepted envelope; insert-only.
    ///
    /// # Errors
    ///
    /// Returns [`SignalLogError`] when the append fails.
    fn append(
        &self,
        envelope: &SignalEnvelope,
        accepted_at: &str,
    ) -> Result<SignalRecord, SignalLogError>;

    /// Queries records by learner and accepted-at range with pagination.
    ///
    /// # Errors
    ///
    /// Returns [`SignalLogError`] when the query fails.
    fn query_range(&self, query: &RangeQuery) -> Result<SignalPage, SignalLogError>;

    /// Fetches records by id set, tenant-scoped at the query layer.
    ///
    /// When fewer rows than requested ids come back, a secondary existence
    /// check (without the org filter) distinguishes unknown ids from
    /// cross-tenant ids; unknown ids take precedence.
    ///
    /// # Errors
    ///
    /// Returns [`SignalLogError::UnknownSignalIds`] or
    /// [`SignalLogError::NotInOrgScope`] for scope violations, other variants
    /// for backend failures.
    fn get_by_ids(
        &self,
        org_id: &OrgId,
        signal_ids: &[SignalId],
    ) -> Result<Vec<SignalRecord>, SignalLogError>;

    /// Reports log readiness for liveness probes.
    ///
    /// # Errors
    ///
    /// Returns [`SignalLogError`] when the log is unavailable.
    fn readiness(&self) -> Result<(), SignalLogError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Idempotency Index
// ============================================================================

/// Idempotency index errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    /// Index I/O error.
    #[error("idempotency index io error: {0}")]
    Io(String),
    /// Index backend error.
    #[error("idempotency index store error: {0}")]
    Store(String),
    /// Index schema version is incompatible.
    #[error("idempotency index version mismatch: {0}")]
    VersionMismatch(String),
}

/// Outcome of an idempotency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyOutcome {
    /// Whether the `(org_id, signal_id)` pair was already recorded.
    pub is_duplicate: bool,
    /// First-acceptance timestamp: the original one for duplicates, the
    /// supplied one otherwise.
    pub received_at: String,
}

/// First-wins `(org_id, signal_id)` acceptance index.
pub trait IdempotencyIndex: Send + Sync {
    /// Atomically records the pair if absent and reports duplicate status.
    ///
    /// # Errors
    ///
    /// Returns [`IdempotencyError`] when the index is unavailable.
    fn check_and_store(
        &self,
        org_id: &OrgId,
        signal_id: &SignalId,
        received_at: &str,
    ) -> Result<IdempotencyOutcome, IdempotencyError>;

    /// Reports index readiness for liveness probes.
    ///
    /// # Errors
    ///
    /// Returns [`IdempotencyError`] when the index is unavailable.
    fn readiness(&self) -> Result<(), IdempotencyError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: State Store
// ============================================================================

/// Learner state store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - `VersionConflict` is the vendor-neutral surface of the optimistic
///   uniqueness constraint on `(org_id, learner_reference, state_version)`.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// Store I/O error.
    #[error("state store io error: {0}")]
    Io(String),
    /// Store backend error.
    #[error("state store error: {0}")]
    Store(String),
    /// Store data is invalid.
    #[error("state store invalid data: {0}")]
    Invalid(String),
    /// Store schema version is incompatible.
    #[error("state store version mismatch: {0}")]
    VersionMismatch(String),
    /// A concurrent writer already persisted this state version.
    #[error("state version conflict for {org_id}/{learner_reference} v{state_version}")]
    VersionConflict {
        /// Tenant scope of the conflict.
        org_id: String,
        /// Learner the conflict occurred for.
        learner_reference: String,
        /// Version that was concurrently taken.
        state_version: i64,
    },
}

/// Versioned learner state store with applied-signal bookkeeping.
pub trait StateStore: Send + Sync {
    /// Loads the latest state snapshot for a learner, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when loading fails.
    fn latest(
        &self,
        org_id: &OrgId,
        learner_reference: &LearnerRef,
    ) -> Result<Option<LearnerState>, StateStoreError>;

    /// Returns which of the given signals were already applied to the learner.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the lookup fails.
    fn already_applied(
        &self,
        org_id: &OrgId,
        learner_reference: &LearnerRef,
        signal_ids: &[SignalId],
    ) -> Result<Vec<SignalId>, StateStoreError>;

    /// Atomically inserts a state version and its applied-signal rows.
    ///
    /// The snapshot row and all applied rows commit together or not at all.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError::VersionConflict`] when a concurrent writer
    /// won the version, other variants for backend failures.
    fn insert_version(
        &self,
        state: &LearnerState,
        applied: &[AppliedSignal],
    ) -> Result<(), StateStoreError>;

    /// Reports store readiness for liveness probes.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), StateStoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Decision Store
// ============================================================================

/// Decision store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum DecisionStoreError {
    /// Store I/O error.
    #[error("decision store io error: {0}")]
    Io(String),
    /// Store backend error.
    #[error("decision store error: {0}")]
    Store(String),
    /// Store data is invalid.
    #[error("decision store invalid data: {0}")]
    Invalid(String),
    /// Store schema version is incompatible.
    #[error("decision store version mismatch: {0}")]
    VersionMismatch(String),
    /// A page token does not resolve to a stored row.
    #[error("page token does not resolve to a stored row")]
    UnknownPageToken,
    /// The `(org_id, decision_id)` pair already exists.
    #[error("duplicate decision {decision_id}")]
    Duplicate {
        /// The conflicting decision identifier.
        decision_id: String,
    },
    /// The decision carries no usable trace.
    #[error("decision {decision_id} is missing its trace")]
    MissingTrace {
        /// The offending decision identifier.
        decision_id: String,
    },
}

/// Append-only decision store with learner/time range reads.
pub trait DecisionStore: Send + Sync {
    /// Persists a decision; insert-only.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionStoreError::Duplicate`] on id collision,
    /// [`DecisionStoreError::MissingTrace`] when the trace is unusable, other
    /// variants for backend failures.
    fn save(&self, decision: &Decision) -> Result<(), DecisionStoreError>;

    /// Queries decisions by learner and decided-at range with pagination.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionStoreError`] when the query fails.
    fn query_range(&self, query: &RangeQuery) -> Result<DecisionPage, DecisionStoreError>;

    /// Loads a decision by identifier within a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionStoreError`] when the lookup fails.
    fn get_by_id(
        &self,
        org_id: &OrgId,
        decision_id: &DecisionId,
    ) -> Result<Option<Decision>, DecisionStoreError>;

    /// Reports store readiness for liveness probes.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionStoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), DecisionStoreError> {
        Ok(())
    }
}
