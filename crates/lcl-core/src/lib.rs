// crates/lcl-core/src/lib.rs
// ============================================================================
// Module: Learning Control Layer Core
// Description: Deterministic signal-to-decision pipeline primitives.
// Purpose: Provide the domain model, engines, and interfaces for the control layer.
// Dependencies: serde, serde_json, thiserror, time, bigdecimal, semver, uuid, base64
// ============================================================================

//! ## Overview
//! `lcl-core` is the transport-neutral heart of the Learning Control Layer:
//! a deterministic pipeline that validates opaque learner signals, folds them
//! into monotonically versioned per-learner state, and evaluates a versioned
//! declarative policy into immutable, fully traced decisions.
//!
//! The crate is organized like its runtime flow:
//! - [`core`] — identifiers, envelopes, state, decisions, the forbidden-key
//!   scanner, the deep-merge reducer, and the structural validator.
//! - [`policy`] — policy definitions, load-time validation, and the recursive
//!   condition evaluator.
//! - [`interfaces`] — backend-agnostic storage contracts with deterministic
//!   ordering and tenant scoping.
//! - [`runtime`] — the STATE engine, the decision engine, the ingestion
//!   pipeline, and in-memory reference stores.
//!
//! Nothing in this crate reads wall-clock time or performs I/O beyond the
//! storage interfaces; hosts supply timestamps and stores.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod policy;
pub mod runtime;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use self::core::decision::Decision;
pub use self::core::decision::DecisionTrace;
pub use self::core::decision::DecisionType;
pub use self::core::envelope::SignalEnvelope;
pub use self::core::envelope::SignalMetadata;
pub use self::core::envelope::SignalRecord;
pub use self::core::errors::ErrorCode;
pub use self::core::errors::FieldError;
pub use self::core::errors::Rejection;
pub use self::core::identifiers::DecisionId;
pub use self::core::identifiers::LearnerRef;
pub use self::core::identifiers::OrgId;
pub use self::core::identifiers::SignalId;
pub use self::core::identifiers::StateId;
pub use self::core::merge::deep_merge;
pub use self::core::scan::FORBIDDEN_SEMANTIC_KEYS;
pub use self::core::scan::ForbiddenKeyHit;
pub use self::core::scan::scan_value;
pub use self::core::state::AppliedSignal;
pub use self::core::state::LearnerState;
pub use self::core::state::StateProvenance;
pub use self::core::validate::validate_envelope;
pub use interfaces::DecisionPage;
pub use interfaces::DecisionStore;
pub use interfaces::DecisionStoreError;
pub use interfaces::IdempotencyError;
pub use interfaces::IdempotencyIndex;
pub use interfaces::IdempotencyOutcome;
pub use interfaces::RangeQuery;
pub use interfaces::SignalLog;
pub use interfaces::SignalLogError;
pub use interfaces::SignalPage;
pub use interfaces::StateStore;
pub use interfaces::StateStoreError;
pub use interfaces::cursor::PageCursor;
pub use policy::PolicyDefinition;
pub use policy::PolicyLoadError;
pub use policy::evaluate_policy;
pub use policy::load_policy_file;
pub use runtime::ApplyResult;
pub use runtime::ApplySignalsRequest;
pub use runtime::DecisionEngine;
pub use runtime::DecisionEngineError;
pub use runtime::EvaluateStateRequest;
pub use runtime::IngestPipeline;
pub use runtime::IngestReport;
pub use runtime::IngestStatus;
pub use runtime::SignalIngestResult;
pub use runtime::StateEngine;
pub use runtime::StateEngineError;
