// crates/lcl-core/src/policy/mod.rs
// ============================================================================
// Module: Policy
// Description: Declarative policy model, loader, and evaluator.
// Purpose: Group policy definition, load-time validation, and evaluation.
// Dependencies: crate::core, semver, serde_json
// ============================================================================

//! ## Overview
//! Policies are loaded and validated once at startup, then evaluated on the
//! hot path without re-validation. See [`load`] for the load-time contract
//! and [`evaluate`] for the condition semantics.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod definition;
pub mod evaluate;
pub mod load;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use definition::ComparisonOperator;
pub use definition::ConditionNode;
pub use definition::LeafCondition;
pub use definition::PolicyDefinition;
pub use definition::PolicyRule;
pub use evaluate::EvaluationOutcome;
pub use evaluate::evaluate_policy;
pub use load::PolicyLoadError;
pub use load::load_policy_file;
pub use load::parse_policy;
