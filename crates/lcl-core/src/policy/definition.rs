// crates/lcl-core/src/policy/definition.rs
// ============================================================================
// Module: Policy Definition
// Description: Versioned declarative policies with recursive condition trees.
// Purpose: Model the closed rule vocabulary evaluated by the decision engine.
// Dependencies: crate::core::decision, serde_json
// ============================================================================

//! ## Overview
//! A [`PolicyDefinition`] is a versioned, ordered list of rules plus a default
//! decision type. Each rule's condition is a recursive tree of `all`/`any`
//! combinators over comparison leaves. Definitions are constructed exclusively
//! by the loader, which validates structure once at startup; the evaluation
//! hot path assumes a well-formed tree.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::core::decision::DecisionType;

// ============================================================================
// SECTION: Operators
// ============================================================================

/// Closed set of leaf comparison operators.
///
/// # Invariants
/// - Wire forms are lowercase and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    /// Strict equality.
    Eq,
    /// Strict inequality.
    Neq,
    /// Numeric greater-than.
    Gt,
    /// Numeric greater-than-or-equal.
    Gte,
    /// Numeric less-than.
    Lt,
    /// Numeric less-than-or-equal.
    Lte,
}

impl ComparisonOperator {
    /// All operators in declaration order.
    pub const ALL: [Self; 6] = [Self::Eq, Self::Neq, Self::Gt, Self::Gte, Self::Lt, Self::Lte];

    /// Returns the stable lowercase wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is outside the closed operator set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperator {
    /// The unrecognized value.
    pub value: String,
}

impl fmt::Display for UnknownOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown comparison operator `{}`", self.value)
    }
}

impl std::error::Error for UnknownOperator {}

impl FromStr for ComparisonOperator {
    type Err = UnknownOperator;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == value)
            .ok_or_else(|| UnknownOperator {
                value: value.to_string(),
            })
    }
}

// ============================================================================
// SECTION: Condition Tree
// ============================================================================

/// Leaf comparison over a single top-level state field.
///
/// # Invariants
/// - `value` is a scalar (string, number, or boolean).
#[derive(Debug, Clone, PartialEq)]
pub struct LeafCondition {
    /// State field read by the comparison.
    pub field: String,
    /// Comparison operator.
    pub operator: ComparisonOperator,
    /// Expected scalar value.
    pub value: Value,
}

/// Recursive condition node with exactly one active variant.
///
/// # Invariants
/// - Compound nodes carry at least two children (enforced at load time).
/// - Nesting depth is bounded at load time; evaluation never re-validates.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    /// Conjunction: true iff every child is true (short-circuits on false).
    All(Vec<ConditionNode>),
    /// Disjunction: true iff any child is true (short-circuits on true).
    Any(Vec<ConditionNode>),
    /// Leaf comparison.
    Leaf(LeafCondition),
}

// ============================================================================
// SECTION: Rules and Policies
// ============================================================================

/// Single policy rule.
///
/// # Invariants
/// - `rule_id` is unique within its policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyRule {
    /// Rule identifier, unique within the policy.
    pub rule_id: String,
    /// Condition tree that must hold for the rule to fire.
    pub condition: ConditionNode,
    /// Decision type emitted when the rule fires.
    pub decision_type: DecisionType,
}

/// Versioned declarative policy.
///
/// # Invariants
/// - `policy_version` is valid semver.
/// - Rules are evaluated in declared order; the first match wins.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDefinition {
    /// Policy identifier.
    pub policy_id: String,
    /// Semver policy version.
    pub policy_version: String,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// Ordered rule list.
    pub rules: Vec<PolicyRule>,
    /// Decision type emitted when no rule fires.
    pub default_decision_type: DecisionType,
}
