// crates/lcl-core/src/policy/evaluate.rs
// ============================================================================
// Module: Policy Evaluator
// Description: Recursive condition evaluation against learner state.
// Purpose: Produce deterministic first-match-wins policy outcomes.
// Dependencies: crate::policy::definition, bigdecimal, serde_json
// ============================================================================

//! ## Overview
//! Evaluation reads top-level state fields and never raises: an absent field
//! makes its leaf false, `eq`/`neq` are strict with no type coercion, and the
//! ordering operators apply to numbers only (anything else is false). Numeric
//! ordering is decimal-aware and deterministic. Rules are tried in declared
//! order; the first rule whose condition holds wins, otherwise the policy's
//! default decision type applies with no matched rule.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::Number;
use serde_json::Value;

use crate::core::decision::DecisionType;
use crate::policy::definition::ComparisonOperator;
use crate::policy::definition::ConditionNode;
use crate::policy::definition::LeafCondition;
use crate::policy::definition::PolicyDefinition;

// ============================================================================
// SECTION: Evaluation Outcome
// ============================================================================

/// Outcome of evaluating a policy against a state document.
///
/// # Invariants
/// - `matched_rule_id` is `Some` iff a rule fired; `None` iff the default
///   decision type was used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationOutcome {
    /// Decision type produced by the evaluation.
    pub decision_type: DecisionType,
    /// Identifier of the first matching rule, if any.
    pub matched_rule_id: Option<String>,
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates a policy against a learner state document.
///
/// Rules are tried in declared order; the first match wins.
#[must_use]
pub fn evaluate_policy(state: &Value, policy: &PolicyDefinition) -> EvaluationOutcome {
    for rule in &policy.rules {
        if evaluate_node(state, &rule.condition) {
            return EvaluationOutcome {
                decision_type: rule.decision_type,
                matched_rule_id: Some(rule.rule_id.clone()),
            };
        }
    }
    EvaluationOutcome {
        decision_type: policy.default_decision_type,
        matched_rule_id: None,
    }
}

/// Evaluates a condition node against the state document.
fn evaluate_node(state: &Value, node: &ConditionNode) -> bool {
    match node {
        ConditionNode::All(children) => children.iter().all(|child| evaluate_node(state, child)),
        ConditionNode::Any(children) => children.iter().any(|child| evaluate_node(state, child)),
        ConditionNode::Leaf(leaf) => evaluate_leaf(state, leaf),
    }
}

/// Evaluates a leaf comparison; absent fields are false, never an error.
fn evaluate_leaf(state: &Value, leaf: &LeafCondition) -> bool {
    let Some(actual) = state.get(&leaf.field) else {
        return false;
    };
    match leaf.operator {
        ComparisonOperator::Eq => values_equal(actual, &leaf.value),
        ComparisonOperator::Neq => !values_equal(actual, &leaf.value),
        ComparisonOperator::Gt
        | ComparisonOperator::Gte
        | ComparisonOperator::Lt
        | ComparisonOperator::Lte => compare_ordering(leaf.operator, actual, &leaf.value),
    }
}

// ============================================================================
// SECTION: Comparison Semantics
// ============================================================================

/// Strict equality with decimal-aware numeric handling; no cross-type coercion.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left_num), Value::Number(right_num)) => {
            match (decimal_from_number(left_num), decimal_from_number(right_num)) {
                (Some(left_dec), Some(right_dec)) => left_dec == right_dec,
                _ => false,
            }
        }
        (Value::String(left_str), Value::String(right_str)) => left_str == right_str,
        (Value::Bool(left_bool), Value::Bool(right_bool)) => left_bool == right_bool,
        _ => false,
    }
}

/// Numeric ordering comparison; non-numeric operands yield false.
fn compare_ordering(operator: ComparisonOperator, left: &Value, right: &Value) -> bool {
    let (Value::Number(left_num), Value::Number(right_num)) = (left, right) else {
        return false;
    };
    let Some(ordering) = decimal_cmp(left_num, right_num) else {
        return false;
    };
    match operator {
        ComparisonOperator::Gt => ordering.is_gt(),
        ComparisonOperator::Gte => ordering.is_ge(),
        ComparisonOperator::Lt => ordering.is_lt(),
        ComparisonOperator::Lte => ordering.is_le(),
        ComparisonOperator::Eq | ComparisonOperator::Neq => false,
    }
}

/// Orders numeric JSON values using decimal-aware comparison.
fn decimal_cmp(left: &Number, right: &Number) -> Option<Ordering> {
    let left = decimal_from_number(left)?;
    let right = decimal_from_number(right)?;
    Some(left.cmp(&right))
}

/// Parses a JSON number into `BigDecimal` with a stable string representation.
fn decimal_from_number(number: &Number) -> Option<BigDecimal> {
    let rendered = number.to_string();
    BigDecimal::from_str(&rendered).ok()
}
