// crates/lcl-core/src/policy/load.rs
// ============================================================================
// Module: Policy Loader
// Description: Load-time parsing and validation of policy definitions.
// Purpose: Fail fast at startup so the evaluation hot path never re-validates.
// Dependencies: crate::core, crate::policy::definition, semver, serde_json
// ============================================================================

//! ## Overview
//! Policies are loaded once at process start and cached for the lifetime of
//! the process (no hot-reload). The loader parses the JSON document and walks
//! it explicitly so every violation maps to a stable error code:
//! `invalid_policy_version` (semver), `invalid_decision_type` (closed set),
//! duplicate rule ids, mixed-variant condition nodes, compound nodes with
//! fewer than two children, and unknown operators. A load failure is fatal to
//! the host process.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use semver::Version;
use serde_json::Value;
use thiserror::Error;

use crate::core::decision::DecisionType;
use crate::core::errors::ErrorCode;
use crate::policy::definition::ComparisonOperator;
use crate::policy::definition::ConditionNode;
use crate::policy::definition::LeafCondition;
use crate::policy::definition::PolicyDefinition;
use crate::policy::definition::PolicyRule;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum accepted policy document size in bytes.
pub const MAX_POLICY_BYTES: usize = 1024 * 1024;
/// Maximum supported condition tree nesting depth.
pub const MAX_CONDITION_DEPTH: usize = 32;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Policy loading failures.
///
/// # Invariants
/// - `Invalid` carries a stable [`ErrorCode`] for programmatic handling.
#[derive(Debug, Error)]
pub enum PolicyLoadError {
    /// Policy file could not be read.
    #[error("policy file io error: {0}")]
    Io(String),
    /// Policy document is not valid JSON.
    #[error("policy parse error: {0}")]
    Parse(String),
    /// Policy document violates the policy contract.
    #[error("invalid policy ({}): {message}", code.as_str())]
    Invalid {
        /// Stable rejection code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
    },
}

impl PolicyLoadError {
    /// Builds an `Invalid` error with a stable code.
    fn invalid(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Invalid {
            code,
            message: message.into(),
        }
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads and validates a policy definition from a JSON file.
///
/// # Errors
///
/// Returns [`PolicyLoadError`] when the file cannot be read, is not JSON, or
/// violates the policy contract.
pub fn load_policy_file(path: &Path) -> Result<PolicyDefinition, PolicyLoadError> {
    let raw = fs::read_to_string(path)
        .map_err(|err| PolicyLoadError::Io(format!("{}: {err}", path.display())))?;
    if raw.len() > MAX_POLICY_BYTES {
        return Err(PolicyLoadError::invalid(
            ErrorCode::RequestTooLarge,
            format!("policy document exceeds {MAX_POLICY_BYTES} bytes"),
        ));
    }
    let document: Value =
        serde_json::from_str(&raw).map_err(|err| PolicyLoadError::Parse(err.to_string()))?;
    parse_policy(&document)
}

/// Parses and validates a policy definition from a JSON document.
///
/// # Errors
///
/// Returns [`PolicyLoadError`] for any contract violation.
pub fn parse_policy(document: &Value) -> Result<PolicyDefinition, PolicyLoadError> {
    let Value::Object(entries) = document else {
        return Err(PolicyLoadError::Parse("policy document must be a JSON object".to_string()));
    };

    let policy_id = require_string(entries.get("policy_id"), "policy_id")?;
    let policy_version = require_string(entries.get("policy_version"), "policy_version")?;
    if Version::parse(&policy_version).is_err() {
        return Err(PolicyLoadError::invalid(
            ErrorCode::InvalidPolicyVersion,
            format!("policy_version `{policy_version}` is not valid semver"),
        ));
    }
    let description = match entries.get("description") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(_) => {
            return Err(PolicyLoadError::invalid(
                ErrorCode::InvalidType,
                "description must be a string",
            ));
        }
    };
    let default_decision_type =
        parse_decision_type(entries.get("default_decision_type"), "default_decision_type")?;

    let Some(Value::Array(raw_rules)) = entries.get("rules") else {
        return Err(PolicyLoadError::invalid(
            ErrorCode::MissingRequiredField,
            "rules must be an array",
        ));
    };
    let mut seen_rule_ids = BTreeSet::new();
    let mut rules = Vec::with_capacity(raw_rules.len());
    for raw_rule in raw_rules {
        let rule = parse_rule(raw_rule)?;
        if !seen_rule_ids.insert(rule.rule_id.clone()) {
            return Err(PolicyLoadError::invalid(
                ErrorCode::InvalidFormat,
                format!("duplicate rule_id `{}`", rule.rule_id),
            ));
        }
        rules.push(rule);
    }

    Ok(PolicyDefinition {
        policy_id,
        policy_version,
        description,
        rules,
        default_decision_type,
    })
}

// ============================================================================
// SECTION: Rule Parsing
// ============================================================================

/// Parses a single rule object.
fn parse_rule(raw: &Value) -> Result<PolicyRule, PolicyLoadError> {
    let Value::Object(entries) = raw else {
        return Err(PolicyLoadError::invalid(ErrorCode::InvalidType, "rule must be a JSON object"));
    };
    let rule_id = require_string(entries.get("rule_id"), "rule_id")?;
    let decision_type = parse_decision_type(entries.get("decision_type"), "decision_type")?;
    let Some(raw_condition) = entries.get("condition") else {
        return Err(PolicyLoadError::invalid(
            ErrorCode::MissingRequiredField,
            format!("rule `{rule_id}` is missing its condition"),
        ));
    };
    let condition = parse_condition(raw_condition, 1)?;
    Ok(PolicyRule {
        rule_id,
        condition,
        decision_type,
    })
}

/// Parses a condition node, enforcing exactly one variant per node.
fn parse_condition(raw: &Value, depth: usize) -> Result<ConditionNode, PolicyLoadError> {
    if depth > MAX_CONDITION_DEPTH {
        return Err(PolicyLoadError::invalid(
            ErrorCode::InvalidFormat,
            format!("condition nesting exceeds depth {MAX_CONDITION_DEPTH}"),
        ));
    }
    let Value::Object(entries) = raw else {
        return Err(PolicyLoadError::invalid(
            ErrorCode::InvalidType,
            "condition must be a JSON object",
        ));
    };

    let has_all = entries.contains_key("all");
    let has_any = entries.contains_key("any");
    let has_leaf = entries.contains_key("field")
        || entries.contains_key("operator")
        || entries.contains_key("value");
    let variant_count = usize::from(has_all) + usize::from(has_any) + usize::from(has_leaf);
    if variant_count != 1 {
        return Err(PolicyLoadError::invalid(
            ErrorCode::InvalidFormat,
            "condition must be exactly one of `all`, `any`, or a leaf comparison",
        ));
    }

    if has_all {
        let children = parse_children(entries.get("all"), "all", depth)?;
        ensure_only_keys(entries, &["all"])?;
        return Ok(ConditionNode::All(children));
    }
    if has_any {
        let children = parse_children(entries.get("any"), "any", depth)?;
        ensure_only_keys(entries, &["any"])?;
        return Ok(ConditionNode::Any(children));
    }
    ensure_only_keys(entries, &["field", "operator", "value"])?;
    parse_leaf(entries)
}

/// Parses a compound node's child list (at least two entries).
fn parse_children(
    raw: Option<&Value>,
    combinator: &str,
    depth: usize,
) -> Result<Vec<ConditionNode>, PolicyLoadError> {
    let Some(Value::Array(items)) = raw else {
        return Err(PolicyLoadError::invalid(
            ErrorCode::InvalidType,
            format!("`{combinator}` must be an array of conditions"),
        ));
    };
    if items.len() < 2 {
        return Err(PolicyLoadError::invalid(
            ErrorCode::InvalidFormat,
            format!("`{combinator}` requires at least two child conditions"),
        ));
    }
    items.iter().map(|item| parse_condition(item, depth + 1)).collect()
}

/// Parses a leaf comparison node.
fn parse_leaf(
    entries: &serde_json::Map<String, Value>,
) -> Result<ConditionNode, PolicyLoadError> {
    let field = require_string(entries.get("field"), "field")?;
    let operator_raw = require_string(entries.get("operator"), "operator")?;
    let operator = ComparisonOperator::from_str(&operator_raw).map_err(|err| {
        PolicyLoadError::invalid(ErrorCode::InvalidFormat, err.to_string())
    })?;
    let value = match entries.get("value") {
        Some(value @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => value.clone(),
        Some(_) => {
            return Err(PolicyLoadError::invalid(
                ErrorCode::InvalidType,
                format!("leaf value for `{field}` must be a string, number, or boolean"),
            ));
        }
        None => {
            return Err(PolicyLoadError::invalid(
                ErrorCode::MissingRequiredField,
                format!("leaf condition for `{field}` is missing its value"),
            ));
        }
    };
    Ok(ConditionNode::Leaf(LeafCondition {
        field,
        operator,
        value,
    }))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts a required non-empty string field.
fn require_string(raw: Option<&Value>, field: &str) -> Result<String, PolicyLoadError> {
    match raw {
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(text.clone()),
        Some(Value::String(_)) => Err(PolicyLoadError::invalid(
            ErrorCode::MissingRequiredField,
            format!("{field} must not be blank"),
        )),
        Some(_) => {
            Err(PolicyLoadError::invalid(ErrorCode::InvalidType, format!("{field} must be a string")))
        }
        None => Err(PolicyLoadError::invalid(
            ErrorCode::MissingRequiredField,
            format!("{field} is required"),
        )),
    }
}

/// Parses a decision type against the closed set.
fn parse_decision_type(raw: Option<&Value>, field: &str) -> Result<DecisionType, PolicyLoadError> {
    let text = require_string(raw, field)?;
    DecisionType::from_str(&text)
        .map_err(|err| PolicyLoadError::invalid(ErrorCode::InvalidDecisionType, err.to_string()))
}

/// Rejects condition objects that mix variant fields.
fn ensure_only_keys(
    entries: &serde_json::Map<String, Value>,
    allowed: &[&str],
) -> Result<(), PolicyLoadError> {
    for key in entries.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(PolicyLoadError::invalid(
                ErrorCode::InvalidFormat,
                format!("condition contains unsupported field `{key}`"),
            ));
        }
    }
    Ok(())
}
