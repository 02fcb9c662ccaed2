// crates/lcl-core/src/core/scan.rs
// ============================================================================
// Module: Forbidden-Key Scanner
// Description: Recursive detection of forbidden semantic keys in JSON values.
// Purpose: Keep UI/workflow vocabulary out of payloads, states, and contexts.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! The scanner walks any JSON value in pre-order and reports the first key
//! that belongs to the closed forbidden set. Objects are traversed in
//! insertion order (`serde_json` is built with `preserve_order`), arrays by
//! index. The scan is schema-agnostic and deterministic: identical input
//! always yields the identical hit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

// ============================================================================
// SECTION: Forbidden Keys
// ============================================================================

/// Closed set of forbidden semantic keys.
///
/// Presence of any of these keys at any depth marks a domain leak: payloads
/// are opaque learner signals, never UI, workflow, or content structures.
pub const FORBIDDEN_SEMANTIC_KEYS: &[&str] = &[
    "ui",
    "screen",
    "view",
    "page",
    "route",
    "url",
    "link",
    "button",
    "cta",
    "workflow",
    "task",
    "job",
    "assignment",
    "assignee",
    "owner",
    "status",
    "step",
    "stage",
    "completion",
    "progress_percent",
    "course",
    "lesson",
    "module",
    "quiz",
    "score",
    "grade",
    "content_id",
    "content_url",
];

/// Returns whether a key belongs to the forbidden set.
#[must_use]
pub fn is_forbidden_key(key: &str) -> bool {
    FORBIDDEN_SEMANTIC_KEYS.contains(&key)
}

// ============================================================================
// SECTION: Scan
// ============================================================================

/// First forbidden-key hit found by a scan.
///
/// # Invariants
/// - `path` is dot notation rooted at the scan's base path, with array
///   elements addressed by index (`payload.items[0].workflow`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForbiddenKeyHit {
    /// The forbidden key that was found.
    pub key: String,
    /// Full path of the offending key.
    pub path: String,
}

/// Scans a JSON value for forbidden semantic keys.
///
/// Performs a pre-order walk; the first hit in insertion order wins. Scalar
/// values yield `None`.
#[must_use]
pub fn scan_value(value: &Value, base_path: &str) -> Option<ForbiddenKeyHit> {
    match value {
        Value::Object(entries) => {
            for (key, child) in entries {
                let path = join_path(base_path, key);
                if is_forbidden_key(key) {
                    return Some(ForbiddenKeyHit {
                        key: key.clone(),
                        path,
                    });
                }
                if let Some(hit) = scan_value(child, &path) {
                    return Some(hit);
                }
            }
            None
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let path = format!("{base_path}[{index}]");
                if let Some(hit) = scan_value(item, &path) {
                    return Some(hit);
                }
            }
            None
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => None,
    }
}

/// Joins a base path and a key using dot notation.
fn join_path(base_path: &str, key: &str) -> String {
    if base_path.is_empty() {
        key.to_string()
    } else {
        format!("{base_path}.{key}")
    }
}
