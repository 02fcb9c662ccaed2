// crates/lcl-core/src/core/merge.rs
// ============================================================================
// Module: State Reducer Merge
// Description: Deep-merge with explicit-null deletion for state folding.
// Purpose: Define the deterministic reducer used by the STATE engine.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! The reducer folds signal payloads into learner state left-to-right using a
//! deep merge:
//! - object patches recurse key-wise (a non-object base counts as empty),
//! - arrays replace entirely (no concatenation),
//! - an explicit `null` at a key deletes that key and is never persisted,
//! - everything else overwrites.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Merge
// ============================================================================

/// Deep-merges a patch value onto a base value.
///
/// An object patch always merges key-wise — over an object base directly,
/// over anything else as if the base were an empty object, so explicit
/// `null` keys are stripped rather than persisted. Any other patch replaces
/// the base.
#[must_use]
pub fn deep_merge(base: &Value, patch: &Value) -> Value {
    let Value::Object(patch_entries) = patch else {
        return patch.clone();
    };
    let mut merged = match base {
        Value::Object(base_entries) => base_entries.clone(),
        _ => Map::new(),
    };
    for (key, patch_value) in patch_entries {
        if patch_value.is_null() {
            merged.shift_remove(key);
            continue;
        }
        let next = match merged.get(key) {
            Some(existing) => deep_merge(existing, patch_value),
            None => deep_merge(&Value::Null, patch_value),
        };
        merged.insert(key.clone(), next);
    }
    Value::Object(merged)
}
