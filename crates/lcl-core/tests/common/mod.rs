// crates/lcl-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Fixtures
// Description: Shared builders for engine and pipeline integration tests.
// Purpose: Keep envelope/policy construction consistent across suites.
// Dependencies: lcl-core, serde_json
// ============================================================================

//! Shared fixtures for lcl-core integration tests.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    dead_code,
    reason = "Test-only helpers; each suite uses a subset."
)]

use std::sync::Arc;

use lcl_core::DecisionEngine;
use lcl_core::IngestPipeline;
use lcl_core::SignalEnvelope;
use lcl_core::SignalLog;
use lcl_core::StateEngine;
use lcl_core::policy::PolicyDefinition;
use lcl_core::policy::parse_policy;
use lcl_core::runtime::InMemoryDecisionStore;
use lcl_core::runtime::InMemoryIdempotencyIndex;
use lcl_core::runtime::InMemorySignalLog;
use lcl_core::runtime::InMemoryStateStore;
use serde_json::Value;
use serde_json::json;

/// Builds a valid envelope for the given coordinates and payload.
pub fn envelope(org: &str, signal: &str, learner: &str, payload: Value) -> SignalEnvelope {
    SignalEnvelope {
        org_id: org.into(),
        signal_id: signal.into(),
        source_system: "lms-adapter".to_string(),
        learner_reference: learner.into(),
        timestamp: "2026-01-30T10:00:00Z".to_string(),
        schema_version: "v2".to_string(),
        payload,
        metadata: None,
    }
}

/// Appends an envelope with the given accepted-at timestamp.
pub fn append(log: &InMemorySignalLog, env: &SignalEnvelope, accepted_at: &str) {
    log.append(env, accepted_at).expect("append");
}

/// The reference policy used across suites (scenario policy, v2.0.0).
pub fn reference_policy() -> PolicyDefinition {
    parse_policy(&json!({
        "policy_id": "default-learning-policy",
        "policy_version": "2.0.0",
        "description": "reference policy",
        "rules": [
            {
                "rule_id": "rule-reinforce",
                "condition": {
                    "all": [
                        {"field": "stabilityScore", "operator": "lt", "value": 0.7},
                        {"field": "timeSinceReinforcement", "operator": "gt", "value": 86400}
                    ]
                },
                "decision_type": "reinforce"
            },
            {
                "rule_id": "rule-escalate",
                "condition": {
                    "all": [
                        {"field": "confidenceInterval", "operator": "lt", "value": 0.3},
                        {
                            "any": [
                                {"field": "stabilityScore", "operator": "lt", "value": 0.3},
                                {"field": "riskSignal", "operator": "gt", "value": 0.8}
                            ]
                        }
                    ]
                },
                "decision_type": "escalate"
            }
        ],
        "default_decision_type": "reinforce"
    }))
    .expect("reference policy")
}

/// Fully wired in-memory pipeline plus handles to its stores.
pub struct MemoryPipeline {
    pub signal_log: Arc<InMemorySignalLog>,
    pub idempotency: Arc<InMemoryIdempotencyIndex>,
    pub state_store: Arc<InMemoryStateStore>,
    pub decision_store: Arc<InMemoryDecisionStore>,
    pub pipeline: IngestPipeline<
        InMemorySignalLog,
        InMemoryIdempotencyIndex,
        InMemoryStateStore,
        InMemoryDecisionStore,
    >,
}

/// Wires a complete in-memory pipeline around the reference policy.
pub fn memory_pipeline() -> MemoryPipeline {
    let signal_log = Arc::new(InMemorySignalLog::new());
    let idempotency = Arc::new(InMemoryIdempotencyIndex::new());
    let state_store = Arc::new(InMemoryStateStore::new());
    let decision_store = Arc::new(InMemoryDecisionStore::new());
    let state_engine = StateEngine::new(Arc::clone(&signal_log), Arc::clone(&state_store));
    let decision_engine = DecisionEngine::new(
        Arc::clone(&state_store),
        Arc::clone(&decision_store),
        Some(Arc::new(reference_policy())),
    );
    let pipeline = IngestPipeline::new(
        Arc::clone(&signal_log),
        Arc::clone(&idempotency),
        state_engine,
        decision_engine,
    );
    MemoryPipeline {
        signal_log,
        idempotency,
        state_store,
        decision_store,
        pipeline,
    }
}
