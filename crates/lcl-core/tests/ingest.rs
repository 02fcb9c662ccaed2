// crates/lcl-core/tests/ingest.rs
// ============================================================================
// Module: Ingestion Pipeline Tests
// Description: Integration tests for the per-signal orchestration order.
// Purpose: Validate stage ordering, duplicate handling, and failure isolation.
// Dependencies: lcl-core, serde_json
// ============================================================================

//! Ingestion pipeline behavior tests over the in-memory stores.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

mod common;

use lcl_core::DecisionStore;
use lcl_core::ErrorCode;
use lcl_core::RangeQuery;
use lcl_core::SignalLog;
use lcl_core::StateStore;
use lcl_core::runtime::IngestStatus;
use serde_json::Value;
use serde_json::json;

use common::memory_pipeline;

fn raw_signal(org: &str, signal: &str, payload: Value) -> Value {
    json!({
        "org_id": org,
        "signal_id": signal,
        "source_system": "lms-adapter",
        "learner_reference": "learner-1",
        "timestamp": "2026-01-30T10:00:00Z",
        "schema_version": "v2",
        "payload": payload
    })
}

fn wide_query(org: &str) -> RangeQuery {
    RangeQuery::from_params(
        Some(org),
        Some("learner-1"),
        Some("2026-01-01T00:00:00Z"),
        Some("2026-12-31T00:00:00Z"),
        None,
        None,
    )
    .expect("query")
}

#[test]
fn accepted_signal_flows_through_state_and_decision() {
    let wired = memory_pipeline();
    let raw = raw_signal("org-1", "s1", json!({"stabilityScore": 0.28, "timeSinceReinforcement": 90000}));
    let report = wired.pipeline.ingest(&raw, "2026-01-30T10:05:00Z").expect("ingest");

    assert_eq!(report.result.status, IngestStatus::Accepted);
    assert_eq!(report.result.received_at.as_deref(), Some("2026-01-30T10:05:00Z"));
    assert_eq!(report.state_error, None);
    assert_eq!(report.decision_error, None);

    let state = wired
        .state_store
        .latest(&"org-1".into(), &"learner-1".into())
        .expect("latest")
        .expect("state");
    assert_eq!(state.state_version, 1);

    let decisions = wired.decision_store.query_range(&wide_query("org-1")).expect("page");
    assert_eq!(decisions.decisions.len(), 1);
    let decision = &decisions.decisions[0];
    assert_eq!(decision.decision_type, lcl_core::DecisionType::Reinforce);
    assert_eq!(decision.trace.matched_rule_id.as_deref(), Some("rule-reinforce"));
    assert_eq!(decision.trace.state_version, 1);
}

#[test]
fn structural_rejection_stores_nothing() {
    let wired = memory_pipeline();
    let mut raw = raw_signal("org-1", "s1", json!({"a": 1}));
    raw["timestamp"] = json!("2026-01-30T10:00:00");
    let report = wired.pipeline.ingest(&raw, "2026-01-30T10:05:00Z").expect("ingest");

    assert_eq!(report.result.status, IngestStatus::Rejected);
    let reason = report.result.rejection_reason.expect("reason");
    assert_eq!(reason.code, ErrorCode::InvalidTimestamp);
    assert_eq!(reason.field_path.as_deref(), Some("timestamp"));

    let page = wired.signal_log.query_range(&wide_query("org-1")).expect("page");
    assert!(page.records.is_empty());
}

#[test]
fn forbidden_payload_key_is_rejected_with_path() {
    let wired = memory_pipeline();
    let raw = raw_signal("org-1", "s1", json!({"x": {"y": {"workflow": {"id": 9}}}}));
    let report = wired.pipeline.ingest(&raw, "2026-01-30T10:05:00Z").expect("ingest");

    assert_eq!(report.result.status, IngestStatus::Rejected);
    let reason = report.result.rejection_reason.expect("reason");
    assert_eq!(reason.code, ErrorCode::ForbiddenSemanticKeyDetected);
    assert_eq!(reason.field_path.as_deref(), Some("payload.x.y.workflow"));
}

#[test]
fn duplicate_replay_returns_original_received_at_and_one_log_row() {
    let wired = memory_pipeline();
    let raw = raw_signal("org-1", "s1", json!({"a": 1}));
    let first = wired.pipeline.ingest(&raw, "2026-01-30T10:05:00Z").expect("first");
    assert_eq!(first.result.status, IngestStatus::Accepted);

    let second = wired.pipeline.ingest(&raw, "2026-01-30T11:00:00Z").expect("second");
    assert_eq!(second.result.status, IngestStatus::Duplicate);
    assert_eq!(second.result.received_at.as_deref(), Some("2026-01-30T10:05:00Z"));

    let page = wired.signal_log.query_range(&wide_query("org-1")).expect("page");
    assert_eq!(page.records.len(), 1);
    let state = wired
        .state_store
        .latest(&"org-1".into(), &"learner-1".into())
        .expect("latest")
        .expect("state");
    assert_eq!(state.state_version, 1);
}

#[test]
fn same_signal_id_in_two_orgs_is_not_a_duplicate() {
    let wired = memory_pipeline();
    let first = wired
        .pipeline
        .ingest(&raw_signal("org-A", "shared", json!({"a": 1})), "2026-01-30T10:05:00Z")
        .expect("first");
    let second = wired
        .pipeline
        .ingest(&raw_signal("org-B", "shared", json!({"b": 2})), "2026-01-30T10:06:00Z")
        .expect("second");
    assert_eq!(first.result.status, IngestStatus::Accepted);
    assert_eq!(second.result.status, IngestStatus::Accepted);
}

#[test]
fn decision_failure_is_isolated_and_request_still_accepted() {
    use std::sync::Arc;

    use lcl_core::DecisionEngine;
    use lcl_core::IngestPipeline;
    use lcl_core::StateEngine;
    use lcl_core::runtime::InMemoryDecisionStore;
    use lcl_core::runtime::InMemoryIdempotencyIndex;
    use lcl_core::runtime::InMemorySignalLog;
    use lcl_core::runtime::InMemoryStateStore;

    // No policy loaded: the decision stage rejects with policy_not_found,
    // which must not leak into the ingest result.
    let signal_log = Arc::new(InMemorySignalLog::new());
    let idempotency = Arc::new(InMemoryIdempotencyIndex::new());
    let state_store = Arc::new(InMemoryStateStore::new());
    let decision_store = Arc::new(InMemoryDecisionStore::new());
    let pipeline = IngestPipeline::new(
        Arc::clone(&signal_log),
        Arc::clone(&idempotency),
        StateEngine::new(Arc::clone(&signal_log), Arc::clone(&state_store)),
        DecisionEngine::new(Arc::clone(&state_store), Arc::clone(&decision_store), None),
    );

    let raw = raw_signal("org-1", "s1", json!({"a": 1}));
    let report = pipeline.ingest(&raw, "2026-01-30T10:05:00Z").expect("ingest");
    assert_eq!(report.result.status, IngestStatus::Accepted);
    assert_eq!(report.state_error, None);
    let decision_error = report.decision_error.expect("isolated failure");
    assert!(decision_error.contains("policy_not_found"));

    // State advanced even though the decision stage failed.
    let state = state_store
        .latest(&"org-1".into(), &"learner-1".into())
        .expect("latest")
        .expect("state");
    assert_eq!(state.state_version, 1);
    let page = decision_store.query_range(&wide_query("org-1")).expect("page");
    assert!(page.decisions.is_empty());
}

#[test]
fn signals_accrue_versions_per_learner() {
    let wired = memory_pipeline();
    for (signal, payload) in [
        ("s1", json!({"stabilityScore": 0.9})),
        ("s2", json!({"stabilityScore": 0.2, "timeSinceReinforcement": 90000})),
    ] {
        let report = wired
            .pipeline
            .ingest(&raw_signal("org-1", signal, payload), "2026-01-30T10:05:00Z")
            .expect("ingest");
        assert_eq!(report.result.status, IngestStatus::Accepted);
    }
    let state = wired
        .state_store
        .latest(&"org-1".into(), &"learner-1".into())
        .expect("latest")
        .expect("state");
    assert_eq!(state.state_version, 2);
    assert_eq!(state.state, json!({"stabilityScore": 0.2, "timeSinceReinforcement": 90000}));

    let decisions = wired.decision_store.query_range(&wide_query("org-1")).expect("page");
    assert_eq!(decisions.decisions.len(), 2);
    // The second decision reflects the reinforce rule firing on v2.
    assert_eq!(decisions.decisions[1].trace.state_version, 2);
    assert_eq!(
        decisions.decisions[1].trace.matched_rule_id.as_deref(),
        Some("rule-reinforce")
    );
}

#[test]
fn log_row_round_trips_envelope_fields_exactly() {
    let wired = memory_pipeline();
    let raw = raw_signal("org-1", "s1", json!({"nested": {"deep": [1, 2, 3]}}));
    wired.pipeline.ingest(&raw, "2026-01-30T10:05:00Z").expect("ingest");

    let page = wired.signal_log.query_range(&wide_query("org-1")).expect("page");
    let record = &page.records[0];
    assert_eq!(record.envelope.org_id.as_str(), "org-1");
    assert_eq!(record.envelope.signal_id.as_str(), "s1");
    assert_eq!(record.envelope.source_system, "lms-adapter");
    assert_eq!(record.envelope.timestamp, "2026-01-30T10:00:00Z");
    assert_eq!(record.envelope.schema_version, "v2");
    assert_eq!(record.envelope.payload, json!({"nested": {"deep": [1, 2, 3]}}));
    assert_eq!(record.accepted_at, "2026-01-30T10:05:00Z");
}
