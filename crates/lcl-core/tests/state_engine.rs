// crates/lcl-core/tests/state_engine.rs
// ============================================================================
// Module: STATE Engine Tests
// Description: Integration tests for the deterministic state reducer.
// Purpose: Validate versioning, idempotent replay, scope rejection, and
//          optimistic concurrency behavior.
// Dependencies: lcl-core, serde_json
// ============================================================================

//! STATE engine behavior tests over the in-memory stores.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

mod common;

use std::sync::Arc;

use lcl_core::AppliedSignal;
use lcl_core::ErrorCode;
use lcl_core::LearnerState;
use lcl_core::StateEngine;
use lcl_core::StateStore;
use lcl_core::StateStoreError;
use lcl_core::runtime::ApplySignalsRequest;
use lcl_core::runtime::InMemorySignalLog;
use lcl_core::runtime::InMemoryStateStore;
use lcl_core::runtime::StateEngineError;
use serde_json::json;

use common::append;
use common::envelope;

fn engine_with_log() -> (StateEngine<InMemorySignalLog, InMemoryStateStore>, Arc<InMemorySignalLog>, Arc<InMemoryStateStore>)
{
    let log = Arc::new(InMemorySignalLog::new());
    let store = Arc::new(InMemoryStateStore::new());
    (StateEngine::new(Arc::clone(&log), Arc::clone(&store)), log, store)
}

fn request(org: &str, learner: &str, ids: &[&str]) -> ApplySignalsRequest {
    ApplySignalsRequest {
        org_id: org.to_string(),
        learner_reference: learner.to_string(),
        signal_ids: ids.iter().map(|id| (*id).to_string()).collect(),
        requested_at: "2026-01-30T12:00:00Z".to_string(),
    }
}

fn rejection_code(error: &StateEngineError) -> Option<ErrorCode> {
    match error {
        StateEngineError::Rejected(rejection) => rejection.first_code(),
        StateEngineError::Store(_) => None,
    }
}

#[test]
fn first_apply_produces_version_one_with_canonical_state_id() {
    let (engine, log, _store) = engine_with_log();
    append(&log, &envelope("org-1", "s1", "learner-1", json!({"a": 1})), "2026-01-30T10:00:00Z");

    let result = engine.apply_signals(&request("org-1", "learner-1", &["s1"])).expect("applied");
    assert_eq!(result.state_version, 1);
    assert_eq!(result.state_id.as_str(), "org-1:learner-1:v1");
    assert_eq!(result.state, json!({"a": 1}));
    assert_eq!(result.applied_signal_ids.len(), 1);
}

#[test]
fn versions_are_gap_free_and_history_is_preserved() {
    let (engine, log, store) = engine_with_log();
    for (index, accepted) in
        ["2026-01-30T10:00:00Z", "2026-01-30T10:01:00Z", "2026-01-30T10:02:00Z"].iter().enumerate()
    {
        let signal_id = format!("s{index}");
        append(
            &log,
            &envelope("org-1", &signal_id, "learner-1", json!({"n": index})),
            accepted,
        );
        engine
            .apply_signals(&request("org-1", "learner-1", &[signal_id.as_str()]))
            .expect("applied");
    }
    let versions = store.versions(&"org-1".into(), &"learner-1".into()).expect("versions");
    let numbers: Vec<i64> = versions.iter().map(|state| state.state_version).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    for state in &versions {
        assert_eq!(
            state.state_id.as_str(),
            format!("org-1:learner-1:v{}", state.state_version)
        );
    }
    assert_eq!(versions[2].state, json!({"n": 2}));
}

#[test]
fn batch_folds_in_accepted_at_order_regardless_of_request_order() {
    let (engine, log, _store) = engine_with_log();
    append(&log, &envelope("org-1", "late", "learner-1", json!({"k": "late"})), "2026-01-30T11:00:00Z");
    append(&log, &envelope("org-1", "early", "learner-1", json!({"k": "early"})), "2026-01-30T10:00:00Z");

    let result =
        engine.apply_signals(&request("org-1", "learner-1", &["late", "early"])).expect("applied");
    // The later-accepted payload wins the fold.
    assert_eq!(result.state, json!({"k": "late"}));
    let applied: Vec<&str> =
        result.applied_signal_ids.iter().map(lcl_core::SignalId::as_str).collect();
    assert_eq!(applied, vec!["early", "late"]);
}

#[test]
fn replay_is_a_no_op_with_prior_coordinates() {
    let (engine, log, store) = engine_with_log();
    append(&log, &envelope("org-1", "s1", "learner-1", json!({"a": 1})), "2026-01-30T10:00:00Z");

    let first = engine.apply_signals(&request("org-1", "learner-1", &["s1"])).expect("applied");
    let second = engine.apply_signals(&request("org-1", "learner-1", &["s1"])).expect("replayed");
    assert_eq!(second.state_version, first.state_version);
    assert_eq!(second.state_id, first.state_id);
    assert!(second.applied_signal_ids.is_empty());
    assert_eq!(second.state, first.state);

    let versions = store.versions(&"org-1".into(), &"learner-1".into()).expect("versions");
    assert_eq!(versions.len(), 1);
}

#[test]
fn split_application_equals_batch_application() {
    let (engine_batch, log_batch, _) = engine_with_log();
    let (engine_split, log_split, _) = engine_with_log();
    let payload_one = json!({"a": {"b": 1}});
    let payload_two = json!({"a": {"c": 2}});
    for log in [&log_batch, &log_split] {
        append(log, &envelope("org-1", "s1", "learner-1", payload_one.clone()), "2026-01-30T10:00:00Z");
        append(log, &envelope("org-1", "s2", "learner-1", payload_two.clone()), "2026-01-30T10:01:00Z");
    }

    let batch =
        engine_batch.apply_signals(&request("org-1", "learner-1", &["s1", "s2"])).expect("batch");
    engine_split.apply_signals(&request("org-1", "learner-1", &["s1"])).expect("first");
    let split = engine_split.apply_signals(&request("org-1", "learner-1", &["s2"])).expect("second");

    assert_eq!(batch.state, split.state);
    assert_eq!(batch.state, json!({"a": {"b": 1, "c": 2}}));
}

#[test]
fn explicit_null_deletes_keys_through_the_fold() {
    let (engine, log, _store) = engine_with_log();
    append(&log, &envelope("org-1", "s1", "learner-1", json!({"a": 1, "keep": true})), "2026-01-30T10:00:00Z");
    append(&log, &envelope("org-1", "s2", "learner-1", json!({"a": null})), "2026-01-30T10:01:00Z");

    let result =
        engine.apply_signals(&request("org-1", "learner-1", &["s1", "s2"])).expect("applied");
    assert_eq!(result.state, json!({"keep": true}));
}

#[test]
fn cross_tenant_batch_rejects_whole_batch_without_state_row() {
    let (engine, log, store) = engine_with_log();
    append(&log, &envelope("org-A", "sig-a", "learner-1", json!({"a": 1})), "2026-01-30T10:00:00Z");
    append(&log, &envelope("org-B", "sig-b", "learner-1", json!({"b": 2})), "2026-01-30T10:01:00Z");

    let error = engine
        .apply_signals(&request("org-A", "learner-1", &["sig-a", "sig-b"]))
        .expect_err("rejected");
    assert_eq!(rejection_code(&error), Some(ErrorCode::SignalsNotInOrgScope));

    let versions = store.versions(&"org-A".into(), &"learner-1".into()).expect("versions");
    assert!(versions.is_empty());
}

#[test]
fn unknown_id_takes_precedence_over_cross_tenant() {
    let (engine, log, _store) = engine_with_log();
    append(&log, &envelope("org-B", "sig-b", "learner-1", json!({"b": 2})), "2026-01-30T10:00:00Z");

    let error = engine
        .apply_signals(&request("org-A", "learner-1", &["sig-b", "sig-missing"]))
        .expect_err("rejected");
    assert_eq!(rejection_code(&error), Some(ErrorCode::UnknownSignalId));
}

#[test]
fn blank_request_fields_reject_with_stable_codes() {
    let (engine, _log, _store) = engine_with_log();
    let error = engine.apply_signals(&request("", "learner-1", &["s1"])).expect_err("rejected");
    assert_eq!(rejection_code(&error), Some(ErrorCode::OrgScopeRequired));

    let error = engine.apply_signals(&request("org-1", " ", &["s1"])).expect_err("rejected");
    assert_eq!(rejection_code(&error), Some(ErrorCode::MissingRequiredField));

    let error = engine.apply_signals(&request("org-1", "learner-1", &[])).expect_err("rejected");
    assert_eq!(rejection_code(&error), Some(ErrorCode::MissingRequiredField));
}

#[test]
fn forbidden_key_in_derived_state_rejects_with_path() {
    let (engine, log, store) = engine_with_log();
    append(
        &log,
        &envelope("org-1", "s1", "learner-1", json!({"nested": {"deep": {"workflow": 1}}})),
        "2026-01-30T10:00:00Z",
    );
    let error =
        engine.apply_signals(&request("org-1", "learner-1", &["s1"])).expect_err("rejected");
    let StateEngineError::Rejected(rejection) = &error else {
        panic!("expected rejection");
    };
    let entry = rejection.first().expect("entry");
    assert_eq!(entry.code, ErrorCode::ForbiddenSemanticKeyDetected);
    assert_eq!(entry.field_path.as_deref(), Some("state.nested.deep.workflow"));
    let versions = store.versions(&"org-1".into(), &"learner-1".into()).expect("versions");
    assert!(versions.is_empty());
}

#[test]
fn lost_race_is_retried_once_then_rejected() {
    /// State store that reports a conflict on every insert.
    struct AlwaysConflict {
        inner: InMemoryStateStore,
    }

    impl StateStore for AlwaysConflict {
        fn latest(
            &self,
            org_id: &lcl_core::OrgId,
            learner_reference: &lcl_core::LearnerRef,
        ) -> Result<Option<LearnerState>, StateStoreError> {
            self.inner.latest(org_id, learner_reference)
        }

        fn already_applied(
            &self,
            org_id: &lcl_core::OrgId,
            learner_reference: &lcl_core::LearnerRef,
            signal_ids: &[lcl_core::SignalId],
        ) -> Result<Vec<lcl_core::SignalId>, StateStoreError> {
            self.inner.already_applied(org_id, learner_reference, signal_ids)
        }

        fn insert_version(
            &self,
            state: &LearnerState,
            _applied: &[AppliedSignal],
        ) -> Result<(), StateStoreError> {
            Err(StateStoreError::VersionConflict {
                org_id: state.org_id.as_str().to_string(),
                learner_reference: state.learner_reference.as_str().to_string(),
                state_version: state.state_version,
            })
        }
    }

    let log = Arc::new(InMemorySignalLog::new());
    append(&log, &envelope("org-1", "s1", "learner-1", json!({"a": 1})), "2026-01-30T10:00:00Z");
    let store = Arc::new(AlwaysConflict {
        inner: InMemoryStateStore::new(),
    });
    let engine = StateEngine::new(Arc::clone(&log), store);

    let error =
        engine.apply_signals(&request("org-1", "learner-1", &["s1"])).expect_err("rejected");
    assert_eq!(rejection_code(&error), Some(ErrorCode::StateVersionConflict));
}

#[test]
fn winner_and_retry_interleave_preserves_gap_free_versions() {
    // Two engines over the same stores simulate concurrent appliers: the
    // second apply sees the first one's version and lands on the next.
    let log = Arc::new(InMemorySignalLog::new());
    let store = Arc::new(InMemoryStateStore::new());
    append(&log, &envelope("org-1", "s1", "learner-1", json!({"a": 1})), "2026-01-30T10:00:00Z");
    append(&log, &envelope("org-1", "s2", "learner-1", json!({"b": 2})), "2026-01-30T10:01:00Z");

    let engine_one = StateEngine::new(Arc::clone(&log), Arc::clone(&store));
    let engine_two = StateEngine::new(Arc::clone(&log), Arc::clone(&store));
    let first = engine_one.apply_signals(&request("org-1", "learner-1", &["s1"])).expect("one");
    let second = engine_two.apply_signals(&request("org-1", "learner-1", &["s2"])).expect("two");
    assert_eq!(first.state_version, 1);
    assert_eq!(second.state_version, 2);
    assert_eq!(second.state, json!({"a": 1, "b": 2}));
}

#[test]
fn provenance_tracks_the_last_applied_signal() {
    let (engine, log, store) = engine_with_log();
    let mut early = envelope("org-1", "s1", "learner-1", json!({"a": 1}));
    early.timestamp = "2026-01-30T09:00:00Z".to_string();
    let mut late = envelope("org-1", "s2", "learner-1", json!({"b": 2}));
    late.timestamp = "2026-01-30T09:30:00Z".to_string();
    append(&log, &early, "2026-01-30T10:00:00Z");
    append(&log, &late, "2026-01-30T10:01:00Z");

    engine.apply_signals(&request("org-1", "learner-1", &["s1", "s2"])).expect("applied");
    let versions = store.versions(&"org-1".into(), &"learner-1".into()).expect("versions");
    let provenance = &versions[0].provenance;
    assert_eq!(provenance.last_signal_id.as_str(), "s2");
    assert_eq!(provenance.last_signal_timestamp, "2026-01-30T09:30:00Z");
}
