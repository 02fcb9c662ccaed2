// crates/lcl-store-sqlite/tests/sqlite_stores.rs
// ============================================================================
// Module: SQLite Store Unit Tests
// Description: Targeted behavior tests for all four durable stores.
// Purpose: Validate append-only semantics, tenant scoping, deterministic
//          pagination, and the optimistic version constraint.
// Dependencies: lcl-core, lcl-store-sqlite, rusqlite, serde_json, tempfile
// ============================================================================

//! Unit-level tests for the durable store invariants:
//! - insert-only tables and unique constraints
//! - `org_id` filtering inside every query
//! - `(accepted_at, id)` / `(decided_at, id)` ordering with keyset cursors
//! - unknown-vs-cross-tenant id classification
//! - schema version validation on reopen

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]

use lcl_core::AppliedSignal;
use lcl_core::Decision;
use lcl_core::DecisionId;
use lcl_core::DecisionStore;
use lcl_core::DecisionStoreError;
use lcl_core::DecisionTrace;
use lcl_core::DecisionType;
use lcl_core::IdempotencyIndex;
use lcl_core::LearnerState;
use lcl_core::RangeQuery;
use lcl_core::SignalEnvelope;
use lcl_core::SignalLog;
use lcl_core::SignalLogError;
use lcl_core::StateProvenance;
use lcl_core::StateStore;
use lcl_core::StateStoreError;
use lcl_store_sqlite::MEMORY_PATH;
use lcl_store_sqlite::SqliteDecisionStore;
use lcl_store_sqlite::SqliteIdempotencyIndex;
use lcl_store_sqlite::SqliteSignalLog;
use lcl_store_sqlite::SqliteStateStore;
use lcl_store_sqlite::SqliteStoreConfig;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn memory_config() -> SqliteStoreConfig {
    SqliteStoreConfig::new(MEMORY_PATH)
}

fn envelope(org: &str, signal: &str, learner: &str, payload: Value) -> SignalEnvelope {
    SignalEnvelope {
        org_id: org.into(),
        signal_id: signal.into(),
        source_system: "lms-adapter".to_string(),
        learner_reference: learner.into(),
        timestamp: "2026-01-30T09:00:00Z".to_string(),
        schema_version: "v2".to_string(),
        payload,
        metadata: None,
    }
}

fn wide_query(org: &str, learner: &str) -> RangeQuery {
    query_with(org, learner, None, None)
}

fn query_with(
    org: &str,
    learner: &str,
    page_token: Option<&str>,
    page_size: Option<i64>,
) -> RangeQuery {
    RangeQuery::from_params(
        Some(org),
        Some(learner),
        Some("2026-01-01T00:00:00Z"),
        Some("2026-12-31T00:00:00Z"),
        page_token,
        page_size,
    )
    .expect("query")
}

fn learner_state(org: &str, learner: &str, version: i64, state: Value) -> LearnerState {
    LearnerState {
        org_id: org.into(),
        learner_reference: learner.into(),
        state_id: lcl_core::StateId::for_version(&org.into(), &learner.into(), version),
        state_version: version,
        updated_at: "2026-01-30T10:00:00Z".to_string(),
        state,
        provenance: StateProvenance {
            last_signal_id: "s-last".into(),
            last_signal_timestamp: "2026-01-30T09:00:00Z".to_string(),
        },
    }
}

fn applied(org: &str, learner: &str, signal: &str, version: i64) -> AppliedSignal {
    AppliedSignal {
        org_id: org.into(),
        learner_reference: learner.into(),
        signal_id: signal.into(),
        state_version: version,
        applied_at: "2026-01-30T10:00:00Z".to_string(),
    }
}

fn decision(org: &str, learner: &str, decided_at: &str) -> Decision {
    Decision {
        org_id: org.into(),
        decision_id: DecisionId::random(),
        learner_reference: learner.into(),
        decision_type: DecisionType::Reinforce,
        decided_at: decided_at.to_string(),
        decision_context: json!({}),
        trace: DecisionTrace {
            state_id: format!("{org}:{learner}:v1").into(),
            state_version: 1,
            policy_version: "2.0.0".to_string(),
            matched_rule_id: Some("rule-reinforce".to_string()),
        },
        record_id: 0,
    }
}

// ============================================================================
// SECTION: Signal Log
// ============================================================================

#[test]
fn append_round_trips_envelope_fields_exactly() {
    let log = SqliteSignalLog::open(&memory_config()).expect("open");
    let mut env = envelope("org-1", "s1", "learner-1", json!({"deep": {"n": [1, 2]}}));
    env.metadata = Some(lcl_core::SignalMetadata {
        correlation_id: Some("corr-9".to_string()),
        trace_id: None,
    });
    log.append(&env, "2026-01-30T10:00:00Z").expect("append");

    let page = log.query_range(&wide_query("org-1", "learner-1")).expect("page");
    assert_eq!(page.records.len(), 1);
    let record = &page.records[0];
    assert_eq!(record.envelope, env);
    assert_eq!(record.accepted_at, "2026-01-30T10:00:00Z");
    assert_eq!(page.next_cursor, None);
}

#[test]
fn duplicate_org_signal_pair_is_rejected_by_constraint() {
    let log = SqliteSignalLog::open(&memory_config()).expect("open");
    let env = envelope("org-1", "s1", "learner-1", json!({"a": 1}));
    log.append(&env, "2026-01-30T10:00:00Z").expect("append");
    let error = log.append(&env, "2026-01-30T11:00:00Z").expect_err("duplicate");
    assert!(matches!(error, SignalLogError::Store(_)));

    // Same signal id in another org is an independent row.
    let other = envelope("org-2", "s1", "learner-1", json!({"a": 1}));
    log.append(&other, "2026-01-30T10:00:00Z").expect("append");
}

#[test]
fn range_reads_are_tenant_scoped_and_ordered() {
    let log = SqliteSignalLog::open(&memory_config()).expect("open");
    log.append(&envelope("org-1", "b", "learner-1", json!({"n": 2})), "2026-01-30T10:01:00Z")
        .expect("append");
    log.append(&envelope("org-1", "a", "learner-1", json!({"n": 1})), "2026-01-30T10:00:00Z")
        .expect("append");
    log.append(&envelope("org-2", "c", "learner-1", json!({"n": 3})), "2026-01-30T10:00:30Z")
        .expect("append");

    let page = log.query_range(&wide_query("org-1", "learner-1")).expect("page");
    let ids: Vec<&str> =
        page.records.iter().map(|record| record.envelope.signal_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[test]
fn equal_accepted_at_breaks_ties_by_insertion_id() {
    let log = SqliteSignalLog::open(&memory_config()).expect("open");
    for signal in ["first", "second", "third"] {
        log.append(
            &envelope("org-1", signal, "learner-1", json!({"s": signal})),
            "2026-01-30T10:00:00Z",
        )
        .expect("append");
    }
    let page = log.query_range(&wide_query("org-1", "learner-1")).expect("page");
    let ids: Vec<&str> =
        page.records.iter().map(|record| record.envelope.signal_id.as_str()).collect();
    assert_eq!(ids, vec!["first", "second", "third"]);
}

#[test]
fn signal_pagination_is_deterministic_across_runs() {
    let log = SqliteSignalLog::open(&memory_config()).expect("open");
    for (signal, accepted) in
        [("s1", "2026-01-30T10:00:00Z"), ("s2", "2026-01-30T11:00:00Z"), ("s3", "2026-01-30T12:00:00Z")]
    {
        log.append(&envelope("org-1", signal, "learner-1", json!({})), accepted).expect("append");
    }

    let walk = || {
        let mut collected: Vec<String> = Vec::new();
        let mut tokens: Vec<String> = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = log
                .query_range(&query_with("org-1", "learner-1", token.as_deref(), Some(1)))
                .expect("page");
            for record in &page.records {
                collected.push(record.envelope.signal_id.as_str().to_string());
            }
            match page.next_cursor {
                Some(cursor) => {
                    let encoded = cursor.encode();
                    tokens.push(encoded.clone());
                    token = Some(encoded);
                }
                None => break,
            }
        }
        (collected, tokens)
    };
    let (first_ids, first_tokens) = walk();
    let (second_ids, second_tokens) = walk();
    assert_eq!(first_ids, vec!["s1", "s2", "s3"]);
    assert_eq!(first_ids, second_ids);
    assert_eq!(first_tokens, second_tokens);
    assert_eq!(first_tokens.len(), 2);
}

#[test]
fn foreign_cursor_row_is_an_unknown_page_token() {
    let log = SqliteSignalLog::open(&memory_config()).expect("open");
    log.append(&envelope("org-1", "s1", "learner-1", json!({})), "2026-01-30T10:00:00Z")
        .expect("append");
    log.append(&envelope("org-2", "s2", "learner-1", json!({})), "2026-01-30T10:00:00Z")
        .expect("append");

    // org-2's row id is 2; presenting it under org-1 must fail closed.
    let token = lcl_core::PageCursor::new(2).encode();
    let error = log
        .query_range(&query_with("org-1", "learner-1", Some(&token), None))
        .expect_err("rejected");
    assert!(matches!(error, SignalLogError::UnknownPageToken));
}

#[test]
fn get_by_ids_classifies_unknown_and_cross_tenant() {
    let log = SqliteSignalLog::open(&memory_config()).expect("open");
    log.append(&envelope("org-A", "sig-a", "learner-1", json!({})), "2026-01-30T10:00:00Z")
        .expect("append");
    log.append(&envelope("org-B", "sig-b", "learner-1", json!({})), "2026-01-30T10:01:00Z")
        .expect("append");

    let records =
        log.get_by_ids(&"org-A".into(), &["sig-a".into()]).expect("org-scoped fetch");
    assert_eq!(records.len(), 1);

    let error =
        log.get_by_ids(&"org-A".into(), &["sig-a".into(), "sig-b".into()]).expect_err("scope");
    let SignalLogError::NotInOrgScope {
        ids,
    } = error
    else {
        panic!("expected cross-tenant classification");
    };
    assert_eq!(ids, vec!["sig-b"]);

    // Unknown wins over cross-tenant when both are present.
    let error = log
        .get_by_ids(&"org-A".into(), &["sig-b".into(), "sig-nope".into()])
        .expect_err("unknown");
    let SignalLogError::UnknownSignalIds {
        ids,
    } = error
    else {
        panic!("expected unknown classification");
    };
    assert_eq!(ids, vec!["sig-nope"]);
}

// ============================================================================
// SECTION: Idempotency Index
// ============================================================================

#[test]
fn first_insert_wins_and_duplicates_return_original_timestamp() {
    let index = SqliteIdempotencyIndex::open(&memory_config()).expect("open");
    let first = index
        .check_and_store(&"org-1".into(), &"s1".into(), "2026-01-30T10:00:00Z")
        .expect("first");
    assert!(!first.is_duplicate);
    assert_eq!(first.received_at, "2026-01-30T10:00:00Z");

    let second = index
        .check_and_store(&"org-1".into(), &"s1".into(), "2026-01-30T11:00:00Z")
        .expect("second");
    assert!(second.is_duplicate);
    assert_eq!(second.received_at, "2026-01-30T10:00:00Z");
}

#[test]
fn same_signal_id_across_orgs_is_not_a_duplicate() {
    let index = SqliteIdempotencyIndex::open(&memory_config()).expect("open");
    let first = index
        .check_and_store(&"org-A".into(), &"shared".into(), "2026-01-30T10:00:00Z")
        .expect("first");
    let second = index
        .check_and_store(&"org-B".into(), &"shared".into(), "2026-01-30T11:00:00Z")
        .expect("second");
    assert!(!first.is_duplicate);
    assert!(!second.is_duplicate);
    assert_eq!(second.received_at, "2026-01-30T11:00:00Z");
}

// ============================================================================
// SECTION: State Store
// ============================================================================

#[test]
fn insert_version_persists_snapshot_and_applied_rows_atomically() {
    let store = SqliteStateStore::open(&memory_config()).expect("open");
    let state = learner_state("org-1", "learner-1", 1, json!({"a": 1}));
    store
        .insert_version(&state, &[applied("org-1", "learner-1", "s1", 1)])
        .expect("insert");

    let latest = store
        .latest(&"org-1".into(), &"learner-1".into())
        .expect("latest")
        .expect("state");
    assert_eq!(latest.state_version, 1);
    assert_eq!(latest.state, json!({"a": 1}));
    assert_eq!(latest.state_id.as_str(), "org-1:learner-1:v1");

    let already = store
        .already_applied(&"org-1".into(), &"learner-1".into(), &["s1".into(), "s2".into()])
        .expect("lookup");
    assert_eq!(already.len(), 1);
    assert_eq!(already[0].as_str(), "s1");
}

#[test]
fn taken_version_surfaces_as_version_conflict() {
    let store = SqliteStateStore::open(&memory_config()).expect("open");
    store
        .insert_version(
            &learner_state("org-1", "learner-1", 1, json!({"a": 1})),
            &[applied("org-1", "learner-1", "s1", 1)],
        )
        .expect("first");
    let error = store
        .insert_version(
            &learner_state("org-1", "learner-1", 1, json!({"b": 2})),
            &[applied("org-1", "learner-1", "s2", 1)],
        )
        .expect_err("conflict");
    assert!(matches!(error, StateStoreError::VersionConflict { .. }));
}

#[test]
fn failed_insert_leaves_no_applied_rows_behind() {
    let store = SqliteStateStore::open(&memory_config()).expect("open");
    store
        .insert_version(
            &learner_state("org-1", "learner-1", 1, json!({"a": 1})),
            &[applied("org-1", "learner-1", "s1", 1)],
        )
        .expect("first");
    // Version 2 carries a replayed applied row; the whole transaction rolls
    // back, so s2 must not be marked applied.
    let error = store
        .insert_version(
            &learner_state("org-1", "learner-1", 2, json!({"a": 2})),
            &[
                applied("org-1", "learner-1", "s1", 2),
                applied("org-1", "learner-1", "s2", 2),
            ],
        )
        .expect_err("rolled back");
    assert!(matches!(error, StateStoreError::VersionConflict { .. }));
    let already = store
        .already_applied(&"org-1".into(), &"learner-1".into(), &["s2".into()])
        .expect("lookup");
    assert!(already.is_empty());
    let latest = store
        .latest(&"org-1".into(), &"learner-1".into())
        .expect("latest")
        .expect("state");
    assert_eq!(latest.state_version, 1);
}

#[test]
fn all_versions_are_preserved_in_order() {
    let store = SqliteStateStore::open(&memory_config()).expect("open");
    for version in 1 ..= 3 {
        let signal = format!("s{version}");
        store
            .insert_version(
                &learner_state("org-1", "learner-1", version, json!({"v": version})),
                &[applied("org-1", "learner-1", &signal, version)],
            )
            .expect("insert");
    }
    let versions = store.versions(&"org-1".into(), &"learner-1".into()).expect("versions");
    let numbers: Vec<i64> = versions.iter().map(|state| state.state_version).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[test]
fn state_reads_are_tenant_scoped() {
    let store = SqliteStateStore::open(&memory_config()).expect("open");
    store
        .insert_version(
            &learner_state("org-1", "learner-1", 1, json!({"a": 1})),
            &[applied("org-1", "learner-1", "s1", 1)],
        )
        .expect("insert");
    let other = store.latest(&"org-2".into(), &"learner-1".into()).expect("latest");
    assert!(other.is_none());
}

// ============================================================================
// SECTION: Decision Store
// ============================================================================

#[test]
fn decisions_round_trip_with_trace_and_context() {
    let store = SqliteDecisionStore::open(&memory_config()).expect("open");
    let mut stored = decision("org-1", "learner-1", "2026-01-30T10:00:00Z");
    stored.decision_context = json!({});
    store.save(&stored).expect("save");

    let loaded = store
        .get_by_id(&"org-1".into(), &stored.decision_id)
        .expect("lookup")
        .expect("present");
    assert_eq!(loaded.decision_type, DecisionType::Reinforce);
    assert_eq!(loaded.decided_at, "2026-01-30T10:00:00Z");
    assert_eq!(loaded.decision_context, json!({}));
    assert_eq!(loaded.trace, stored.trace);

    // Tenant isolation on point reads.
    let foreign = store.get_by_id(&"org-2".into(), &stored.decision_id).expect("lookup");
    assert!(foreign.is_none());
}

#[test]
fn duplicate_decision_id_is_rejected() {
    let store = SqliteDecisionStore::open(&memory_config()).expect("open");
    let stored = decision("org-1", "learner-1", "2026-01-30T10:00:00Z");
    store.save(&stored).expect("save");
    let error = store.save(&stored).expect_err("duplicate");
    assert!(matches!(error, DecisionStoreError::Duplicate { .. }));
}

#[test]
fn blank_trace_state_id_is_missing_trace() {
    let store = SqliteDecisionStore::open(&memory_config()).expect("open");
    let mut stored = decision("org-1", "learner-1", "2026-01-30T10:00:00Z");
    stored.trace.state_id = "".into();
    let error = store.save(&stored).expect_err("missing trace");
    assert!(matches!(error, DecisionStoreError::MissingTrace { .. }));
}

#[test]
fn decision_pagination_walks_three_pages_deterministically() {
    let store = SqliteDecisionStore::open(&memory_config()).expect("open");
    let times = ["2026-01-30T10:00:00Z", "2026-01-30T11:00:00Z", "2026-01-30T12:00:00Z"];
    let mut ids = Vec::new();
    for decided_at in times {
        let row = decision("org-1", "learner-1", decided_at);
        ids.push(row.decision_id);
        store.save(&row).expect("save");
    }

    let mut walked = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0;
    loop {
        let page = store
            .query_range(&query_with("org-1", "learner-1", token.as_deref(), Some(1)))
            .expect("page");
        pages += 1;
        for row in &page.decisions {
            walked.push(row.decision_id);
        }
        match page.next_cursor {
            Some(cursor) => token = Some(cursor.encode()),
            None => break,
        }
    }
    assert_eq!(pages, 3);
    assert_eq!(walked, ids);
}

// ============================================================================
// SECTION: Durability
// ============================================================================

#[test]
fn file_backed_stores_survive_reopen() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("signals.db");
    {
        let log = SqliteSignalLog::open(&SqliteStoreConfig::new(&path)).expect("open");
        log.append(&envelope("org-1", "s1", "learner-1", json!({"a": 1})), "2026-01-30T10:00:00Z")
            .expect("append");
    }
    let log = SqliteSignalLog::open(&SqliteStoreConfig::new(&path)).expect("reopen");
    let page = log.query_range(&wide_query("org-1", "learner-1")).expect("page");
    assert_eq!(page.records.len(), 1);
}

#[test]
fn foreign_schema_version_fails_closed() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("signals.db");
    {
        let _ = SqliteSignalLog::open(&SqliteStoreConfig::new(&path)).expect("open");
    }
    {
        let connection = rusqlite::Connection::open(&path).expect("raw open");
        connection.execute("UPDATE store_meta SET version = 99", []).expect("poison");
    }
    let error = SqliteSignalLog::open(&SqliteStoreConfig::new(&path)).expect_err("mismatch");
    assert!(matches!(
        error,
        lcl_store_sqlite::SqliteStoreError::VersionMismatch(_)
    ));
}

#[test]
fn directory_path_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let error =
        SqliteSignalLog::open(&SqliteStoreConfig::new(dir.path())).expect_err("rejected");
    assert!(matches!(error, lcl_store_sqlite::SqliteStoreError::Invalid(_)));
}

#[test]
fn configured_path_length_bound_is_enforced() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = SqliteStoreConfig::new(dir.path().join("signals.db"));
    config.max_path_length = 4;
    let error = SqliteSignalLog::open(&config).expect_err("rejected");
    assert!(matches!(error, lcl_store_sqlite::SqliteStoreError::Invalid(_)));

    // The bound never applies to in-memory databases.
    let mut config = memory_config();
    config.max_path_length = 4;
    assert!(SqliteSignalLog::open(&config).is_ok());
}

#[test]
fn zero_limits_fail_config_validation() {
    let mut config = memory_config();
    config.busy_timeout_ms = 0;
    assert!(matches!(
        config.validate(),
        Err(lcl_store_sqlite::SqliteStoreError::Invalid(_))
    ));

    let mut config = memory_config();
    config.max_path_length = 0;
    assert!(matches!(
        config.validate(),
        Err(lcl_store_sqlite::SqliteStoreError::Invalid(_))
    ));
}
