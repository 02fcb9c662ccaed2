// crates/lcl-store-sqlite/src/lib.rs
// ============================================================================
// Module: Learning Control Layer SQLite Stores
// Description: Durable store implementations for all four pipeline stores.
// Purpose: Persist signals, idempotency rows, states, and decisions in SQLite.
// Dependencies: lcl-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Four durable stores over `rusqlite`, one database each: the append-only
//! signal log, the first-wins idempotency index, the versioned learner state
//! store, and the append-only decision store. All four share the same
//! connection posture (WAL, FULL synchronous, busy timeout, `store_meta`
//! schema versioning) and support `:memory:` paths for tests.
//!
//! Tenant isolation is enforced inside every SQL query: no read ever filters
//! `org_id` after the fact.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod connection;
pub mod decision_store;
pub mod idempotency;
pub mod signal_log;
pub mod state_store;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use connection::MEMORY_PATH;
pub use connection::SqliteJournalMode;
pub use connection::SqliteStoreConfig;
pub use connection::SqliteStoreError;
pub use connection::SqliteSyncMode;
pub use decision_store::SqliteDecisionStore;
pub use idempotency::SqliteIdempotencyIndex;
pub use signal_log::SqliteSignalLog;
pub use state_store::SqliteStateStore;
