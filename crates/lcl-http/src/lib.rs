// crates/lcl-http/src/lib.rs
// ============================================================================
// Module: Learning Control Layer HTTP
// Description: REST surface over the control layer pipeline.
// Purpose: Expose ingestion and read endpoints with deterministic errors.
// Dependencies: axum, lcl-config, lcl-core, lcl-store-sqlite, tokio, tracing
// ============================================================================

//! ## Overview
//! This crate wires the transport-neutral core to an `axum` REST surface:
//! context construction (stores + policy cache + pipeline), route
//! registration, request validation, and the failure-isolation logging the
//! ingestion contract requires.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod context;
pub mod server;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use context::AppContext;
pub use context::ControlPipeline;
pub use context::InitError;
pub use server::GetDecisionsResponse;
pub use server::HealthResponse;
pub use server::ServeError;
pub use server::SignalLogReadResponse;
pub use server::build_router;
pub use server::serve;
