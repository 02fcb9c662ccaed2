// crates/lcl-http/src/server.rs
// ============================================================================
// Module: REST Surface
// Description: Route registration, handlers, and error mapping.
// Purpose: Expose ingestion and read endpoints over the pipeline and stores.
// Dependencies: axum, lcl-core, tokio, tracing
// ============================================================================

//! ## Overview
//! Routes:
//! - `POST /v1/signals` — ingest one envelope; 200 for accepted/duplicate,
//!   400 with a coded rejection reason otherwise.
//! - `GET /v1/signals` — tenant-scoped, time-ranged signal log reads.
//! - `GET /v1/decisions` — tenant-scoped, time-ranged decision reads.
//! - `GET /health` — liveness backed by store probes.
//!
//! STATE and decision failures during ingestion are logged at `warn` and
//! never surface to the client; a successful append always yields `accepted`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use lcl_core::Decision;
use lcl_core::DecisionStore;
use lcl_core::DecisionStoreError;
use lcl_core::ErrorCode;
use lcl_core::FieldError;
use lcl_core::IngestStatus;
use lcl_core::RangeQuery;
use lcl_core::SignalLog;
use lcl_core::SignalLogError;
use lcl_core::SignalRecord;

use crate::context::AppContext;

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Response body for `GET /v1/signals`.
///
/// # Invariants
/// - `next_page_token` is explicitly `null` on the final page.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignalLogReadResponse {
    /// Records ordered by `(accepted_at ASC, id ASC)`.
    pub signals: Vec<SignalRecord>,
    /// Opaque token for the next page, or `null`.
    pub next_page_token: Option<String>,
}

/// Response body for `GET /v1/decisions`.
///
/// # Invariants
/// - `next_page_token` is explicitly `null` on the final page.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetDecisionsResponse {
    /// Decisions ordered by `(decided_at ASC, id ASC)`.
    pub decisions: Vec<Decision>,
    /// Opaque token for the next page, or `null`.
    pub next_page_token: Option<String>,
}

/// Health probe body.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` when every store answers, `unavailable` otherwise.
    pub status: String,
}

// ============================================================================
// SECTION: Query Parameters
// ============================================================================

/// Raw query parameters shared by both read endpoints.
#[derive(Debug, Deserialize)]
struct RangeParams {
    /// Tenant scope (required).
    org_id: Option<String>,
    /// Learner scope (required).
    learner_reference: Option<String>,
    /// Inclusive RFC3339 range start (required).
    from_time: Option<String>,
    /// Inclusive RFC3339 range end (required).
    to_time: Option<String>,
    /// Opaque cursor from a previous page.
    page_token: Option<String>,
    /// Page size within `[1, 1000]`.
    page_size: Option<i64>,
}

impl RangeParams {
    /// Validates the raw parameters into a range query.
    fn into_query(self) -> Result<RangeQuery, Response> {
        RangeQuery::from_params(
            self.org_id.as_deref(),
            self.learner_reference.as_deref(),
            self.from_time.as_deref(),
            self.to_time.as_deref(),
            self.page_token.as_deref(),
            self.page_size,
        )
        .map_err(|rejection| {
            let body = rejection.first().cloned().unwrap_or_else(|| {
                FieldError::new(ErrorCode::InvalidType, "query parameters are invalid")
            });
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        })
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the REST router over a shared context.
#[must_use]
pub fn build_router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/v1/signals", post(ingest_signal).get(query_signals))
        .route("/v1/decisions", get(query_decisions))
        .route("/health", get(health))
        .with_state(context)
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `POST /v1/signals`: ingest one signal envelope.
async fn ingest_signal(
    State(context): State<Arc<AppContext>>,
    Json(raw): Json<Value>,
) -> Response {
    let received_at = now_rfc3339();
    match context.pipeline.ingest(&raw, &received_at) {
        Ok(report) => {
            if let Some(error) = &report.state_error {
                tracing::warn!(error = %error, "state apply failed during ingestion");
            }
            if let Some(error) = &report.decision_error {
                tracing::warn!(error = %error, "decision evaluation failed during ingestion");
            }
            let status = match report.result.status {
                IngestStatus::Rejected => StatusCode::BAD_REQUEST,
                IngestStatus::Accepted | IngestStatus::Duplicate => StatusCode::OK,
            };
            (status, Json(report.result)).into_response()
        }
        Err(error) => {
            tracing::error!(error = %error, "ingestion infrastructure failure");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `GET /v1/signals`: paginated, time-ranged signal log reads.
async fn query_signals(
    State(context): State<Arc<AppContext>>,
    Query(params): Query<RangeParams>,
) -> Response {
    let query = match params.into_query() {
        Ok(query) => query,
        Err(response) => return response,
    };
    match context.signal_log.query_range(&query) {
        Ok(page) => Json(SignalLogReadResponse {
            signals: page.records,
            next_page_token: page.next_cursor.map(lcl_core::PageCursor::encode),
        })
        .into_response(),
        Err(SignalLogError::UnknownPageToken) => (
            StatusCode::BAD_REQUEST,
            Json(FieldError::at(
                ErrorCode::InvalidPageToken,
                "page_token does not resolve to a stored row",
                "page_token",
            )),
        )
            .into_response(),
        Err(error) => {
            tracing::error!(error = %error, "signal log query failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `GET /v1/decisions`: paginated, time-ranged decision reads.
async fn query_decisions(
    State(context): State<Arc<AppContext>>,
    Query(params): Query<RangeParams>,
) -> Response {
    let query = match params.into_query() {
        Ok(query) => query,
        Err(response) => return response,
    };
    match context.decision_store.query_range(&query) {
        Ok(page) => Json(GetDecisionsResponse {
            decisions: page.decisions,
            next_page_token: page.next_cursor.map(lcl_core::PageCursor::encode),
        })
        .into_response(),
        Err(DecisionStoreError::UnknownPageToken) => (
            StatusCode::BAD_REQUEST,
            Json(FieldError::at(
                ErrorCode::InvalidPageToken,
                "page_token does not resolve to a stored row",
                "page_token",
            )),
        )
            .into_response(),
        Err(error) => {
            tracing::error!(error = %error, "decision query failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `GET /health`: liveness backed by store probes.
async fn health(State(context): State<Arc<AppContext>>) -> Response {
    match context.readiness() {
        Ok(()) => Json(HealthResponse {
            status: "ok".to_string(),
        })
        .into_response(),
        Err(error) => {
            tracing::warn!(error = %error, "health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable".to_string(),
                }),
            )
                .into_response()
        }
    }
}

// ============================================================================
// SECTION: Serving
// ============================================================================

/// Serve-loop failures.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The listener could not bind or the server loop failed.
    #[error("http server error: {0}")]
    Io(String),
}

/// Binds the listener and serves until the shutdown future resolves.
///
/// # Errors
///
/// Returns [`ServeError`] when binding or serving fails.
pub async fn serve(
    context: Arc<AppContext>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServeError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ServeError::Io(err.to_string()))?;
    let bound = listener.local_addr().map_err(|err| ServeError::Io(err.to_string()))?;
    tracing::info!(addr = %bound, "control layer listening");
    axum::serve(listener, build_router(context))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|err| ServeError::Io(err.to_string()))
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Returns the current wall-clock time as an RFC3339 string.
///
/// The core never reads time; this is the single host-side clock read used
/// for `received_at`, `requested_at`, and `decided_at`.
fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}
