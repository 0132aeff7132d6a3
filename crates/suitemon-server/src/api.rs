use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use suitemon_storage::poll_store::PollStore;

/// Read-only operational surface: tenant statuses and run history. The
/// operator UI proper lives elsewhere; this API only exposes what the engine
/// already records.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<PollStore>,
    pub start_time: DateTime<Utc>,
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/tenants", get(list_tenants))
        .route("/v1/runs", get(list_runs))
        .with_state(state)
}

async fn healthz(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let uptime_secs = (Utc::now() - state.start_time).num_seconds();
    Json(serde_json::json!({ "status": "ok", "uptime_secs": uptime_secs }))
}

async fn list_tenants(State(state): State<ApiState>) -> Response {
    match state.store.list_tenants() {
        Ok(tenants) => Json(tenants).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list tenants");
            internal_error()
        }
    }
}

#[derive(Deserialize)]
struct RunsParams {
    limit: Option<usize>,
}

async fn list_runs(State(state): State<ApiState>, Query(params): Query<RunsParams>) -> Response {
    let limit = params.limit.unwrap_or(20).min(500);
    match state.store.list_run_summaries(limit) {
        Ok(summaries) => Json(summaries).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list run summaries");
            internal_error()
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "internal error" })),
    )
        .into_response()
}
