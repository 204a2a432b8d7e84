// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. The health endpoint is public; every
// other endpoint requires a valid Bearer token via the `AuthBearer` extractor.
//
// Read endpoints serve whatever the last run persisted in the store, so they
// also work against a store populated by another process.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::health::{check_health, Overall, StageCheck};
use crate::pipeline::{ForecastReport, OpportunityReport};
use crate::store::{get_json, keys};

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Authenticated ───────────────────────────────────────────
        .route("/api/v1/opportunities", get(opportunities))
        .route("/api/v1/forecasts", get(forecasts))
        .route("/api/v1/runs/last", get(last_run))
        .route("/api/v1/runs", post(trigger_run))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, Json(body)).into_response()
}

/// Serve a stored JSON document, 404 when the key has never been written.
fn stored<T: DeserializeOwned + Serialize>(state: &AppState, key: &str) -> Response {
    match get_json::<T>(state.store.as_ref(), key) {
        Ok(Some(value)) => Json(value).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("no data under {key} yet")),
        Err(e) => {
            warn!(key, error = %e, "failed to read stored document");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "stored document is unreadable")
        }
    }
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: Overall,
    checks: Vec<StageCheck>,
    run_version: u64,
    uptime_secs: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let staleness_hours = state.config.read().staleness_hours;
    let report = check_health(state.store.as_ref(), staleness_hours, chrono::Utc::now());
    Json(HealthResponse {
        status: report.overall,
        checks: report.checks,
        run_version: state.current_run_version(),
        uptime_secs: state.uptime_secs(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Stored results (authenticated)
// =============================================================================

async fn opportunities(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> Response {
    stored::<OpportunityReport>(&state, keys::ALPHA_OPPORTUNITIES)
}

async fn forecasts(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> Response {
    stored::<ForecastReport>(&state, keys::ALL_FORECASTS)
}

async fn last_run(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> Response {
    match state.latest_run() {
        Ok(Some(meta)) => Json(meta).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "no run recorded yet"),
        Err(e) => {
            warn!(error = %e, "failed to read run metadata");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "run metadata is unreadable")
        }
    }
}

// =============================================================================
// Run trigger (authenticated)
// =============================================================================

async fn trigger_run(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> Response {
    info!("pipeline run requested via API");
    match state.run_pipeline().await {
        Ok(report) => Json(report.metadata).into_response(),
        Err(e) => {
            warn!(error = %e, "API-triggered run failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("run failed: {e}"))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
