use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `shutting_down` once the queue no longer accepts batches.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub total_services: usize,
    pub total_assets: usize,
    /// Sequence of the latest committed snapshot.
    pub sequence: u64,
    /// Committed batches currently retained in history.
    pub history_count: usize,
    pub subscribers: usize,
}

/// GET /health -- returns pipeline health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.store.read();
    let status = if state.queue.is_closed() {
        "shutting_down"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        queue_depth: state.queue.len(),
        queue_capacity: state.queue.capacity(),
        total_services: snapshot.total_services(),
        total_assets: snapshot.total_assets(),
        sequence: snapshot.sequence,
        history_count: snapshot.history.len(),
        subscribers: state.notifier.subscriber_count().await,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
