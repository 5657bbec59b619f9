//! Route definitions for telemetry ingestion and snapshot queries.

use axum::routing::get;
use axum::Router;

use crate::handlers::telemetry;
use crate::state::AppState;
use crate::ws;

/// Routes mounted at `/iot-data`.
///
/// ```text
/// POST /                   -> ingest
/// GET  /                   -> get_snapshot
/// GET  /history            -> get_history
/// GET  /services/{name}    -> get_service
/// GET  /stream             -> ws::stream_handler
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(telemetry::get_snapshot).post(telemetry::ingest))
        .route("/history", get(telemetry::get_history))
        .route("/services/{name}", get(telemetry::get_service))
        .route("/stream", get(ws::stream_handler))
}
