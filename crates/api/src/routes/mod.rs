pub mod health;
pub mod telemetry;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /iot-data                        ingest (POST), current snapshot (GET)
/// /iot-data/history                recent committed batches
/// /iot-data/services/{name}        one service's asset states
/// /iot-data/stream                 WebSocket snapshot stream
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/iot-data", telemetry::router())
}
