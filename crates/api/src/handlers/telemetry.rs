//! Handlers for telemetry ingestion and snapshot queries.
//!
//! Ingestion only validates and queues: the response is `202 Accepted` and
//! the effect becomes visible in the snapshot once the processor commits.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use cranewatch_core::asset::AssetState;
use cranewatch_core::error::CoreError;
use cranewatch_core::snapshot::HistoryEntry;
use cranewatch_core::types::Timestamp;
use cranewatch_pipeline::ingest::{ingest as ingest_payload, IngestReceipt};
use serde::Serialize;

use crate::error::AppResult;
use crate::query::HistoryParams;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Current snapshot as returned by `GET /iot-data`.
#[derive(Debug, Serialize)]
pub struct SnapshotView {
    pub sequence: u64,
    pub last_updated: Option<Timestamp>,
    pub total_services: usize,
    pub total_assets: usize,
    pub services: BTreeMap<String, Arc<Vec<AssetState>>>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/iot-data
///
/// Validate a telemetry payload and queue its service batches.
pub async fn ingest(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<DataResponse<IngestReceipt>>)> {
    let receipt = ingest_payload(&state.queue, &body, Utc::now())?;
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: receipt })))
}

/// GET /api/v1/iot-data
///
/// The latest committed snapshot of every service.
pub async fn get_snapshot(State(state): State<AppState>) -> Json<DataResponse<SnapshotView>> {
    let snapshot = state.store.read();
    Json(DataResponse {
        data: SnapshotView {
            sequence: snapshot.sequence,
            last_updated: snapshot.last_updated,
            total_services: snapshot.total_services(),
            total_assets: snapshot.total_assets(),
            services: snapshot.services.clone(),
        },
    })
}

/// GET /api/v1/iot-data/history?limit=N
///
/// The newest committed batches, oldest first.
pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<DataResponse<Vec<Arc<HistoryEntry>>>> {
    let limit = params.resolve(state.store.history_capacity());
    Json(DataResponse {
        data: state.store.read().recent_history(limit),
    })
}

/// GET /api/v1/iot-data/services/{name}
pub async fn get_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<DataResponse<Arc<Vec<AssetState>>>>> {
    let states = state
        .store
        .read()
        .services
        .get(&name)
        .cloned()
        .ok_or(CoreError::NotFound {
            entity: "Service",
            id: name,
        })?;
    Ok(Json(DataResponse { data: states }))
}
