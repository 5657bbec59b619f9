use std::sync::Arc;

use chrono::Utc;
use cranewatch_core::snapshot::Snapshot;
use cranewatch_core::types::Timestamp;
use serde::Serialize;

/// Message type tag used by stream clients to recognise snapshot pushes.
pub const MSG_TYPE_IOT_DATA_UPDATE: &str = "iot_data_update";

/// Envelope pushed to live stream consumers for every committed snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotUpdate {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub sequence: u64,
    pub total_services: usize,
    pub total_assets: usize,
    pub data: Arc<Snapshot>,
    pub timestamp: Timestamp,
}

impl SnapshotUpdate {
    pub fn new(snapshot: Arc<Snapshot>) -> Self {
        Self {
            message_type: MSG_TYPE_IOT_DATA_UPDATE,
            sequence: snapshot.sequence,
            total_services: snapshot.total_services(),
            total_assets: snapshot.total_assets(),
            data: snapshot,
            timestamp: Utc::now(),
        }
    }
}
