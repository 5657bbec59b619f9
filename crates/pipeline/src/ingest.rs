//! Ingestion entry point: validate a raw payload and queue its batches.

use cranewatch_core::error::CoreError;
use cranewatch_core::telemetry::{parse_payload, RejectedReading};
use cranewatch_core::types::Timestamp;
use serde::Serialize;

use crate::queue::{IngestionQueue, QueueError};

/// What happened to an accepted payload.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub received_services: usize,
    pub received_assets: usize,
    pub queued_batches: usize,
    pub rejected_readings: Vec<RejectedReading>,
    pub dropped_services: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The payload cannot be interpreted at all. Not retryable.
    #[error(transparent)]
    Malformed(#[from] CoreError),

    /// The queue cannot take the payload right now.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Parse `body` and admit all of its surviving batches atomically.
pub fn ingest(
    queue: &IngestionQueue,
    body: &[u8],
    received_at: Timestamp,
) -> Result<IngestReceipt, IngestError> {
    let parsed = parse_payload(body, received_at).inspect_err(|e| {
        tracing::warn!(error = %e, bytes = body.len(), "Rejected malformed ingestion payload");
    })?;

    let queued_batches = queue.enqueue_all(parsed.batches).inspect_err(|e| {
        tracing::warn!(
            error = %e,
            queued = queue.len(),
            "Ingestion payload refused by queue"
        );
    })?;

    tracing::debug!(
        services = parsed.received_services,
        assets = parsed.received_assets,
        queued_batches,
        rejected = parsed.rejected.len(),
        "Ingestion payload queued"
    );

    Ok(IngestReceipt {
        received_services: parsed.received_services,
        received_assets: parsed.received_assets,
        queued_batches,
        rejected_readings: parsed.rejected,
        dropped_services: parsed.dropped_services,
    })
}
