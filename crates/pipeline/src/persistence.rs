//! Hand-off of committed batches to durable storage.
//!
//! Durable storage is an external collaborator behind the [`AssetSink`]
//! trait. The processor never talks to it directly: it submits each
//! committed batch to a [`PersistenceHandle`], and a separate
//! [`PersistenceWorker`] task writes them out. A slow or failing sink can
//! therefore neither block nor fail the in-memory commit; at worst batches
//! are skipped and logged.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cranewatch_core::asset::AssetState;
use cranewatch_core::telemetry::Reading;
use cranewatch_core::types::Timestamp;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Batches buffered between the processor and the sink.
pub(crate) const PERSISTENCE_BUFFER: usize = 256;

/// A committed batch as handed to durable storage.
#[derive(Debug, Clone, Serialize)]
pub struct CommittedBatch {
    pub sequence: u64,
    pub service_name: String,
    pub committed_at: Timestamp,
    /// Only the states this batch touched.
    pub states: Vec<AssetState>,
    pub readings: Vec<Reading>,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable storage collaborator.
#[async_trait]
pub trait AssetSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn persist(&self, batch: &CommittedBatch) -> Result<(), SinkError>;
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Discards everything. Used when no durable storage is configured.
pub struct NoopSink;

#[async_trait]
impl AssetSink for NoopSink {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn persist(&self, _batch: &CommittedBatch) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Appends one JSON line per committed batch to a file.
pub struct JsonlSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AssetSink for JsonlSink {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn persist(&self, batch: &CommittedBatch) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(batch)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Producer side used by the processor. Never waits.
#[derive(Clone)]
pub struct PersistenceHandle {
    sender: mpsc::Sender<CommittedBatch>,
}

impl PersistenceHandle {
    /// Queue a batch for persistence. Returns `false` if it was skipped
    /// because the worker is behind or gone.
    pub fn submit(&self, batch: CommittedBatch) -> bool {
        match self.sender.try_send(batch) {
            Ok(()) => true,
            Err(TrySendError::Full(batch)) => {
                tracing::warn!(
                    sequence = batch.sequence,
                    service = %batch.service_name,
                    "Persistence backlog full, batch not persisted"
                );
                false
            }
            Err(TrySendError::Closed(batch)) => {
                tracing::warn!(
                    sequence = batch.sequence,
                    "Persistence worker stopped, batch not persisted"
                );
                false
            }
        }
    }
}

/// Background service that feeds committed batches to an [`AssetSink`].
pub struct PersistenceWorker;

impl PersistenceWorker {
    /// Spawn the worker. It exits once every [`PersistenceHandle`] has been
    /// dropped and the backlog is written.
    pub fn spawn(sink: Arc<dyn AssetSink>) -> (PersistenceHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(PERSISTENCE_BUFFER);
        let handle = tokio::spawn(Self::run(sink, receiver));
        (PersistenceHandle { sender }, handle)
    }

    async fn run(sink: Arc<dyn AssetSink>, mut receiver: mpsc::Receiver<CommittedBatch>) {
        tracing::info!(sink = sink.name(), "Persistence worker started");
        while let Some(batch) = receiver.recv().await {
            if let Err(e) = sink.persist(&batch).await {
                tracing::error!(
                    error = %e,
                    sink = sink.name(),
                    sequence = batch.sequence,
                    service = %batch.service_name,
                    "Failed to persist committed batch"
                );
            }
        }
        tracing::info!(sink = sink.name(), "Persistence worker shutting down");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
