//! Telemetry ingestion pipeline.
//!
//! Producers hand raw payloads to [`ingest::ingest`], which validates them and
//! admits the resulting batches to a bounded [`queue::IngestionQueue`]. A
//! single [`processor::Processor`] task drains the queue, applies each batch
//! to the working asset table and commits an immutable snapshot to the
//! [`store::SnapshotStore`]. Every commit is fanned out to subscribers and
//! handed to a [`persistence::PersistenceWorker`].
//!
//! [`Pipeline`] wires these parts together.

pub mod config;
pub mod ingest;
pub mod persistence;
pub mod processor;
pub mod queue;
pub mod store;

use std::sync::Arc;

use cranewatch_events::SubscriberNotifier;
use tokio::task::{JoinError, JoinHandle};

use crate::config::PipelineConfig;
use crate::persistence::{AssetSink, PersistenceWorker};
use crate::processor::{Processor, ProcessorHandle, ProcessorStats};
use crate::queue::IngestionQueue;
use crate::store::SnapshotStore;

/// A running pipeline: the shared handles plus its background tasks.
pub struct Pipeline {
    pub queue: IngestionQueue,
    pub store: Arc<SnapshotStore>,
    pub notifier: Arc<SubscriberNotifier>,
    processor: ProcessorHandle,
    persistence: JoinHandle<()>,
}

impl Pipeline {
    /// Spawn the processor and persistence worker. Must be called inside a
    /// Tokio runtime.
    pub fn start(config: &PipelineConfig, sink: Arc<dyn AssetSink>) -> Self {
        let (queue, receiver) = IngestionQueue::new(config.queue_capacity);
        let store = Arc::new(SnapshotStore::new(config.history_capacity));
        let notifier = Arc::new(SubscriberNotifier::new(config.subscriber_buffer));
        let (persistence_handle, persistence) = PersistenceWorker::spawn(sink);

        let processor = Processor::new(
            receiver,
            Arc::clone(&store),
            Arc::clone(&notifier),
            Some(persistence_handle),
            config.clone(),
        )
        .spawn();

        tracing::info!(
            queue_capacity = queue.capacity(),
            history_capacity = store.history_capacity(),
            "Pipeline started"
        );

        Self {
            queue,
            store,
            notifier,
            processor,
            persistence,
        }
    }

    /// Stop the processor (draining or discarding per config), disconnect
    /// subscribers and wait for the persistence backlog to be written.
    pub async fn shutdown(self) -> Result<ProcessorStats, JoinError> {
        let Self {
            queue,
            notifier,
            processor,
            persistence,
            ..
        } = self;
        drop(queue);

        let stats = processor.shutdown().await?;
        notifier.close_all().await;
        persistence.await?;

        tracing::info!(?stats, "Pipeline stopped");
        Ok(stats)
    }
}
