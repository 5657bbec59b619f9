use std::sync::Arc;

use cranewatch_events::SubscriberNotifier;
use cranewatch_pipeline::queue::IngestionQueue;
use cranewatch_pipeline::store::SnapshotStore;
use cranewatch_pipeline::Pipeline;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Producer side of the ingestion queue.
    pub queue: IngestionQueue,
    /// Latest committed snapshot and history.
    pub store: Arc<SnapshotStore>,
    /// Live snapshot subscribers (stream endpoint).
    pub notifier: Arc<SubscriberNotifier>,
}

impl AppState {
    /// Build state sharing the handles of a running pipeline.
    pub fn new(config: ServerConfig, pipeline: &Pipeline) -> Self {
        Self {
            config: Arc::new(config),
            queue: pipeline.queue.clone(),
            store: Arc::clone(&pipeline.store),
            notifier: Arc::clone(&pipeline.notifier),
        }
    }
}
