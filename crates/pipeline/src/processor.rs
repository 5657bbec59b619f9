//! The single background worker that turns queued batches into snapshots.
//!
//! The processor exclusively owns the working asset table. For each batch
//! it stages every reading in arrival order (classifying new points and
//! running the operation counter for digital points of IO-governed
//! services), commits the whole batch to the [`SnapshotStore`] in one swap,
//! then notifies subscribers and hands the batch to persistence.
//!
//! A failing reading is logged and counted, never fatal: the loop only exits
//! on shutdown. At shutdown the queue is closed to producers and the
//! remaining batches are either processed or discarded, per
//! [`PipelineConfig::drain_on_shutdown`].

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use cranewatch_core::asset::AssetState;
use cranewatch_core::error::CoreError;
use cranewatch_core::operations::{self, CounterWarning};
use cranewatch_core::snapshot::Snapshot;
use cranewatch_core::telemetry::{Reading, ServiceBatch};
use cranewatch_core::types::Timestamp;
use cranewatch_events::SubscriberNotifier;
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::persistence::{CommittedBatch, PersistenceHandle};
use crate::queue::QueueReceiver;
use crate::store::{CommitSet, SnapshotStore};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a single reading could not be applied.
#[derive(Debug, thiserror::Error)]
pub enum ReadingError {
    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error("Panic while processing reading: {0}")]
    Panicked(String),
}

/// Result of processing one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Sequence of the snapshot the batch was committed as, if any reading
    /// succeeded.
    pub sequence: Option<u64>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Running totals reported at shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorStats {
    pub batches: u64,
    pub readings_succeeded: u64,
    pub readings_failed: u64,
    /// Batches left in the queue and dropped at shutdown.
    pub discarded_batches: u64,
    /// Committed batches the persistence worker could not accept.
    pub unpersisted_batches: u64,
}

// ---------------------------------------------------------------------------
// Working table
// ---------------------------------------------------------------------------

/// One service's points in first-seen order.
#[derive(Default)]
struct ServiceTable {
    index: HashMap<String, usize>,
    states: Vec<AssetState>,
}

impl ServiceTable {
    fn get(&self, point_id: &str) -> Option<&AssetState> {
        self.index.get(point_id).map(|&i| &self.states[i])
    }

    fn upsert(&mut self, state: AssetState) {
        match self.index.get(&state.point_id) {
            Some(&i) => self.states[i] = state,
            None => {
                self.index.insert(state.point_id.clone(), self.states.len());
                self.states.push(state);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

pub struct Processor {
    receiver: QueueReceiver,
    store: Arc<SnapshotStore>,
    notifier: Arc<SubscriberNotifier>,
    persistence: Option<PersistenceHandle>,
    config: PipelineConfig,
    tables: HashMap<String, ServiceTable>,
    stats: ProcessorStats,
}

impl Processor {
    pub fn new(
        receiver: QueueReceiver,
        store: Arc<SnapshotStore>,
        notifier: Arc<SubscriberNotifier>,
        persistence: Option<PersistenceHandle>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            receiver,
            store,
            notifier,
            persistence,
            config,
            tables: HashMap::new(),
            stats: ProcessorStats::default(),
        }
    }

    /// Start the processing loop on its own task.
    pub fn spawn(self) -> ProcessorHandle {
        let cancel = CancellationToken::new();
        let join = tokio::spawn(self.run(cancel.clone()));
        ProcessorHandle { cancel, join }
    }

    /// Process batches until `cancel` fires or every producer is gone, then
    /// apply the shutdown drain policy.
    pub async fn run(mut self, cancel: CancellationToken) -> ProcessorStats {
        tracing::info!(
            io_services = ?self.config.io_services,
            drain_on_shutdown = self.config.drain_on_shutdown,
            "Processor started"
        );

        while let Some(batch) = self.receiver.dequeue(&cancel).await {
            self.process_batch(batch).await;
        }

        self.receiver.close();
        if self.config.drain_on_shutdown {
            let mut drained = 0u64;
            while let Some(batch) = self.receiver.try_dequeue() {
                self.process_batch(batch).await;
                drained += 1;
            }
            tracing::info!(drained, "Processor drained queue");
        } else {
            while self.receiver.try_dequeue().is_some() {
                self.stats.discarded_batches += 1;
            }
            if self.stats.discarded_batches > 0 {
                tracing::warn!(
                    discarded = self.stats.discarded_batches,
                    "Processor discarded queued batches at shutdown"
                );
            }
        }

        tracing::info!(
            batches = self.stats.batches,
            succeeded = self.stats.readings_succeeded,
            failed = self.stats.readings_failed,
            "Processor stopped"
        );
        self.stats
    }

    /// Stage every reading of `batch`, then commit, notify and persist.
    pub async fn process_batch(&mut self, batch: ServiceBatch) -> BatchOutcome {
        let ServiceBatch {
            service_name,
            readings,
        } = batch;
        let now = Utc::now();
        let is_io_governed = self.config.is_io_governed(&service_name);
        let table = self.tables.entry(service_name.clone()).or_default();

        let mut succeeded = 0;
        let mut failed = 0;
        let mut touched: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for reading in &readings {
            match stage_reading(table, &service_name, is_io_governed, reading, now) {
                Ok(warning) => {
                    if let Some(warning) = warning {
                        tracing::warn!(
                            service = %service_name,
                            point = %reading.point_id,
                            warning = %warning,
                            "Operation counter warning"
                        );
                    }
                    if seen.insert(reading.point_id.as_str()) {
                        touched.push(reading.point_id.clone());
                    }
                    succeeded += 1;
                }
                Err(e) => {
                    tracing::error!(
                        service = %service_name,
                        point = %reading.point_id,
                        error = %e,
                        "Failed to process reading"
                    );
                    failed += 1;
                }
            }
        }

        self.stats.batches += 1;
        self.stats.readings_succeeded += succeeded as u64;
        self.stats.readings_failed += failed as u64;

        if succeeded == 0 {
            tracing::warn!(
                service = %service_name,
                failed,
                "Batch had no applicable readings, nothing committed"
            );
            return BatchOutcome {
                sequence: None,
                succeeded,
                failed,
            };
        }

        let updated: Vec<AssetState> = touched
            .iter()
            .filter_map(|id| table.get(id).cloned())
            .collect();

        let snapshot = self.store.commit(CommitSet {
            service_name: service_name.clone(),
            states: table.states.clone(),
            readings: readings.clone(),
            succeeded,
            failed,
        });

        tracing::debug!(
            service = %service_name,
            sequence = snapshot.sequence,
            succeeded,
            failed,
            "Batch committed"
        );

        self.publish(&snapshot).await;

        if let Some(persistence) = &self.persistence {
            let accepted = persistence.submit(CommittedBatch {
                sequence: snapshot.sequence,
                service_name,
                committed_at: snapshot.last_updated.unwrap_or(now),
                states: updated,
                readings,
            });
            if !accepted {
                self.stats.unpersisted_batches += 1;
            }
        }

        BatchOutcome {
            sequence: Some(snapshot.sequence),
            succeeded,
            failed,
        }
    }

    async fn publish(&self, snapshot: &Arc<Snapshot>) {
        let report = self.notifier.publish(Arc::clone(snapshot)).await;
        if report.dropped > 0 {
            tracing::info!(
                sequence = snapshot.sequence,
                dropped = report.dropped,
                "Dropped unresponsive snapshot subscribers"
            );
        }
    }
}

/// Apply one reading to the table. The table is only touched if the
/// reading is fully processed, so a failure leaves the previous state.
fn stage_reading(
    table: &mut ServiceTable,
    service_name: &str,
    is_io_governed: bool,
    reading: &Reading,
    now: Timestamp,
) -> Result<Option<CounterWarning>, ReadingError> {
    reading.validate()?;
    let existing = table.get(&reading.point_id);
    let (next, warning) =
        isolate(|| next_state(existing, service_name, is_io_governed, reading, now))?;
    table.upsert(next);
    Ok(warning)
}

/// Compute a point's state after `reading` without mutating the original.
fn next_state(
    existing: Option<&AssetState>,
    service_name: &str,
    is_io_governed: bool,
    reading: &Reading,
    now: Timestamp,
) -> (AssetState, Option<CounterWarning>) {
    let Some(previous) = existing else {
        return (
            AssetState::first_sighting(service_name, reading, is_io_governed, now),
            None,
        );
    };

    let mut next = previous.clone();
    let mut warning = None;
    if next.counts_operations() {
        let delta = operations::apply(
            Some(previous),
            &reading.point_id,
            reading.value,
            reading.timestamp,
        );
        next.apply_delta(&delta);
        warning = delta.warning;
    }
    next.record(reading, now);
    (next, warning)
}

/// Run `f`, converting a panic into a [`ReadingError::Panicked`].
pub(crate) fn isolate<T>(f: impl FnOnce() -> T) -> Result<T, ReadingError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        ReadingError::Panicked(message)
    })
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Lifecycle handle for a spawned [`Processor`].
pub struct ProcessorHandle {
    cancel: CancellationToken,
    join: JoinHandle<ProcessorStats>,
}

impl ProcessorHandle {
    /// Signal shutdown and wait for the drain policy to complete.
    pub async fn shutdown(self) -> Result<ProcessorStats, JoinError> {
        self.cancel.cancel();
        self.join.await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{
        AssetSink, NoopSink, PersistenceWorker, SinkError, PERSISTENCE_BUFFER,
    };
    use crate::queue::IngestionQueue;
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn processor() -> (Processor, Arc<SnapshotStore>, IngestionQueue) {
        let (queue, receiver) = IngestionQueue::new(16);
        let store = Arc::new(SnapshotStore::default());
        let processor = Processor::new(
            receiver,
            Arc::clone(&store),
            Arc::new(SubscriberNotifier::default()),
            None,
            PipelineConfig::default(),
        );
        (processor, store, queue)
    }

    fn io_batch(readings: &[(&str, f64, i64)]) -> ServiceBatch {
        ServiceBatch::new(
            "onboard_io",
            readings
                .iter()
                .map(|&(id, value, secs)| Reading::new(id, value, t(secs)))
                .collect(),
        )
    }

    #[test]
    fn isolate_converts_panics() {
        assert_eq!(isolate(|| 5).unwrap(), 5);
        assert_matches!(
            isolate(|| -> u8 { panic!("boom") }),
            Err(ReadingError::Panicked(msg)) if msg == "boom"
        );
    }

    #[tokio::test]
    async fn invalid_reading_does_not_abort_the_batch() {
        let (mut processor, store, _queue) = processor();

        let outcome = processor
            .process_batch(io_batch(&[
                ("Hoist_Up", 0.0, 0),
                ("Load", f64::NAN, 0),
                ("", 1.0, 0),
            ]))
            .await;

        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.sequence, Some(1));
        let snapshot = store.read();
        assert_eq!(snapshot.service("onboard_io").unwrap().len(), 1);
        assert_eq!(snapshot.history[0].failed, 2);
    }

    #[tokio::test]
    async fn batch_without_applicable_readings_is_not_committed() {
        let (mut processor, store, _queue) = processor();

        let outcome = processor
            .process_batch(io_batch(&[("Load", f64::INFINITY, 0)]))
            .await;

        assert_eq!(outcome.sequence, None);
        assert_eq!(store.read().sequence, 0);
    }

    #[tokio::test]
    async fn edges_within_one_batch_are_applied_in_order() {
        let (mut processor, store, _queue) = processor();

        processor
            .process_batch(io_batch(&[
                ("Hoist_Up", 0.0, 0),
                ("Hoist_Up", 1.0, 10),
                ("Hoist_Up", 0.0, 12),
            ]))
            .await;

        let snapshot = store.read();
        let state = &snapshot.service("onboard_io").unwrap()[0];
        let counters = state.counters.as_ref().unwrap();
        assert_eq!(counters.hoist_up_count, 1);
        assert_eq!(counters.total_operation_duration, 2.0);
        assert_eq!(state.last_operation_start, Some(t(10)));
        assert_eq!(state.last_operation_end, Some(t(12)));
    }

    #[tokio::test]
    async fn points_keep_first_seen_order() {
        let (mut processor, store, _queue) = processor();

        processor
            .process_batch(io_batch(&[("Start", 0.0, 0), ("Hoist_Up", 0.0, 0)]))
            .await;
        processor
            .process_batch(io_batch(&[
                ("Hoist_Up", 1.0, 1),
                ("Ct_Left", 0.0, 1),
                ("Start", 1.0, 1),
            ]))
            .await;

        let snapshot = store.read();
        let ids: Vec<&str> = snapshot
            .service("onboard_io")
            .unwrap()
            .iter()
            .map(|s| s.point_id.as_str())
            .collect();
        assert_eq!(ids, vec!["Start", "Hoist_Up", "Ct_Left"]);
    }

    #[tokio::test]
    async fn drains_queue_on_shutdown() {
        let (processor, store, queue) = processor();
        for i in 0..3 {
            queue.enqueue(io_batch(&[("Hoist_Up", 0.0, i)])).unwrap();
        }

        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = processor.run(cancel).await;

        assert_eq!(stats.batches, 3);
        assert_eq!(stats.discarded_batches, 0);
        assert_eq!(store.read().sequence, 3);
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn discards_queue_on_shutdown_when_configured() {
        let (queue, receiver) = IngestionQueue::new(16);
        let store = Arc::new(SnapshotStore::default());
        let config = PipelineConfig {
            drain_on_shutdown: false,
            ..PipelineConfig::default()
        };
        let processor = Processor::new(
            receiver,
            Arc::clone(&store),
            Arc::new(SubscriberNotifier::default()),
            None,
            config,
        );
        for i in 0..2 {
            queue.enqueue(io_batch(&[("Hoist_Up", 0.0, i)])).unwrap();
        }

        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = processor.run(cancel).await;

        assert_eq!(stats.batches, 0);
        assert_eq!(stats.discarded_batches, 2);
        assert_eq!(store.read().sequence, 0);
    }

    /// Holds every batch until released, which the tests never do.
    struct StalledSink {
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl AssetSink for StalledSink {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn persist(&self, _batch: &CommittedBatch) -> Result<(), SinkError> {
            self.release.notified().await;
            Ok(())
        }
    }

    fn processor_with_persistence(
        persistence: PersistenceHandle,
    ) -> (Processor, Arc<SnapshotStore>) {
        let (_queue, receiver) = IngestionQueue::new(16);
        let store = Arc::new(SnapshotStore::new(0));
        let processor = Processor::new(
            receiver,
            Arc::clone(&store),
            Arc::new(SubscriberNotifier::default()),
            Some(persistence),
            PipelineConfig::default(),
        );
        (processor, store)
    }

    #[tokio::test]
    async fn stalled_sink_does_not_hold_back_commits() {
        let sink = Arc::new(StalledSink {
            release: tokio::sync::Notify::new(),
        });
        let (handle, _worker) = PersistenceWorker::spawn(sink);
        let (mut processor, store) = processor_with_persistence(handle.clone());

        // The worker holds at most one batch; the buffer takes the rest.
        let batches = PERSISTENCE_BUFFER as i64 + 10;
        for i in 0..batches {
            let outcome = processor.process_batch(io_batch(&[("Hoist_Up", 0.0, i)])).await;
            assert_eq!(outcome.sequence, Some(i as u64 + 1));
        }

        assert_eq!(store.read().sequence, batches as u64);
        assert!(processor.stats.unpersisted_batches >= 9);
        assert!(!handle.submit(CommittedBatch {
            sequence: 0,
            service_name: "onboard_io".to_string(),
            committed_at: t(0),
            states: Vec::new(),
            readings: Vec::new(),
        }));
    }

    #[tokio::test]
    async fn stopped_worker_does_not_hold_back_commits() {
        let (handle, worker) = PersistenceWorker::spawn(Arc::new(NoopSink));
        worker.abort();
        let _ = worker.await;
        let (mut processor, store) = processor_with_persistence(handle);

        let outcome = processor.process_batch(io_batch(&[("Hoist_Up", 1.0, 0)])).await;

        assert_eq!(outcome.sequence, Some(1));
        assert_eq!(store.read().sequence, 1);
        assert_eq!(processor.stats.unpersisted_batches, 1);
    }
}
