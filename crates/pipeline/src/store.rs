//! Authoritative, concurrently readable snapshot of all asset states.
//!
//! Readers get an `Arc<Snapshot>` that is never mutated afterwards. A commit
//! builds the successor view off to the side and publishes it with a single
//! atomic pointer swap, so [`SnapshotStore::read`] returns either the view
//! before a commit or the one after it, never a mixture.

use std::collections::VecDeque;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use cranewatch_core::asset::AssetState;
use cranewatch_core::snapshot::{HistoryEntry, Snapshot};
use cranewatch_core::telemetry::Reading;
use cranewatch_core::types::Timestamp;

/// Default number of committed batches kept in history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Everything one processed batch contributes to the next snapshot.
#[derive(Debug, Clone)]
pub struct CommitSet {
    pub service_name: String,
    /// Complete, ordered state list for the service after the batch.
    pub states: Vec<AssetState>,
    /// The batch's readings, as recorded in history.
    pub readings: Vec<Reading>,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct SnapshotStore {
    published: ArcSwap<Snapshot>,
    history_capacity: usize,
}

impl SnapshotStore {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            published: ArcSwap::from_pointee(Snapshot::empty()),
            history_capacity,
        }
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// The current snapshot.
    pub fn read(&self) -> Arc<Snapshot> {
        self.published.load_full()
    }

    /// Publish the successor of the current snapshot with `set` applied.
    ///
    /// Concurrent commits are retried against the latest view (`rcu`), so
    /// none is lost.
    pub fn commit(&self, set: CommitSet) -> Arc<Snapshot> {
        let committed_at = Utc::now();
        let states = Arc::new(set.states);
        let readings = set.readings;

        let mut published = None;
        self.published.rcu(|current| {
            let next = Arc::new(self.successor(
                current,
                &set.service_name,
                Arc::clone(&states),
                &readings,
                (set.succeeded, set.failed),
                committed_at,
            ));
            published = Some(Arc::clone(&next));
            next
        });

        // `rcu` runs the closure at least once.
        published.unwrap_or_else(|| self.read())
    }

    fn successor(
        &self,
        current: &Snapshot,
        service_name: &str,
        states: Arc<Vec<AssetState>>,
        readings: &[Reading],
        (succeeded, failed): (usize, usize),
        committed_at: Timestamp,
    ) -> Snapshot {
        let sequence = current.sequence + 1;

        let mut services = current.services.clone();
        services.insert(service_name.to_string(), states);

        let mut history: VecDeque<Arc<HistoryEntry>> = current.history.clone();
        if self.history_capacity > 0 {
            while history.len() >= self.history_capacity {
                history.pop_front();
            }
            history.push_back(Arc::new(HistoryEntry {
                sequence,
                service_name: service_name.to_string(),
                committed_at,
                readings: readings.to_vec(),
                succeeded,
                failed,
            }));
        }

        Snapshot {
            sequence,
            last_updated: Some(committed_at),
            services,
            history,
        }
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn load_state(value: f64) -> AssetState {
        let reading = Reading::new("Load", value, Utc::now());
        AssetState::first_sighting("LoadCell", &reading, false, Utc::now())
    }

    fn set(service: &str, value: f64) -> CommitSet {
        CommitSet {
            service_name: service.to_string(),
            states: vec![load_state(value)],
            readings: vec![Reading::new("Load", value, Utc::now())],
            succeeded: 1,
            failed: 0,
        }
    }

    #[test]
    fn commit_replaces_service_and_keeps_others() {
        let store = SnapshotStore::default();
        store.commit(set("LoadCell", 3500.0));
        store.commit(set("Other", 1.0));
        let snapshot = store.commit(set("LoadCell", 4200.0));

        assert_eq!(snapshot.sequence, 3);
        assert_eq!(snapshot.service("LoadCell").unwrap()[0].value, 4200.0);
        assert_eq!(snapshot.service("Other").unwrap()[0].value, 1.0);
        assert!(snapshot.last_updated.is_some());
    }

    #[test]
    fn earlier_reads_are_not_affected_by_later_commits() {
        let store = SnapshotStore::default();
        store.commit(set("LoadCell", 3500.0));
        let before = store.read();

        store.commit(set("LoadCell", 4200.0));

        assert_eq!(before.sequence, 1);
        assert_eq!(before.service("LoadCell").unwrap()[0].value, 3500.0);
        assert_eq!(store.read().service("LoadCell").unwrap()[0].value, 4200.0);
    }

    #[test]
    fn history_evicts_oldest_first() {
        let store = SnapshotStore::new(3);
        for i in 0..5 {
            store.commit(set("LoadCell", i as f64));
        }

        let snapshot = store.read();
        let sequences: Vec<u64> = snapshot.history.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![3, 4, 5]);
    }

    #[test]
    fn zero_capacity_keeps_no_history() {
        let store = SnapshotStore::new(0);
        store.commit(set("LoadCell", 1.0));
        assert!(store.read().history.is_empty());
        assert_eq!(store.read().sequence, 1);
    }

    #[test]
    fn concurrent_commits_are_not_lost() {
        let store = Arc::new(SnapshotStore::new(1000));
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.commit(set(&format!("svc-{w}"), i as f64));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let snapshot = store.read();
        assert_eq!(snapshot.sequence, 200);
        assert_eq!(snapshot.history.len(), 200);
        assert_eq!(snapshot.total_services(), 4);
        for w in 0..4 {
            let name = format!("svc-{w}");
            assert_eq!(snapshot.service(&name).unwrap()[0].value, 49.0);
        }
    }
}
