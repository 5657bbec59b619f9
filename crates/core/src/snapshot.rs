//! Immutable aggregate view of all tracked asset states.
//!
//! A [`Snapshot`] is never mutated once published. Each commit builds a new
//! one that shares unchanged services and history entries with its
//! predecessor through `Arc`s, so publishing stays cheap while readers hold
//! on to older views.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;

use crate::asset::AssetState;
use crate::telemetry::Reading;
use crate::types::Timestamp;

/// One committed batch as recorded in the history ring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub sequence: u64,
    pub service_name: String,
    pub committed_at: Timestamp,
    pub readings: Vec<Reading>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Point-in-time view of every service's asset states plus recent history.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    /// Number of commits folded into this view. `0` means nothing yet.
    pub sequence: u64,
    pub last_updated: Option<Timestamp>,
    /// Service name to its points, in first-seen order.
    pub services: BTreeMap<String, Arc<Vec<AssetState>>>,
    /// Oldest first.
    pub history: VecDeque<Arc<HistoryEntry>>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn service(&self, name: &str) -> Option<&[AssetState]> {
        self.services.get(name).map(|states| states.as_slice())
    }

    pub fn total_services(&self) -> usize {
        self.services.len()
    }

    pub fn total_assets(&self) -> usize {
        self.services.values().map(|states| states.len()).sum()
    }

    /// The newest `limit` history entries, oldest first.
    pub fn recent_history(&self, limit: usize) -> Vec<Arc<HistoryEntry>> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).cloned().collect()
    }
}
