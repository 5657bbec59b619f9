//! Query parameter types for API handlers.

use serde::Deserialize;

/// Default number of history entries returned when `limit` is absent.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Query parameters for the history endpoint (`?limit=`).
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

impl HistoryParams {
    /// Requested limit, defaulted and capped at `capacity`.
    pub fn resolve(&self, capacity: usize) -> usize {
        self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(capacity)
    }
}
