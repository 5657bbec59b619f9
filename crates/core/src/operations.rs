//! Edge-triggered operation counting for digital movement controls.
//!
//! Pure logic: [`apply`] looks at the previous state of a point and the new
//! value and returns a [`CounterDelta`]. The caller applies it with
//! [`AssetState::apply_delta`] and logs any [`CounterWarning`].
//!
//! - Rising edge (`0 -> 1`): increment the counter mapped from the point
//!   name and mark the operation start.
//! - Falling edge (`1 -> 0`): mark the operation end and accumulate the
//!   elapsed time since the last start.
//! - Anything else only updates the value.

use serde::{Deserialize, Serialize};

use crate::asset::AssetState;
use crate::types::Timestamp;

/// Counter an operation point maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Start,
    HoistUp,
    HoistDown,
    CtForward,
    CtBackward,
    LtForward,
    LtBackward,
}

/// Point-name keyword to counter, matched case-insensitively by substring,
/// first match wins.
///
/// Cross travel left/right are counted as forward/backward, and long travel
/// reverse as backward, matching how the crane reports direction.
pub const OPERATION_RULES: &[(&str, OperationKind)] = &[
    ("hoist_up", OperationKind::HoistUp),
    ("hoist_down", OperationKind::HoistDown),
    ("ct_left", OperationKind::CtForward),
    ("ct_right", OperationKind::CtBackward),
    ("lt_forward", OperationKind::LtForward),
    ("lt_reverse", OperationKind::LtBackward),
    ("start", OperationKind::Start),
];

/// Resolve the counter for a digital point, if it has one.
pub fn operation_for(point_id: &str) -> Option<OperationKind> {
    let id = point_id.to_ascii_lowercase();
    OPERATION_RULES
        .iter()
        .find(|(keyword, _)| id.contains(keyword))
        .map(|(_, kind)| *kind)
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    None,
}

/// Classify a value transition. Only exact `0`/`1` values form edges.
pub fn detect_edge(old_value: f64, new_value: f64) -> Edge {
    if old_value == 0.0 && new_value == 1.0 {
        Edge::Rising
    } else if old_value == 1.0 && new_value == 0.0 {
        Edge::Falling
    } else {
        Edge::None
    }
}

// ---------------------------------------------------------------------------
// Deltas
// ---------------------------------------------------------------------------

/// Non-fatal conditions raised while counting. Values are still recorded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CounterWarning {
    #[error("Digital point {point_id} has no operation counter mapping")]
    UnmappedOperationPoint { point_id: String },

    #[error(
        "Operation on {point_id} ended at {end} before it started at {start}; \
         duration discarded"
    )]
    NonMonotonicDuration {
        point_id: String,
        start: Timestamp,
        end: Timestamp,
    },
}

/// Counter changes produced by one transition.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterDelta {
    pub increment: Option<OperationKind>,
    pub operation_start: Option<Timestamp>,
    pub operation_end: Option<Timestamp>,
    /// Seconds to add to `total_operation_duration`.
    pub duration_secs: Option<f64>,
    pub warning: Option<CounterWarning>,
}

impl CounterDelta {
    fn none() -> Self {
        Self {
            increment: None,
            operation_start: None,
            operation_end: None,
            duration_secs: None,
            warning: None,
        }
    }
}

/// Compute the counter changes for a new value of a digital point.
///
/// `existing` is the point's state before this reading; `None` means the
/// point is seen for the first time, which never forms an edge.
pub fn apply(
    existing: Option<&AssetState>,
    point_id: &str,
    new_value: f64,
    timestamp: Timestamp,
) -> CounterDelta {
    let Some(existing) = existing else {
        return CounterDelta::none();
    };

    match detect_edge(existing.value, new_value) {
        Edge::Rising => match operation_for(point_id) {
            Some(kind) => CounterDelta {
                increment: Some(kind),
                operation_start: Some(timestamp),
                ..CounterDelta::none()
            },
            None => CounterDelta {
                warning: Some(CounterWarning::UnmappedOperationPoint {
                    point_id: point_id.to_string(),
                }),
                ..CounterDelta::none()
            },
        },
        Edge::Falling => {
            let mut delta = CounterDelta {
                operation_end: Some(timestamp),
                ..CounterDelta::none()
            };
            // An interval already closed by an earlier falling edge is not
            // counted again.
            let open_start = existing
                .last_operation_start
                .filter(|start| existing.last_operation_end.map_or(true, |end| *start > end));
            if let Some(start) = open_start {
                if timestamp > start {
                    let elapsed = timestamp - start;
                    delta.duration_secs = Some(elapsed.num_milliseconds() as f64 / 1000.0);
                } else {
                    delta.warning = Some(CounterWarning::NonMonotonicDuration {
                        point_id: point_id.to_string(),
                        start,
                        end: timestamp,
                    });
                }
            }
            delta
        }
        Edge::None => CounterDelta::none(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
