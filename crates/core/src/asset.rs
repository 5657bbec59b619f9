//! Per-point asset state and operation counters.

use serde::{Deserialize, Serialize};

use crate::classifier::{classify, ValueType};
use crate::operations::{CounterDelta, OperationKind};
use crate::telemetry::Reading;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// OperationCounters
// ---------------------------------------------------------------------------

/// Operation counters kept for points of IO-governed services.
///
/// `total_operation_count` is derived: it always equals the sum of the six
/// movement counters. `start_count` is informational and not part of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationCounters {
    pub start_count: u64,
    pub hoist_up_count: u64,
    pub hoist_down_count: u64,
    pub ct_forward_count: u64,
    pub ct_backward_count: u64,
    pub lt_forward_count: u64,
    pub lt_backward_count: u64,
    pub total_operation_count: u64,
    /// Accumulated seconds across completed operation intervals.
    pub total_operation_duration: f64,
}

impl OperationCounters {
    /// Increment the counter for `kind` and refresh the derived total.
    pub fn increment(&mut self, kind: OperationKind) {
        let counter = match kind {
            OperationKind::Start => &mut self.start_count,
            OperationKind::HoistUp => &mut self.hoist_up_count,
            OperationKind::HoistDown => &mut self.hoist_down_count,
            OperationKind::CtForward => &mut self.ct_forward_count,
            OperationKind::CtBackward => &mut self.ct_backward_count,
            OperationKind::LtForward => &mut self.lt_forward_count,
            OperationKind::LtBackward => &mut self.lt_backward_count,
        };
        *counter += 1;
        self.recompute_total();
    }

    /// Sum of the six movement counters.
    pub fn movement_sum(&self) -> u64 {
        self.hoist_up_count
            + self.hoist_down_count
            + self.ct_forward_count
            + self.ct_backward_count
            + self.lt_forward_count
            + self.lt_backward_count
    }

    pub fn recompute_total(&mut self) {
        self.total_operation_count = self.movement_sum();
    }
}

// ---------------------------------------------------------------------------
// AssetState
// ---------------------------------------------------------------------------

/// Latest known state of one measurement point of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetState {
    pub point_id: String,
    pub service_name: String,
    pub value: f64,
    pub value_type: ValueType,
    pub unit: String,
    pub is_io_governed: bool,
    /// Present iff `is_io_governed`.
    pub counters: Option<OperationCounters>,
    pub last_operation_start: Option<Timestamp>,
    pub last_operation_end: Option<Timestamp>,
    /// Timestamp carried by the most recent reading.
    pub timestamp: Timestamp,
    /// When the processor last touched this record.
    pub updated_at: Timestamp,
}

impl AssetState {
    /// Create the record for a point seen for the first time.
    ///
    /// Classification runs once here; later readings only update values.
    pub fn first_sighting(
        service_name: &str,
        reading: &Reading,
        is_io_governed: bool,
        now: Timestamp,
    ) -> Self {
        let classification = classify(&reading.point_id);
        Self {
            point_id: reading.point_id.clone(),
            service_name: service_name.to_string(),
            value: reading.value,
            value_type: classification.value_type,
            unit: classification.unit.to_string(),
            is_io_governed,
            counters: is_io_governed.then(OperationCounters::default),
            last_operation_start: None,
            last_operation_end: None,
            timestamp: reading.timestamp,
            updated_at: now,
        }
    }

    /// Whether readings for this point feed the operation counter.
    pub fn counts_operations(&self) -> bool {
        self.is_io_governed && self.value_type == ValueType::Digital
    }

    /// Record a new reading's value. Counters are untouched.
    pub fn record(&mut self, reading: &Reading, now: Timestamp) {
        self.value = reading.value;
        self.timestamp = reading.timestamp;
        self.updated_at = now;
    }

    /// Apply the counter changes computed for the latest transition.
    pub fn apply_delta(&mut self, delta: &CounterDelta) {
        if let Some(start) = delta.operation_start {
            self.last_operation_start = Some(start);
        }
        if let Some(end) = delta.operation_end {
            self.last_operation_end = Some(end);
        }

        if let Some(counters) = self.counters.as_mut() {
            if let Some(kind) = delta.increment {
                counters.increment(kind);
            }
            if let Some(secs) = delta.duration_secs {
                counters.total_operation_duration += secs;
            }
            counters.recompute_total();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
