//! Cranewatch domain core.
//!
//! Pure domain logic with no runtime or I/O dependencies. Both the
//! ingestion pipeline and the HTTP boundary build on these types:
//!
//! - [`telemetry`]: typed readings and batches, plus validation of raw
//!   ingestion payloads.
//! - [`classifier`]: measurement point type/unit inference.
//! - [`asset`]: per-point state and operation counters.
//! - [`operations`]: edge-triggered operation counting.
//! - [`snapshot`]: the immutable aggregate view handed to readers.

pub mod asset;
pub mod classifier;
pub mod error;
pub mod operations;
pub mod snapshot;
pub mod telemetry;
pub mod types;
