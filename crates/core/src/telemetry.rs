//! Typed telemetry readings and ingestion payload validation.
//!
//! Devices post loosely-shaped JSON. [`parse_payload`] turns it into
//! [`ServiceBatch`]es at the boundary: structurally broken payloads are
//! rejected as a whole, individual bad readings are dropped and reported,
//! and nothing is coerced into a number it was not sent as.

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// A single measurement. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub point_id: String,
    pub value: f64,
    pub timestamp: Timestamp,
}

impl Reading {
    pub fn new(point_id: impl Into<String>, value: f64, timestamp: Timestamp) -> Self {
        Self {
            point_id: point_id.into(),
            value,
            timestamp,
        }
    }

    /// Check the invariants every reading must satisfy before it may touch
    /// asset state: a non-empty identifier and a finite value.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.point_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "Reading point id must not be empty".to_string(),
            ));
        }
        if !self.value.is_finite() {
            return Err(CoreError::Validation(format!(
                "Reading {} has a non-finite value",
                self.point_id
            )));
        }
        Ok(())
    }
}

/// All readings one service reported in a single post, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceBatch {
    pub service_name: String,
    pub readings: Vec<Reading>,
}

impl ServiceBatch {
    pub fn new(service_name: impl Into<String>, readings: Vec<Reading>) -> Self {
        Self {
            service_name: service_name.into(),
            readings,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Accepted top-level payload shapes: a bare array of services, or an
/// object wrapping them under `services`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePayload {
    List(Vec<serde_json::Value>),
    Wrapped { services: Vec<serde_json::Value> },
}

#[derive(Debug, Deserialize, Validate)]
struct WireService {
    #[validate(length(min = 1, max = 100))]
    name: String,
    assets: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize, Validate)]
struct WireAsset {
    #[validate(length(min = 1, max = 100))]
    id: String,
    value: f64,
    timestamp: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse results
// ---------------------------------------------------------------------------

/// A reading entry that was dropped at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedReading {
    pub service_name: String,
    /// Position of the entry within the service's `assets` array.
    pub index: usize,
    pub reason: String,
}

/// Outcome of validating one ingestion payload.
#[derive(Debug, Default)]
pub struct ParsedPayload {
    /// Batches with at least one valid reading, in payload order.
    pub batches: Vec<ServiceBatch>,
    pub received_services: usize,
    pub received_assets: usize,
    pub rejected: Vec<RejectedReading>,
    /// Services that were dropped because none of their readings survived.
    pub dropped_services: Vec<String>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a raw JSON body into validated service batches.
///
/// `received_at` stamps readings that arrive without a timestamp.
pub fn parse_payload(body: &[u8], received_at: Timestamp) -> Result<ParsedPayload, CoreError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| CoreError::MalformedBatch(format!("Invalid JSON: {e}")))?;
    parse_value(value, received_at)
}

/// Same as [`parse_payload`] for an already-decoded JSON value.
pub fn parse_value(
    value: serde_json::Value,
    received_at: Timestamp,
) -> Result<ParsedPayload, CoreError> {
    let services = match serde_json::from_value::<WirePayload>(value) {
        Ok(WirePayload::List(services)) | Ok(WirePayload::Wrapped { services }) => services,
        Err(_) => {
            return Err(CoreError::MalformedBatch(
                "Expected an array of services or an object with a `services` array".to_string(),
            ))
        }
    };

    let mut parsed = ParsedPayload {
        received_services: services.len(),
        ..ParsedPayload::default()
    };

    for (service_index, raw) in services.into_iter().enumerate() {
        let service: WireService = serde_json::from_value(raw).map_err(|e| {
            CoreError::MalformedBatch(format!("Service at index {service_index}: {e}"))
        })?;
        service.validate().map_err(|e| {
            CoreError::MalformedBatch(format!("Service at index {service_index}: {e}"))
        })?;

        parsed.received_assets += service.assets.len();

        let mut readings = Vec::with_capacity(service.assets.len());
        for (index, raw_asset) in service.assets.into_iter().enumerate() {
            match parse_asset(raw_asset, received_at) {
                Ok(reading) => readings.push(reading),
                Err(reason) => {
                    tracing::warn!(
                        service = %service.name,
                        index,
                        reason = %reason,
                        "Rejected reading at ingestion boundary"
                    );
                    parsed.rejected.push(RejectedReading {
                        service_name: service.name.clone(),
                        index,
                        reason,
                    });
                }
            }
        }

        if readings.is_empty() {
            tracing::info!(
                service = %service.name,
                "Dropping service batch with no valid readings"
            );
            parsed.dropped_services.push(service.name);
        } else {
            parsed.batches.push(ServiceBatch::new(service.name, readings));
        }
    }

    Ok(parsed)
}

fn parse_asset(raw: serde_json::Value, received_at: Timestamp) -> Result<Reading, String> {
    let asset: WireAsset = serde_json::from_value(raw).map_err(|e| e.to_string())?;
    asset.validate().map_err(|e| e.to_string())?;

    let timestamp = match asset.timestamp.as_deref() {
        None => received_at,
        Some(raw) => parse_timestamp(raw).ok_or_else(|| format!("Invalid timestamp '{raw}'"))?,
    };

    let reading = Reading::new(asset.id, asset.value, timestamp);
    reading.validate().map_err(|e| e.to_string())?;
    Ok(reading)
}

/// Parse an RFC 3339 timestamp. Offset-less timestamps are taken as UTC,
/// which is what the field devices send.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
