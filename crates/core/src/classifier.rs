//! Measurement point classification.
//!
//! Field devices do not send type metadata, so the semantic type and unit
//! of a point are inferred from its identifier. Both lookups are ordered
//! rule tables matched case-insensitively by substring; the first rule
//! with a matching keyword wins.

use serde::{Deserialize, Serialize};

/// Semantic type of a measurement point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Digital,
    Analog,
    Voltage,
    Current,
    Power,
    Frequency,
    Load,
}

/// Result of classifying a point identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub value_type: ValueType,
    /// Empty when no unit could be inferred.
    pub unit: &'static str,
}

// ---------------------------------------------------------------------------
// Rule tables
// ---------------------------------------------------------------------------

/// Type rules in priority order. Anything unmatched is [`ValueType::Analog`].
pub const TYPE_RULES: &[(ValueType, &[&str])] = &[
    (ValueType::Voltage, &["voltage", "volt"]),
    (ValueType::Current, &["current", "ampere"]),
    (ValueType::Power, &["power", "watt", "kw"]),
    (ValueType::Frequency, &["frequency", "freq", "hz"]),
    (ValueType::Load, &["load", "weight", "tonnage"]),
    (
        ValueType::Digital,
        &[
            "hoist_up",
            "hoist_down",
            "ct_left",
            "ct_right",
            "lt_forward",
            "lt_reverse",
            "start",
            "stop",
            "status",
            "limit",
            "alarm",
            "di_",
        ],
    ),
];

/// Unit rules in priority order. Anything unmatched has no unit.
pub const UNIT_RULES: &[(&str, &[&str])] = &[
    ("V", &["voltage", "volt"]),
    ("A", &["current", "ampere"]),
    ("kW", &["power", "watt", "kw"]),
    ("Hz", &["frequency", "freq", "hz"]),
    ("kg", &["load", "weight", "tonnage"]),
    ("°C", &["temperature", "temp"]),
    ("rpm", &["speed", "rpm"]),
];

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Infer the semantic type and unit of a measurement point.
///
/// Deterministic and total: unknown identifiers are analog with no unit.
pub fn classify(point_id: &str) -> Classification {
    let id = point_id.to_ascii_lowercase();

    let value_type = TYPE_RULES
        .iter()
        .find(|(_, keywords)| contains_any(&id, keywords))
        .map(|(value_type, _)| *value_type)
        .unwrap_or(ValueType::Analog);

    let unit = UNIT_RULES
        .iter()
        .find(|(_, keywords)| contains_any(&id, keywords))
        .map(|(unit, _)| *unit)
        .unwrap_or("");

    Classification { value_type, unit }
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| haystack.contains(k))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn electrical_points() {
        assert_eq!(
            classify("Voltage_L1"),
            Classification {
                value_type: ValueType::Voltage,
                unit: "V",
            }
        );
        assert_eq!(
            classify("Hoist_Motor_Current"),
            Classification {
                value_type: ValueType::Current,
                unit: "A",
            }
        );
        assert_eq!(
            classify("Active_Power"),
            Classification {
                value_type: ValueType::Power,
                unit: "kW",
            }
        );
        assert_eq!(
            classify("Supply_Frequency"),
            Classification {
                value_type: ValueType::Frequency,
                unit: "Hz",
            }
        );
    }

    #[test]
    fn load_cell_point() {
        assert_eq!(
            classify("Load"),
            Classification {
                value_type: ValueType::Load,
                unit: "kg",
            }
        );
    }

    #[test]
    fn movement_controls_are_digital_without_unit() {
        let controls = [
            "Hoist_Up",
            "Hoist_Down",
            "Ct_Left",
            "Ct_Right",
            "Lt_Forward",
            "Lt_Reverse",
            "Start",
        ];
        for id in controls {
            let c = classify(id);
            assert_eq!(c.value_type, ValueType::Digital, "{id}");
            assert_eq!(c.unit, "", "{id}");
        }
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(classify("HOIST_UP").value_type, ValueType::Digital);
        assert_eq!(classify("voltage").value_type, ValueType::Voltage);
    }

    #[test]
    fn table_order_breaks_ties() {
        // Both "current" and "start" match; current comes first.
        assert_eq!(classify("Start_Current").value_type, ValueType::Current);
        // Both "voltage" and "load" match; voltage comes first.
        assert_eq!(classify("Load_Voltage").value_type, ValueType::Voltage);
    }

    #[test]
    fn unknown_points_default_to_analog() {
        let c = classify("Cabin_Temperature");
        assert_eq!(c.value_type, ValueType::Analog);
        assert_eq!(c.unit, "°C");

        assert_eq!(
            classify("xyz"),
            Classification {
                value_type: ValueType::Analog,
                unit: "",
            }
        );
    }
}
