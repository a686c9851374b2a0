use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire protocol a device speaks, as decided by the sniffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Teltonika,
    Tfms90,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Teltonika => "teltonika",
            Protocol::Tfms90 => "tfms90",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar or byte-string value carried in [`TelemetryRecord::io_elements`].
///
/// `Bytes` is hex-encoded when serialized, so the JSON column never carries
/// raw binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IoValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(#[serde(serialize_with = "serialize_bytes_as_hex", deserialize_with = "deserialize_bytes_from_hex")] Vec<u8>),
}

fn serialize_bytes_as_hex<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let hex = bytes.iter().map(|b| format!("{:02x}", b)).collect::<String>();
    serializer.serialize_str(&hex)
}

fn deserialize_bytes_from_hex<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let hex = String::deserialize(deserializer)?;
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(serde::de::Error::custom))
        .collect()
}

impl IoValue {
    /// Returns the value as `f64` if it is numeric (integer, float, or bool-as-0/1).
    ///
    /// Used for promotions like fuel level or battery voltage where the
    /// source type (AVL fixed-width int vs. a TFMS90 decimal string) varies
    /// by protocol but the destination field is always a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            IoValue::Integer(v) => Some(*v as f64),
            IoValue::Float(v) => Some(*v),
            IoValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            IoValue::Text(_) | IoValue::Bytes(_) => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            IoValue::Integer(v) => *v != 0,
            IoValue::Float(v) => *v != 0.0,
            IoValue::Bool(v) => *v,
            IoValue::Text(v) => !v.is_empty() && v != "0",
            IoValue::Bytes(v) => v.iter().any(|b| *b != 0),
        }
    }
}

/// The uniform telemetry record produced by every protocol parser.
///
/// See `spec.md` §3 for the field-level invariants this type is required to
/// uphold; parsers are responsible for enforcing them before returning a
/// record (the handler never re-validates).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub device_id: String,
    pub protocol: Protocol,
    pub message_type: String,
    pub timestamp: DateTime<Utc>,

    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<u16>,
    pub satellites: Option<u32>,
    pub hdop: Option<f64>,

    pub odometer: Option<f64>,
    pub engine_hours: Option<f64>,
    pub fuel_level: Option<f64>,
    pub battery_voltage: Option<f64>,
    pub ignition: Option<bool>,
    pub moving: Option<bool>,

    pub io_elements: BTreeMap<String, IoValue>,
    pub raw_data: Option<String>,
}

impl TelemetryRecord {
    /// Clamps a heading value per the §3 invariant: values outside `[0, 360]`
    /// become `None` rather than being retained or rejecting the whole record.
    pub fn normalize_heading(raw: u16) -> Option<u16> {
        if raw <= 360 {
            Some(raw)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_above_360_is_dropped() {
        assert_eq!(TelemetryRecord::normalize_heading(400), None);
        assert_eq!(TelemetryRecord::normalize_heading(360), Some(360));
        assert_eq!(TelemetryRecord::normalize_heading(0), Some(0));
    }

    #[test]
    fn bytes_serialize_as_hex_json_string() {
        let value = IoValue::Bytes(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"deadbeef\"");
    }

    #[test]
    fn protocol_display_matches_wire_name() {
        assert_eq!(Protocol::Teltonika.to_string(), "teltonika");
        assert_eq!(Protocol::Tfms90.to_string(), "tfms90");
    }
}
