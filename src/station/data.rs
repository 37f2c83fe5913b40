//! Data structures for weather station readings.
//!
//! Condition records are kept as raw JSON maps rather than typed structs:
//! the UDP channel sends partial records where a missing field means "no new
//! information" while an explicit `null` is a real reading. A map preserves
//! that distinction exactly; a typed struct with `Option` fields would not.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One sensor transmitter's record within a station reading.
///
/// Fields are named numeric-or-null values as reported by the device, for
/// example `wind_speed_last`, `rain_24_hr`, `temp`, `hum`. The `lsid` field
/// (logical sensor id) identifies the transmitter across readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionRecord(pub Map<String, Value>);

impl ConditionRecord {
    /// Get a raw field value. `None` means the field is absent, which is
    /// distinct from `Some(&Value::Null)`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Get a field as a number, treating null and absent alike.
    pub fn number(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(Value::as_f64)
    }

    /// The logical sensor id carried by most device records.
    pub fn lsid(&self) -> Option<i64> {
        self.0.get("lsid").and_then(Value::as_i64)
    }

    /// The rain collector scale code (1-4) controlling rain-count conversion.
    pub fn rain_size(&self) -> Option<u8> {
        self.0
            .get("rain_size")
            .and_then(Value::as_u64)
            .map(|v| v as u8)
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }
}

/// A full or partial reading from the station.
///
/// Both channels use this shape: the HTTP snapshot carries complete records,
/// the UDP broadcast a subset of fields per record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationReading {
    /// Device id, when the payload carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    /// Device-reported timestamp (Unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    /// Per-transmitter condition records
    #[serde(default)]
    pub conditions: Vec<ConditionRecord>,
}

/// Unwrap the device's HTTP response envelope.
///
/// The device wraps HTTP bodies as `{"data": {...}, "error": null}` but the
/// UDP broadcast sends the reading bare; some firmware versions do the same
/// over HTTP. Returns the inner `data` object when present and non-null,
/// otherwise the value itself.
pub fn unwrap_device_payload(value: &Value) -> &Value {
    match value.get("data") {
        Some(data) if !data.is_null() => data,
        _ => value,
    }
}

/// Which channel produced a published state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Http,
    Udp,
}

/// The message pushed to every subscriber on each merge cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// RFC3339 timestamp of the merge, assigned at publish time
    pub timestamp: String,
    /// Human-readable origin, e.g. `192.168.1.40:80 (HTTP)`
    pub source: String,
    /// The merged station state
    pub data: StationReading,
    /// Channel tag consumed by the dashboard
    #[serde(rename = "dataSource")]
    pub data_source: DataSource,
}

impl Envelope {
    /// Create an envelope stamped with the current time.
    pub fn new(source: impl Into<String>, data: StationReading, data_source: DataSource) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            source: source.into(),
            data,
            data_source,
        }
    }
}
