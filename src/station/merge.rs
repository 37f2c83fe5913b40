//! Field-level merge of the HTTP base snapshot and the UDP overlay.
//!
//! The HTTP channel delivers a complete reading once a minute; the UDP
//! channel pushes wind and rain updates every few seconds, but only for a
//! fixed subset of fields. The merge deep-copies the base and overwrites
//! that subset wherever the overlay actually carries a value: an absent
//! overlay field preserves the base value, while an explicit `null`
//! overwrites it.

use crate::station::data::{ConditionRecord, StationReading};
use crate::station::rain::{convert_rain_value, is_rain_count_field};
use serde_json::Value;

/// Fields the fast channel is allowed to overwrite in a merged record.
pub const OVERLAY_FIELDS: [&str; 11] = [
    "wind_speed_last",
    "wind_dir_last",
    "rain_rate_last",
    "rain_15_min",
    "rain_60_min",
    "rain_24_hr",
    "rain_storm",
    "rain_storm_start_at",
    "rainfall_daily",
    "rainfall_monthly",
    "rainfall_year",
];

/// Merge the base snapshot with the overlay into a fresh reading.
///
/// Pure and idempotent: neither input is mutated, and the same inputs always
/// produce the same output. With no base yet, the overlay stands alone; with
/// no overlay, the base passes through.
pub fn merge(
    base: Option<&StationReading>,
    overlay: Option<&StationReading>,
) -> Option<StationReading> {
    match (base, overlay) {
        (None, None) => None,
        (Some(b), None) => Some(b.clone()),
        (None, Some(o)) => Some(o.clone()),
        (Some(b), Some(o)) => Some(apply_overlay(b, o)),
    }
}

fn apply_overlay(base: &StationReading, overlay: &StationReading) -> StationReading {
    let mut merged = base.clone();

    for (index, patch) in overlay.conditions.iter().enumerate() {
        let Some(target) = target_index(&merged, patch, index) else {
            continue;
        };
        let record = &mut merged.conditions[target];

        // Overlay rain values are raw counts; the base record's values were
        // already converted at HTTP ingestion. Convert before overwriting,
        // using the overlay's own scale code when it carries one and the
        // base record's last-known code otherwise.
        let scale = patch.rain_size().or_else(|| record.rain_size());

        for field in OVERLAY_FIELDS {
            let Some(value) = patch.get(field) else {
                continue;
            };
            record.insert(field, overlay_value(field, value, scale));
        }
    }

    merged
}

fn overlay_value(field: &str, value: &Value, scale: Option<u8>) -> Value {
    if !is_rain_count_field(field) {
        return value.clone();
    }
    match value.as_f64() {
        Some(count) => convert_rain_value(Some(count), scale)
            .map(Value::from)
            .unwrap_or_else(|| value.clone()),
        None => value.clone(),
    }
}

/// Match an overlay record to a base record.
///
/// Matches by `lsid` when the overlay record carries one and the base has
/// identified records; falls back to list position only when identifiers
/// are unavailable on either side. An identified overlay record with no
/// identified counterpart is skipped rather than guessed at.
fn target_index(merged: &StationReading, patch: &ConditionRecord, index: usize) -> Option<usize> {
    if let Some(id) = patch.lsid() {
        if let Some(found) = merged
            .conditions
            .iter()
            .position(|r| r.lsid() == Some(id))
        {
            return Some(found);
        }
        if merged.conditions.iter().any(|r| r.lsid().is_some()) {
            return None;
        }
    }
    (index < merged.conditions.len()).then_some(index)
}
