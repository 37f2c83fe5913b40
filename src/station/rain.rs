//! Rain count conversion.
//!
//! The station reports rain values as raw bucket-tip counts. The physical
//! size of the collector bucket is reported separately as the `rain_size`
//! scale code, so counts must be multiplied by a per-code factor to get
//! inches.

use crate::station::data::ConditionRecord;
use serde_json::Value;
use tracing::warn;

/// Record fields that carry rain counts and need scale conversion.
///
/// `rain_storm_start_at` is deliberately not here: it is a timestamp that
/// travels with the rain fields but is never a count.
pub const RAIN_COUNT_FIELDS: [&str; 8] = [
    "rain_rate_last",
    "rain_15_min",
    "rain_60_min",
    "rain_24_hr",
    "rain_storm",
    "rainfall_daily",
    "rainfall_monthly",
    "rainfall_year",
];

/// Whether a field name carries a raw rain count.
pub fn is_rain_count_field(field: &str) -> bool {
    RAIN_COUNT_FIELDS.contains(&field)
}

/// Convert a raw rain count to inches using the `rain_size` scale code.
///
/// Returns `None` when either input is missing. An unrecognized scale code
/// logs a warning and returns the raw count unchanged rather than
/// fabricating a value.
pub fn convert_rain_value(count: Option<f64>, rain_size: Option<u8>) -> Option<f64> {
    let count = count?;
    let size = rain_size?;

    let factor = match size {
        1 => 0.01,        // 0.01 in per count
        2 => 0.2 / 25.4,  // 0.2 mm per count
        3 => 0.1 / 25.4,  // 0.1 mm per count
        4 => 0.001,       // 0.001 in per count
        other => {
            warn!("Unknown rain_size value: {}, returning raw count", other);
            return Some(count);
        }
    };

    Some(count * factor)
}

/// Convert every rain-count field of a condition record to inches.
///
/// Returns the record unchanged when it lacks a scale code. Fields that are
/// null or absent are left untouched, as are all non-rain fields and the
/// `rain_size` code itself. The input is never mutated.
pub fn convert_rain_fields(record: &ConditionRecord) -> ConditionRecord {
    let Some(size) = record.rain_size() else {
        return record.clone();
    };

    let mut converted = record.clone();
    for field in RAIN_COUNT_FIELDS {
        if let Some(raw) = converted.number(field) {
            if let Some(inches) = convert_rain_value(Some(raw), Some(size)) {
                converted.insert(field, Value::from(inches));
            }
        }
    }

    converted
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> ConditionRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_convert_known_scale_codes() {
        assert_eq!(convert_rain_value(Some(14.0), Some(1)), Some(0.14));
        assert_eq!(convert_rain_value(Some(1400.0), Some(1)), Some(14.0));
        assert_eq!(convert_rain_value(Some(140.0), Some(4)), Some(0.14));

        let metric = convert_rain_value(Some(10.0), Some(2)).unwrap();
        assert!((metric - 0.0787402).abs() < 1e-4);
        let small = convert_rain_value(Some(10.0), Some(3)).unwrap();
        assert!((small - 0.0394).abs() < 1e-4);
    }

    #[test]
    fn test_convert_is_linear() {
        for code in 1..=4u8 {
            let single = convert_rain_value(Some(7.0), Some(code)).unwrap();
            let doubled = convert_rain_value(Some(14.0), Some(code)).unwrap();
            assert!((doubled - 2.0 * single).abs() < 1e-12, "code {}", code);
        }
    }

    #[test]
    fn test_convert_missing_inputs() {
        assert_eq!(convert_rain_value(None, Some(1)), None);
        assert_eq!(convert_rain_value(Some(10.0), None), None);
        assert_eq!(convert_rain_value(None, None), None);
    }

    #[test]
    fn test_convert_unknown_code_returns_raw() {
        assert_eq!(convert_rain_value(Some(10.0), Some(99)), Some(10.0));
    }

    #[test]
    fn test_convert_fields_all_rain_fields() {
        let rec = record(json!({
            "lsid": 48308,
            "rain_size": 1,
            "rain_rate_last": 0,
            "rain_15_min": 2,
            "rain_60_min": 5,
            "rain_24_hr": 14,
            "rain_storm": 20,
            "rainfall_daily": 14,
            "rainfall_monthly": 100,
            "rainfall_year": 500
        }));

        let converted = convert_rain_fields(&rec);

        assert_eq!(converted.number("rain_rate_last"), Some(0.0));
        assert_eq!(converted.number("rain_15_min"), Some(0.02));
        assert_eq!(converted.number("rain_60_min"), Some(0.05));
        assert_eq!(converted.number("rain_24_hr"), Some(0.14));
        assert_eq!(converted.number("rain_storm"), Some(0.20));
        assert_eq!(converted.number("rainfall_daily"), Some(0.14));
        assert_eq!(converted.number("rainfall_monthly"), Some(1.0));
        assert_eq!(converted.number("rainfall_year"), Some(5.0));
    }

    #[test]
    fn test_convert_fields_preserves_other_fields() {
        let rec = record(json!({
            "lsid": 48308,
            "rain_size": 1,
            "rain_24_hr": 14,
            "temp": 72.5,
            "hum": 65
        }));

        let converted = convert_rain_fields(&rec);

        assert_eq!(converted.number("lsid"), Some(48308.0));
        assert_eq!(converted.rain_size(), Some(1));
        assert_eq!(converted.number("temp"), Some(72.5));
        assert_eq!(converted.number("hum"), Some(65.0));
    }

    #[test]
    fn test_convert_fields_without_scale_code_is_identity() {
        let rec = record(json!({"rain_24_hr": 14, "temp": 70.0}));
        let converted = convert_rain_fields(&rec);
        assert_eq!(converted, rec);
    }

    #[test]
    fn test_convert_fields_skips_null_values() {
        let rec = record(json!({"rain_size": 1, "rain_24_hr": null, "rain_60_min": 5}));
        let converted = convert_rain_fields(&rec);

        assert!(converted.get("rain_24_hr").unwrap().is_null());
        assert_eq!(converted.number("rain_60_min"), Some(0.05));
    }

    #[test]
    fn test_convert_fields_does_not_mutate_input() {
        let rec = record(json!({"rain_size": 1, "rain_24_hr": 14}));
        let before = rec.clone();
        let _ = convert_rain_fields(&rec);
        assert_eq!(rec, before);
    }
}
