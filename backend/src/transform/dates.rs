//! Parser for the registry's `/Date(<epoch-ms>)/` date encoding.

use chrono::{DateTime, Utc};
use serde_json::Value;

const DATE_PREFIX: &str = "/Date(";
const DATE_SUFFIX: &str = ")/";

/// Parse a `/Date(<ms>)/` string into a UTC timestamp.
///
/// The payload is milliseconds since the Unix epoch and may be negative.
/// Anything else yields `None`.
pub fn parse_registry_date(raw: &str) -> Option<DateTime<Utc>> {
    let payload = raw.trim().strip_prefix(DATE_PREFIX)?.strip_suffix(DATE_SUFFIX)?;
    let millis: i64 = payload.parse().ok()?;
    DateTime::from_timestamp_millis(millis)
}

/// Encode a timestamp as `/Date(<ms>)/`.
pub fn format_registry_date(dt: &DateTime<Utc>) -> String {
    format!("{}{}{}", DATE_PREFIX, dt.timestamp_millis(), DATE_SUFFIX)
}

/// Coerce a JSON value into a timestamp.
///
/// Only strings in the registry encoding are dates; every other value,
/// including ISO 8601 text, is missing.
pub fn coerce_date(value: Option<&Value>) -> Option<DateTime<Utc>> {
    parse_registry_date(value?.as_str()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_parse_registry_date() {
        let parsed = parse_registry_date("/Date(1704067200000)/").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_negative_epoch() {
        let parsed = parse_registry_date("/Date(-86400000)/").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(1969, 12, 31, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_malformed_dates_are_missing() {
        assert!(parse_registry_date("/Date(abc)/").is_none());
        assert!(parse_registry_date("/Date(123").is_none());
        assert!(parse_registry_date("1704067200000").is_none());
        assert!(parse_registry_date("").is_none());
        assert!(parse_registry_date("/Date()/").is_none());
    }

    #[test]
    fn test_coerce_non_string_is_missing() {
        assert!(coerce_date(None).is_none());
        assert!(coerce_date(Some(&Value::Null)).is_none());
        assert!(coerce_date(Some(&json!(1704067200000_i64))).is_none());
    }

    #[test]
    fn test_coerce_iso_text_is_missing() {
        assert!(coerce_date(Some(&json!("2024-01-01T00:00:00Z"))).is_none());
        assert!(coerce_date(Some(&json!("2024-01-01"))).is_none());
        assert!(coerce_date(Some(&json!("/Date(1704067200000)/"))).is_some());
    }

    #[test]
    fn test_format_round_trips_through_parser() {
        let dt = Utc.with_ymd_and_hms(1969, 12, 31, 0, 0, 0).unwrap();
        let encoded = format_registry_date(&dt);
        assert_eq!(encoded, "/Date(-86400000)/");
        assert_eq!(parse_registry_date(&encoded), Some(dt));
    }
}
