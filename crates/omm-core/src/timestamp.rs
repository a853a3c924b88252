//! Conversion of upstream timestamps into canonical UTC strings.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde_json::Value as JsonValue;

const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_canonical(at: DateTime<Utc>) -> String {
    at.format(CANONICAL_FORMAT).to_string()
}

/// Parses a string produced by [`format_canonical`] (or any RFC 3339 value).
pub fn parse_canonical(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Converts an upstream timestamp field into `YYYY-MM-DDTHH:MM:SS.000Z`.
/// Sub-second precision is truncated, so the millisecond field is always zero.
///
/// Accepts epoch seconds (JSON number or numeric string) and ISO-8601 strings
/// carrying a `T` separator. Absent, zero, negative and unparseable values all
/// come back as `None`.
pub fn canonical_timestamp(raw: Option<&JsonValue>) -> Option<String> {
    match raw? {
        JsonValue::Number(number) => {
            let secs = match number.as_i64() {
                Some(secs) => secs,
                None => number.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)?,
            };
            from_epoch_seconds(secs)
        }
        JsonValue::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            if text.contains('T') {
                return parse_canonical(text)
                    .and_then(|at| at.with_nanosecond(0))
                    .map(format_canonical);
            }
            text.parse::<i64>().ok().and_then(from_epoch_seconds)
        }
        _ => None,
    }
}

fn from_epoch_seconds(secs: i64) -> Option<String> {
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0).map(format_canonical)
}
