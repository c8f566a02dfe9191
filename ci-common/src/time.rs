//! Timestamp utilities
//!
//! All persisted timestamps are UTC without a time zone.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Current UTC time as stored in the database
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// `YYYYMMDDHHMMSS` stamp used in generated response file names
pub fn file_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H%M%S").to_string()
}

/// Parse an ISO-8601 timestamp the way clients send it
///
/// Accepts RFC 3339 (with offset, normalised to UTC), naive date-times with a
/// `T` or space separator and optional fractional seconds, and bare dates.
pub fn parse_iso8601(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// ISO-8601 rendering used in JSON responses
pub fn to_iso8601(at: &NaiveDateTime) -> String {
    at.format("%Y-%m-%dT%H:%M:%S").to_string()
}
