//! Timestamp helpers.

use chrono::{DateTime, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp as an ISO 8601 string with microsecond precision:
/// `YYYY-MM-DDTHH:MM:SS.ffffff+00:00`.
#[must_use]
pub fn format_timestamp(dt: &Timestamp) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Returns the current UTC time as an ISO 8601 formatted string.
#[must_use]
pub fn iso_timestamp() -> String {
    format_timestamp(&now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_timestamp() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 5).unwrap();
        assert_eq!(format_timestamp(&dt), "2024-03-09T14:30:05.000000+00:00");
    }

    #[test]
    fn test_iso_timestamp_round_trips_through_chrono() {
        let ts = iso_timestamp();
        assert!(ts.ends_with("+00:00"));
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
