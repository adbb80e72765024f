//! Timestamp helpers for TEXT columns.
//!
//! Timestamps are stored as RFC 3339 in UTC with nanosecond precision so that
//! string comparison orders them chronologically and a row's `updated_at`
//! changes on every local write.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp for storage.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn format_optional(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(format_timestamp)
}

/// Parse a stored timestamp, accepting any RFC 3339 offset.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::nanoseconds(1);
        let (fa, fb) = (format_timestamp(a), format_timestamp(b));
        assert_eq!(fa.len(), fb.len());
        assert!(fa < fb);
        assert!(fa.ends_with('Z'));
    }

    #[test]
    fn test_parse_accepts_offsets() {
        let parsed = parse_timestamp("2024-01-02T05:04:05+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
