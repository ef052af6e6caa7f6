//! Offset-aware timestamp parsing.
//!
//! Every `created_at`/`posted_at`/`started_at` in the engine is supplied by
//! the caller; nothing in the core reads a clock. Naive timestamps (no UTC
//! offset) are rejected outright.

use chrono::{DateTime, FixedOffset};

use crate::errors::CoreError;

/// Parse an ISO-8601 / RFC 3339 timestamp with an explicit offset.
pub fn parse_offset_datetime(raw: &str) -> Result<DateTime<FixedOffset>, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidTimestamp(raw.to_string()));
    }
    DateTime::parse_from_rfc3339(trimmed).map_err(|_| {
        // Distinguish "parseable but naive" for the caller-facing error code.
        if looks_naive(trimmed) {
            CoreError::NaiveTimestamp(raw.to_string())
        } else {
            CoreError::InvalidTimestamp(raw.to_string())
        }
    })
}

/// Render a timestamp back to RFC 3339, preserving the parsed offset.
pub fn to_iso(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339()
}

/// Whole-day difference between two timestamps, absolute.
pub fn days_diff(a: &DateTime<FixedOffset>, b: &DateTime<FixedOffset>) -> i64 {
    (*a - *b).num_days().abs()
}

fn looks_naive(s: &str) -> bool {
    // A timestamp that has a date-time shape but no Z/offset suffix.
    let has_t = s.contains('T') || s.contains(' ');
    let tail = &s[s.find('T').map(|i| i + 1).unwrap_or(0)..];
    has_t && !tail.contains('Z') && !tail.contains('+') && !tail.contains('-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offset_and_z() {
        assert!(parse_offset_datetime("2026-01-01T00:00:00Z").is_ok());
        assert!(parse_offset_datetime("2026-01-01T12:30:00+02:00").is_ok());
    }

    #[test]
    fn rejects_naive_with_dedicated_kind() {
        let err = parse_offset_datetime("2026-01-01T00:00:00").unwrap_err();
        assert!(matches!(err, CoreError::NaiveTimestamp(_)));
        assert!(parse_offset_datetime("not-a-date").is_err());
        assert!(parse_offset_datetime("").is_err());
    }

    #[test]
    fn day_difference_is_absolute_whole_days() {
        let a = parse_offset_datetime("2026-01-01T00:00:00Z").unwrap();
        let b = parse_offset_datetime("2026-01-03T12:00:00Z").unwrap();
        assert_eq!(days_diff(&a, &b), 2);
        assert_eq!(days_diff(&b, &a), 2);
    }

    #[test]
    fn iso_round_trip_is_stable() {
        let raw = "2026-01-01T12:30:00+02:00";
        let dt = parse_offset_datetime(raw).unwrap();
        assert_eq!(to_iso(&dt), raw);
    }
}
