// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 with milliseconds and a `Z` suffix.
pub fn format_utc_rfc3339_millis(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Seconds between two instants, rounded to 2 decimals and never negative.
pub fn elapsed_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = end.signed_duration_since(start).num_milliseconds().max(0);
    crate::services::distance::round2(millis as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_millis() {
        let date = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 5).unwrap();
        assert_eq!(format_utc_rfc3339_millis(date), "2024-01-15T10:00:05.000Z");
    }

    #[test]
    fn test_elapsed_seconds() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let end = start + chrono::Duration::milliseconds(5_004);
        assert_eq!(elapsed_seconds(start, end), 5.0);

        let end = start + chrono::Duration::milliseconds(61_237);
        assert_eq!(elapsed_seconds(start, end), 61.24);
    }

    #[test]
    fn test_elapsed_seconds_clamps_clock_skew() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let earlier = start - chrono::Duration::seconds(3);
        assert_eq!(elapsed_seconds(start, earlier), 0.0);
    }
}
