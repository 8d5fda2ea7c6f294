//! Timestamp formatting and parsing shared by the store, normalizers and CLI.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Format a timestamp for storage.
///
/// Always UTC, millisecond precision, `Z` suffix. The fixed width makes
/// string comparison in SQL equal to chronological comparison.
pub fn storage_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp reported by a provider or read back from storage.
///
/// Accepts RFC 3339 with any offset (normalized to UTC), and the
/// `YYYY-MM-DD HH:MM:SS UTC` / `YYYY-MM-DD HH:MM:SS` forms GitLab
/// uses in some webhook payloads.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z") {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = s.strip_suffix(" UTC").unwrap_or(s);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Format a timestamp as relative time (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 0 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        ts.format("%b %d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_storage_timestamp_is_fixed_width_utc() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(storage_timestamp(ts), "2026-01-02T03:04:05.000Z");
    }

    #[test]
    fn test_parse_offsets_normalize_to_utc() {
        let parsed = parse_timestamp("2026-10-14T10:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 10, 14, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_gitlab_forms() {
        let expected = Utc.with_ymd_and_hms(2026, 10, 14, 8, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2026-10-14 08:00:00 UTC"), Some(expected));
        assert_eq!(parse_timestamp("2026-10-14 10:00:00 +0200"), Some(expected));
        assert_eq!(parse_timestamp("not a date"), None);
    }

    #[test]
    fn test_relative_time() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap();
        assert_eq!(format_relative_time(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(format_relative_time(now - Duration::days(2), now), "2d ago");
        assert_eq!(format_relative_time(now + Duration::minutes(1), now), "just now");
    }
}
