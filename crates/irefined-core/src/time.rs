//! Start-time normalization.
//!
//! The push feed reports session start times as UTC truncated to the second
//! with a literal `Z` suffix (`2024-05-01T18:00:00Z`). Times captured from the
//! schedule UI carry milliseconds and arbitrary offsets. Every comparison
//! between the two goes through [`canonical_start_time`]; nothing else in the
//! crate formats a start time for matching.

use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};

use crate::error::ValidationError;

/// Parse a raw start time into UTC.
///
/// Accepts RFC 3339 with any offset and fractional seconds. A naive
/// `YYYY-MM-DDTHH:MM:SS[.fff]` value is taken to be UTC already.
pub fn parse_start_time(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| ValidationError::InvalidStartTime {
            value: raw.to_string(),
        })
}

/// Render a start time the way the push feed does.
pub fn canonical_start_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse and re-render in one step.
pub fn normalize_start_time(raw: &str) -> Result<String, ValidationError> {
    parse_start_time(raw).map(|at| canonical_start_time(&at))
}

/// Status-bar countdown text for a queued start time.
///
/// Returns `"Registering"` once the target is inside the activation window.
pub fn format_countdown(target: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> String {
    let diff = target - now;
    if diff <= window {
        return "Registering".to_string();
    }

    let total = diff.num_seconds();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn normalize_strips_milliseconds() {
        assert_eq!(
            normalize_start_time("2024-05-01T18:00:00.000Z").unwrap(),
            "2024-05-01T18:00:00Z"
        );
    }

    #[test]
    fn normalize_converts_offsets_to_utc() {
        assert_eq!(
            normalize_start_time("2024-05-01T20:00:00+02:00").unwrap(),
            "2024-05-01T18:00:00Z"
        );
    }

    #[test]
    fn normalize_truncates_rather_than_rounds() {
        assert_eq!(
            normalize_start_time("2024-05-01T17:59:59.999Z").unwrap(),
            "2024-05-01T17:59:59Z"
        );
    }

    #[test]
    fn normalize_treats_naive_input_as_utc() {
        assert_eq!(
            normalize_start_time("2024-05-01T18:00:00").unwrap(),
            "2024-05-01T18:00:00Z"
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_start_time("2024-05-01T18:00:00.250+00:00").unwrap();
        assert_eq!(normalize_start_time(&once).unwrap(), once);
    }

    #[test]
    fn normalize_rejects_garbage() {
        let err = normalize_start_time("next tuesday").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidStartTime { .. }));
    }

    #[test]
    fn countdown_formats_by_magnitude() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let window = Duration::minutes(5);

        let far = now + Duration::days(2) + Duration::hours(3) + Duration::minutes(4);
        assert_eq!(format_countdown(far, now, window), "2d 3h 4m");

        let hours = now + Duration::hours(1) + Duration::minutes(2) + Duration::seconds(3);
        assert_eq!(format_countdown(hours, now, window), "1h 2m 3s");

        let minutes = now + Duration::minutes(6) + Duration::seconds(7);
        assert_eq!(format_countdown(minutes, now, window), "6m 7s");
    }

    #[test]
    fn countdown_inside_window_reads_registering() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let target = now + Duration::minutes(5);
        assert_eq!(format_countdown(target, now, Duration::minutes(5)), "Registering");
    }
}
