//! Date/time display helpers for recman.
//!
//! Records carry human-readable "how long ago" strings that are recomputed on
//! every response, so they go stale as soon as they are sent.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Display unit for an elapsed duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElapsedUnit {
    Seconds,
    Minutes,
    Hours,
    Date,
}

/// Ordered (exclusive upper bound in seconds, unit) table. The first row whose
/// bound exceeds the elapsed seconds is used.
const THRESHOLDS: [(i64, ElapsedUnit); 4] = [
    (60, ElapsedUnit::Seconds),
    (3_600, ElapsedUnit::Minutes),
    (86_400, ElapsedUnit::Hours),
    (i64::MAX, ElapsedUnit::Date),
];

/// Formats timestamps as elapsed-time strings relative to a given "now".
#[derive(Debug, Clone, Copy)]
pub struct ElapsedFormatter {
    timezone: Tz,
}

impl Default for ElapsedFormatter {
    fn default() -> Self {
        Self { timezone: Tz::UTC }
    }
}

impl ElapsedFormatter {
    /// Create a formatter that renders calendar dates in `timezone`.
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Create a formatter from a timezone name, falling back to UTC when the
    /// name is not recognized.
    pub fn from_name(timezone: &str) -> Self {
        match timezone.parse::<Tz>() {
            Ok(tz) => Self::new(tz),
            Err(_) => {
                tracing::warn!(timezone, "Unknown timezone, using UTC");
                Self::default()
            }
        }
    }

    /// Timezone used for calendar dates.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Format `at` relative to `now`.
    ///
    /// Under a minute: "N seconds"; under an hour: "N minutes"; under a day:
    /// "N hours"; otherwise the ISO calendar date of `at` (YYYY-MM-DD).
    /// Timestamps in the future count as zero elapsed.
    pub fn format(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> String {
        let elapsed = (now - at).num_seconds().max(0);

        let unit = THRESHOLDS
            .iter()
            .find(|(bound, _)| elapsed < *bound)
            .map(|(_, unit)| *unit)
            .unwrap_or(ElapsedUnit::Date);

        match unit {
            ElapsedUnit::Seconds => format!("{elapsed} seconds"),
            ElapsedUnit::Minutes => format!("{} minutes", elapsed / 60),
            ElapsedUnit::Hours => format!("{} hours", elapsed / 3_600),
            ElapsedUnit::Date => at.with_timezone(&self.timezone).format("%Y-%m-%d").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 12, 0, 0).unwrap()
    }

    fn ago(secs: i64) -> DateTime<Utc> {
        now() - Duration::seconds(secs)
    }

    #[test]
    fn test_seconds() {
        let f = ElapsedFormatter::default();
        assert_eq!(f.format(ago(0), now()), "0 seconds");
        assert_eq!(f.format(ago(30), now()), "30 seconds");
        assert_eq!(f.format(ago(59), now()), "59 seconds");
    }

    #[test]
    fn test_minutes() {
        let f = ElapsedFormatter::default();
        assert_eq!(f.format(ago(60), now()), "1 minutes");
        assert_eq!(f.format(ago(90), now()), "1 minutes");
        assert_eq!(f.format(ago(3_599), now()), "59 minutes");
    }

    #[test]
    fn test_hours() {
        let f = ElapsedFormatter::default();
        assert_eq!(f.format(ago(3_600), now()), "1 hours");
        assert_eq!(f.format(ago(7_200), now()), "2 hours");
        assert_eq!(f.format(ago(86_399), now()), "23 hours");
    }

    #[test]
    fn test_beyond_a_day_is_iso_date() {
        let f = ElapsedFormatter::default();
        assert_eq!(f.format(ago(86_400), now()), "2024-09-01");
        assert_eq!(f.format(ago(90_000), now()), "2024-09-01");
    }

    #[test]
    fn test_iso_date_uses_timezone() {
        // 2024-08-31 20:00 UTC is already 2024-09-01 in Tokyo.
        let at = Utc.with_ymd_and_hms(2024, 8, 31, 20, 0, 0).unwrap();
        let utc = ElapsedFormatter::default();
        let tokyo = ElapsedFormatter::from_name("Asia/Tokyo");

        assert_eq!(utc.format(at, now()), "2024-08-31");
        assert_eq!(tokyo.format(at, now()), "2024-09-01");
    }

    #[test]
    fn test_future_timestamp_clamps_to_zero() {
        let f = ElapsedFormatter::default();
        let future = now() + Duration::seconds(5);
        assert_eq!(f.format(future, now()), "0 seconds");
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_utc() {
        let f = ElapsedFormatter::from_name("Invalid/Zone");
        assert_eq!(f.timezone(), Tz::UTC);
    }
}
