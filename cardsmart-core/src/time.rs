//! Time utilities: timezone-aware hour-of-day bucketing.
//!
//! Usage patterns are bucketed by the user's wall-clock hour, not UTC, so
//! "coffee card every morning" survives a timezone away from Greenwich.

use anyhow::Result;
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

/// Parse an IANA timezone like "America/Chicago".
pub fn parse_timezone(tz: &str) -> Result<Tz> {
    tz.parse()
        .map_err(|_| anyhow::anyhow!("invalid timezone: {tz}"))
}

/// Hour of day (0-23) of a UTC instant in the given timezone.
pub fn local_hour(time: DateTime<Utc>, tz: Tz) -> u32 {
    time.with_timezone(&tz).hour()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_local_hour_chicago() {
        // Feb is CST (UTC-6): 15:00 UTC is 09:00 local.
        let tz = parse_timezone("America/Chicago").unwrap();
        let t = Utc.with_ymd_and_hms(2026, 2, 20, 15, 0, 0).unwrap();
        assert_eq!(local_hour(t, tz), 9);
    }

    #[test]
    fn test_invalid_timezone() {
        assert!(parse_timezone("Mars/Olympus_Mons").is_err());
    }
}
