//! Local time-of-day helpers.
//!
//! Instances carry a fixed UTC offset in seconds; all "local" arithmetic
//! here is plain offset shifting (no DST, no leap seconds).

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Seconds in a day.
pub const DAY_SECS: i64 = 86_400;

/// Seconds elapsed since the most recent local midnight.
pub fn seconds_since_midnight(now: DateTime<Utc>, offset_secs: i32) -> i64 {
    (now.timestamp() + offset_secs as i64).rem_euclid(DAY_SECS)
}

/// The current calendar date in the shifted local timezone.
pub fn local_date(now: DateTime<Utc>, offset_secs: i32) -> NaiveDate {
    (now + Duration::seconds(offset_secs as i64)).date_naive()
}

/// The UTC instant of the next local midnight strictly after `now`.
pub fn next_local_midnight(now: DateTime<Utc>, offset_secs: i32) -> DateTime<Utc> {
    let into_day = seconds_since_midnight(now, offset_secs);
    now + Duration::seconds(DAY_SECS - into_day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_seconds_since_midnight_utc() {
        assert_eq!(seconds_since_midnight(utc(2024, 6, 1, 0, 0, 0), 0), 0);
        assert_eq!(seconds_since_midnight(utc(2024, 6, 1, 1, 2, 3), 0), 3723);
        assert_eq!(
            seconds_since_midnight(utc(2024, 6, 1, 23, 59, 59), 0),
            DAY_SECS - 1
        );
    }

    #[test]
    fn test_seconds_since_midnight_with_offset() {
        // 23:00 UTC at +02:00 is 01:00 local the next day.
        assert_eq!(
            seconds_since_midnight(utc(2024, 6, 1, 23, 0, 0), 7200),
            3600
        );
        // 01:00 UTC at -02:00 is 23:00 local the previous day.
        assert_eq!(
            seconds_since_midnight(utc(2024, 6, 1, 1, 0, 0), -7200),
            23 * 3600
        );
    }

    #[test]
    fn test_local_date_rolls_over() {
        let now = utc(2024, 6, 1, 23, 30, 0);
        assert_eq!(local_date(now, 0), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(
            local_date(now, 3600),
            NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()
        );
    }

    #[test]
    fn test_next_local_midnight() {
        let now = utc(2024, 6, 1, 22, 0, 0);
        assert_eq!(next_local_midnight(now, 0), utc(2024, 6, 2, 0, 0, 0));
        // +02:00 local midnight is 22:00 UTC; strictly after now.
        assert_eq!(next_local_midnight(now, 7200), utc(2024, 6, 2, 22, 0, 0));
    }

    #[test]
    fn test_next_local_midnight_is_strictly_future() {
        let at_midnight = utc(2024, 6, 1, 0, 0, 0);
        let next = next_local_midnight(at_midnight, 0);
        assert_eq!(next, utc(2024, 6, 2, 0, 0, 0));
        assert!(next > at_midnight);
    }
}
