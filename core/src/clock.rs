//! Time source for default timestamps.
//!
//! Operations that default a timestamp to "now" ask the client's `Clock`
//! instead of reading the system time directly, so tests can pin the value.

use chrono::{DateTime, FixedOffset, Local, SecondsFormat};

pub trait Clock {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// The local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// ISO-8601 with second precision and a numeric offset,
/// e.g. `2024-05-01T12:30:00+02:00`.
pub fn iso8601(timestamp: &DateTime<FixedOffset>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso8601_keeps_offset_and_drops_fraction() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T12:30:00.750+02:00").unwrap();
        assert_eq!(iso8601(&ts), "2024-05-01T12:30:00+02:00");
    }

    #[test]
    fn iso8601_writes_utc_as_numeric_offset() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T12:30:00Z").unwrap();
        assert_eq!(iso8601(&ts), "2024-05-01T12:30:00+00:00");
    }

    #[test]
    fn fixed_clock_is_fixed() {
        let ts = DateTime::parse_from_rfc3339("2020-01-01T00:00:00+00:00").unwrap();
        let clock = FixedClock(ts);
        assert_eq!(clock.now(), ts);
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn system_clock_tracks_wall_time() {
        let before = chrono::Utc::now();
        let now = SystemClock.now();
        let after = chrono::Utc::now();
        assert!(now >= before - chrono::Duration::seconds(1));
        assert!(now <= after + chrono::Duration::seconds(1));
    }
}
