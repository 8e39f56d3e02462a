//! Wall-clock access

use chrono::{DateTime, FixedOffset, Local};

/// Source of the current local time
pub trait Clock {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// The system clock in the local timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Always reports the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// Milliseconds since the Unix epoch
pub fn epoch_millis(at: &DateTime<FixedOffset>) -> i64 {
    at.timestamp_millis()
}

/// Browser-style date string, e.g. `Wed Nov 29 2023 14:01:47 GMT-0500`
pub fn datetime_human(at: &DateTime<FixedOffset>) -> String {
    at.format("%a %b %d %Y %H:%M:%S GMT%z").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formats() {
        let at = DateTime::parse_from_rfc3339("2023-11-29T14:01:47.734-05:00").unwrap();
        assert_eq!(epoch_millis(&at), 1701284507734);
        assert_eq!(datetime_human(&at), "Wed Nov 29 2023 14:01:47 GMT-0500");
    }

    #[test]
    fn test_fixed_clock() {
        let at = DateTime::parse_from_rfc3339("2024-01-02T03:04:05+00:00").unwrap();
        assert_eq!(FixedClock(at).now(), at);
    }
}
