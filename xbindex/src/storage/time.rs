//! Calendar source for the dates stamped into index headers.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::key::Date;

/// Julian day number of 1970-01-01.
const UNIX_EPOCH_JULIAN: i64 = 2_440_588;

/// Abstraction over "what day is it".
pub trait TimeSource {
    /// Today's date.
    fn today(&self) -> Date;
}

/// Real time source using system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    #[allow(clippy::cast_possible_wrap)] // Days since 1970 fit in i64
    fn today(&self) -> Date {
        let days = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() / 86_400);
        Date::from_julian(UNIX_EPOCH_JULIAN + days as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_source() {
        let today = SystemTimeSource.today();
        assert!(today.year() >= 2024);
        assert!((1..=12).contains(&today.month()));
    }

    #[test]
    fn test_unix_epoch_julian() {
        assert_eq!(
            Date::from_julian(UNIX_EPOCH_JULIAN),
            Date::new(1970, 1, 1).expect("valid date")
        );
    }
}
