//! Calendar dates and their Julian day numbers.
//!
//! Date keys are stored as the Julian day number in an 8-byte double.
//! The day count uses the proleptic Gregorian calendar with day 1 being
//! 0001-01-01 offset by 1,721,425, so 1970-01-01 is day 2,440,588.

const JULIAN_OFFSET: i64 = 1_721_425;

const DAYS_BEFORE_MONTH: [[u16; 13]; 2] = [
    [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334, 365],
    [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335, 366],
];

/// A calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    year: i32,
    month: u8,
    day: u8,
}

const fn is_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

const fn days_before_year(year: i64) -> i64 {
    let y = year - 1;
    y * 365 + y.div_euclid(4) - y.div_euclid(100) + y.div_euclid(400)
}

impl Date {
    /// Build a date, rejecting impossible month/day combinations.
    #[must_use]
    pub const fn new(year: i32, month: u8, day: u8) -> Option<Self> {
        if month < 1 || month > 12 || day < 1 {
            return None;
        }
        let table = &DAYS_BEFORE_MONTH[is_leap(year) as usize];
        let month_len = table[month as usize] - table[month as usize - 1];
        if day as u16 > month_len {
            return None;
        }
        Some(Self { year, month, day })
    }

    /// Parse the eight-digit `CCYYMMDD` form used by dBASE tables.
    #[must_use]
    pub fn parse_ccyymmdd(s: &str) -> Option<Self> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year = s[0..4].parse().ok()?;
        let month = s[4..6].parse().ok()?;
        let day = s[6..8].parse().ok()?;
        Self::new(year, month, day)
    }

    #[must_use]
    pub const fn year(self) -> i32 {
        self.year
    }

    #[must_use]
    pub const fn month(self) -> u8 {
        self.month
    }

    #[must_use]
    pub const fn day(self) -> u8 {
        self.day
    }

    /// One-based day of the year.
    #[must_use]
    pub const fn day_of_year(self) -> u16 {
        DAYS_BEFORE_MONTH[is_leap(self.year) as usize][self.month as usize - 1] + self.day as u16
    }

    /// Julian day number.
    #[must_use]
    pub const fn julian(self) -> i64 {
        days_before_year(self.year as i64) + self.day_of_year() as i64 + JULIAN_OFFSET
    }

    /// Inverse of [`Date::julian`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_julian(julian: i64) -> Self {
        let n = julian - JULIAN_OFFSET;
        let mut year = n * 400 / 146_097 + 1;
        while days_before_year(year) >= n {
            year -= 1;
        }
        while days_before_year(year + 1) < n {
            year += 1;
        }
        let day_of_year = (n - days_before_year(year)) as u16;
        let year = year as i32;
        let table = &DAYS_BEFORE_MONTH[usize::from(is_leap(year))];
        let mut month = 1;
        while month < 12 && table[month] < day_of_year {
            month += 1;
        }
        Self {
            year,
            month: month as u8,
            day: (day_of_year - table[month - 1]) as u8,
        }
    }
}

impl std::fmt::Display for Date {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}{:02}{:02}", self.year, self.month, self.day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_julian_days() {
        let d = Date::new(1970, 1, 1).expect("valid date");
        assert_eq!(d.julian(), 2_440_588);
        let d = Date::new(2000, 1, 1).expect("valid date");
        assert_eq!(d.julian(), 2_451_545);
    }

    #[test]
    fn test_from_julian_inverts_julian() {
        for (y, m, d) in [
            (1, 1, 1),
            (1899, 12, 31),
            (1900, 3, 1),
            (2000, 2, 29),
            (2023, 12, 31),
            (2024, 2, 29),
            (9999, 12, 31),
        ] {
            let date = Date::new(y, m, d).expect("valid date");
            assert_eq!(Date::from_julian(date.julian()), date, "{date}");
        }
    }

    #[test]
    fn test_consecutive_days() {
        let start = Date::new(1999, 12, 25).expect("valid date").julian();
        let mut prev = Date::from_julian(start);
        for jd in start + 1..start + 800 {
            let next = Date::from_julian(jd);
            assert!(next > prev);
            assert_eq!(next.julian(), jd);
            prev = next;
        }
    }

    #[test]
    fn test_rejects_invalid_dates() {
        assert!(Date::new(2023, 2, 29).is_none());
        assert!(Date::new(2023, 13, 1).is_none());
        assert!(Date::new(2023, 4, 31).is_none());
        assert!(Date::new(2023, 1, 0).is_none());
    }

    #[test]
    fn test_ccyymmdd_round_trip() {
        let d = Date::parse_ccyymmdd("20240315").expect("parse");
        assert_eq!((d.year(), d.month(), d.day()), (2024, 3, 15));
        assert_eq!(d.to_string(), "20240315");
        assert!(Date::parse_ccyymmdd("2024031").is_none());
        assert!(Date::parse_ccyymmdd("2024-3-1").is_none());
    }
}
