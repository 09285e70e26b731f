//! Fixed calendar source for deterministic testing.

use std::cell::Cell;

use crate::key::Date;
use crate::storage::time::TimeSource;

/// A calendar that only moves when told to.
///
/// Multi-tag headers carry creation and update dates; tests that compare
/// file images byte for byte need those dates pinned.
#[derive(Debug)]
pub struct FixedTimeSource {
    today: Cell<Date>,
}

impl FixedTimeSource {
    #[must_use]
    pub const fn new(today: Date) -> Self {
        Self {
            today: Cell::new(today),
        }
    }

    /// Move the calendar forward by whole days.
    pub fn advance_days(&self, days: i64) {
        self.today
            .set(Date::from_julian(self.today.get().julian() + days));
    }
}

impl TimeSource for FixedTimeSource {
    fn today(&self) -> Date {
        self.today.get()
    }
}
