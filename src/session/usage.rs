//! Per-user, per-day request counter.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Requests charged on `day`.
///
/// The counter only ever refers to the current day: `roll_over` must be
/// called with today's date before reading or incrementing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub day: NaiveDate,
    pub count: u32,
}

impl UsageCounter {
    pub fn new(day: NaiveDate) -> Self {
        Self { day, count: 0 }
    }

    /// Reset the count if `today` is a different day. Returns `true` when a
    /// reset happened.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.day == today {
            return false;
        }
        self.day = today;
        self.count = 0;
        true
    }

    /// Charge one request if `count < quota`. Returns whether it was charged.
    pub fn try_increment(&mut self, quota: u32) -> bool {
        if self.count >= quota {
            return false;
        }
        self.count += 1;
        true
    }

    /// Zero the count for the current day.
    pub fn clear(&mut self) {
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn increments_up_to_quota() {
        let mut usage = UsageCounter::new(day(1));
        assert!(usage.try_increment(2));
        assert!(usage.try_increment(2));
        assert!(!usage.try_increment(2));
        assert_eq!(usage.count, 2);
    }

    #[test]
    fn rolls_over_once_per_boundary() {
        let mut usage = UsageCounter::new(day(1));
        usage.count = 17;
        assert!(usage.roll_over(day(2)));
        assert_eq!(usage.count, 0);
        assert_eq!(usage.day, day(2));

        usage.count = 3;
        assert!(!usage.roll_over(day(2)));
        assert_eq!(usage.count, 3);
    }

    #[test]
    fn clear_keeps_day() {
        let mut usage = UsageCounter::new(day(5));
        usage.count = 25;
        usage.clear();
        assert_eq!(usage, UsageCounter::new(day(5)));
    }
}
