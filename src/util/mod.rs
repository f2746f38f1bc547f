//! Small shared helpers: the calendar-day source used for quota rollover.
//!
//! ## Design
//! - All quota accounting uses one time zone, fixed by configuration
//! - `Clock` is a trait so tests can advance days without sleeping

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;

/// Source of the current calendar day.
pub trait Clock: Send + Sync {
    /// Today's date in the deployment's time zone.
    fn today(&self) -> NaiveDate;
}

/// Wall-clock day in a fixed IANA time zone.
#[derive(Debug, Clone, Copy)]
pub struct ZonedClock {
    tz: Tz,
}

impl ZonedClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn utc() -> Self {
        Self { tz: chrono_tz::UTC }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }
}

impl Clock for ZonedClock {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }
}

/// Current epoch seconds.
pub fn epoch_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Manually advanced clock for tests.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    day: parking_lot::Mutex<NaiveDate>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day: parking_lot::Mutex::new(day),
        }
    }

    pub fn starting(y: i32, m: u32, d: u32) -> Self {
        Self::new(NaiveDate::from_ymd_opt(y, m, d).expect("valid test date"))
    }

    pub fn advance_days(&self, days: u64) {
        let mut day = self.day.lock();
        *day = *day + chrono::Days::new(days);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.day.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::starting(2025, 12, 31);
        clock.advance_days(1);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
    }

    #[test]
    fn zoned_clock_reports_its_zone() {
        let clock = ZonedClock::new(chrono_tz::Europe::Berlin);
        assert_eq!(clock.timezone(), chrono_tz::Europe::Berlin);
        // Berlin is never more than a day away from UTC.
        let diff = (clock.today() - ZonedClock::utc().today()).num_days();
        assert!(diff.abs() <= 1);
    }

    #[test]
    fn epoch_secs_is_positive() {
        assert!(epoch_secs() > 1_600_000_000);
    }
}
