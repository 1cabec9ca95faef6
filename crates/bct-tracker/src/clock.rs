//! Wall-clock source
//!
//! Activity times are local, naive timestamps. The coordinator reads the
//! time through [`Clock`] so tests can move it forward by hand.

use std::sync::{Arc, RwLock};

use chrono::{Duration, Local, NaiveDateTime};

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<RwLock<NaiveDateTime>>,
}

impl MockClock {
    pub fn at(time: NaiveDateTime) -> Self {
        Self {
            current: Arc::new(RwLock::new(time)),
        }
    }

    pub fn set(&self, time: NaiveDateTime) {
        if let Ok(mut current) = self.current.write() {
            *current = time;
        }
    }

    pub fn advance(&self, duration: Duration) {
        if let Ok(mut current) = self.current.write() {
            *current += duration;
        }
    }

    pub fn advance_seconds(&self, seconds: i64) {
        self.advance(Duration::seconds(seconds));
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.advance(Duration::minutes(minutes));
    }

    pub fn advance_hours(&self, hours: i64) {
        self.advance(Duration::hours(hours));
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::at(Local::now().naive_local())
    }
}

impl Clock for MockClock {
    fn now(&self) -> NaiveDateTime {
        self.current
            .read()
            .map(|t| *t)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_mock_clock_moves_only_when_told() {
        let start = NaiveDate::from_ymd_opt(2025, 8, 1)
            .unwrap()
            .and_hms_opt(23, 50, 0)
            .unwrap();
        let clock = MockClock::at(start);
        assert_eq!(clock.now(), start);

        clock.advance_minutes(20);
        assert_eq!(clock.now().date(), NaiveDate::from_ymd_opt(2025, 8, 2).unwrap());

        clock.advance_seconds(30);
        clock.advance_hours(1);
        assert_eq!(clock.now() - start, Duration::seconds(20 * 60 + 30 + 3600));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_system_clock_is_close_to_local_time() {
        let delta = Local::now().naive_local() - SystemClock.now();
        assert!(delta.num_seconds().abs() < 5);
    }
}
