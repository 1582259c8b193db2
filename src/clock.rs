//! Injectable time source.
//!
//! All date arithmetic in the library (three-date temporal model, audit
//! timestamps) goes through [`Clock`] so tests can pin "today".

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a fixed instant, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Pin to midnight UTC on the given date.
    pub fn on(date: NaiveDate) -> Self {
        let now = Utc
            .from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight is always valid"));
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}
