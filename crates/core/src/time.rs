use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A simple clock abstraction for deterministic time in services and tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// If this is a fixed clock, advance it by the given duration.
    ///
    /// Has no effect on `Clock::Default`.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }
}

/// Local hour at which one learning day rolls over into the next.
pub const LEARNING_DAY_ROLLOVER_HOUR: u32 = 12;

/// Identifies one learning day for daily-time bookkeeping.
///
/// A learning day runs from 12:00 local time to 12:00 the next calendar day,
/// so late-evening and early-morning study land in the same bucket. The key
/// is the `YYYY-MM-DD` date whose noon boundary precedes the instant.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LearningDayKey(String);

impl LearningDayKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LearningDayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for LearningDayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LearningDayKey({})", self.0)
    }
}

/// Returns the learning-day key for a local wall-clock instant.
///
/// Instants before the noon rollover belong to the previous calendar day.
#[must_use]
pub fn learning_day_key(local: NaiveDateTime) -> LearningDayKey {
    let mut date = local.date();
    if local.hour() < LEARNING_DAY_ROLLOVER_HOUR {
        date = date.pred_opt().unwrap_or(date);
    }
    LearningDayKey(date.format("%Y-%m-%d").to_string())
}

/// Returns the next instant at which a capped-out learner may resume.
///
/// Before noon that is noon of the same day; at or after noon it is noon of
/// the next calendar day, when the learning-day key rolls over.
#[must_use]
pub fn resume_at(local: NaiveDateTime) -> NaiveDateTime {
    let noon = NaiveTime::from_hms_opt(LEARNING_DAY_ROLLOVER_HOUR, 0, 0)
        .expect("noon is a valid time of day");
    if local.hour() < LEARNING_DAY_ROLLOVER_HOUR {
        local.date().and_time(noon)
    } else {
        local
            .date()
            .succ_opt()
            .unwrap_or(local.date())
            .and_time(noon)
    }
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}
