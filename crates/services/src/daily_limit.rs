//! Daily instructional-time cap enforcement.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;

use drive_core::model::UserId;
use drive_core::time::{learning_day_key, resume_at};
use storage::repository::ProgressRepository;

/// Seconds of instruction allowed per learning day (4 hours).
pub const DAILY_CAP_SECONDS: u64 = 14_400;
/// Seconds between polls of the accumulated daily time.
pub const LIMIT_POLL_INTERVAL_SECONDS: u64 = 300;

/// Reported cap state. The guard never pauses playback itself; the
/// coordinator reads `limit_reached` and keeps the player paused while it is
/// set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DailyLimitStatus {
    pub limit_reached: bool,
    pub resume_message: Option<String>,
}

/// Evaluate the cap for the current learning day.
///
/// At or above the cap, the status names the next noon at which the
/// learning-day key rolls over and study may resume. Below the cap, both the
/// flag and the message clear.
#[must_use]
pub fn evaluate(total_today_seconds: u64, now_local: NaiveDateTime) -> DailyLimitStatus {
    if total_today_seconds < DAILY_CAP_SECONDS {
        return DailyLimitStatus::default();
    }

    let resume = resume_at(now_local);
    DailyLimitStatus {
        limit_reached: true,
        resume_message: Some(format!(
            "You have reached the 4-hour daily study limit. You can resume at {}.",
            resume.format("12:00 on %Y-%m-%d")
        )),
    }
}

/// Polls accumulated same-day time against the cap.
#[derive(Clone)]
pub struct DailyLimitService {
    user: UserId,
    progress: Arc<dyn ProgressRepository>,
}

impl DailyLimitService {
    #[must_use]
    pub fn new(user: UserId, progress: Arc<dyn ProgressRepository>) -> Self {
        Self { user, progress }
    }

    /// Query the store and evaluate. A failed read is logged and leaves the
    /// previous status in force rather than flapping the flag.
    pub async fn poll(
        &self,
        now_local: NaiveDateTime,
        previous: &DailyLimitStatus,
    ) -> DailyLimitStatus {
        let day = learning_day_key(now_local);
        match self.progress.daily_time(&self.user, &day).await {
            Ok(total) => evaluate(total, now_local),
            Err(e) => {
                tracing::warn!(user = %self.user, error = %e, "daily-limit poll failed");
                previous.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn local(d: u32, hh: u32, mm: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(hh, mm, 0)
            .unwrap()
    }

    #[test]
    fn cap_boundary_is_inclusive() {
        assert!(!evaluate(DAILY_CAP_SECONDS - 1, local(5, 15, 0)).limit_reached);
        assert!(evaluate(DAILY_CAP_SECONDS, local(5, 15, 0)).limit_reached);
    }

    #[test]
    fn message_names_same_day_noon_before_noon() {
        let status = evaluate(DAILY_CAP_SECONDS, local(5, 9, 0));
        let message = status.resume_message.unwrap();
        assert!(message.contains("12:00 on 2024-03-05"), "{message}");
    }

    #[test]
    fn message_names_next_day_noon_after_noon() {
        let status = evaluate(DAILY_CAP_SECONDS + 500, local(5, 16, 30));
        let message = status.resume_message.unwrap();
        assert!(message.contains("12:00 on 2024-03-06"), "{message}");
    }

    #[test]
    fn below_cap_clears_flag_and_message() {
        let status = evaluate(0, local(5, 16, 30));
        assert_eq!(status, DailyLimitStatus::default());
    }
}
