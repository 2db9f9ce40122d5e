//! Wall-clock watch-time tracking with durable periodic flushes.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use drive_core::model::{LessonId, UserId};
use drive_core::time::LearningDayKey;
use storage::repository::ProgressRepository;

/// Seconds of wall-clock time between periodic flushes while tracking.
///
/// An ungraceful exit loses at most one interval of watch time.
pub const FLUSH_INTERVAL_SECONDS: u64 = 30;

/// Tracks the active watch segment for the lesson currently on screen.
///
/// Flushing is flush-then-reset: `take_elapsed` hands out the whole seconds
/// since the segment start and moves the start to `now`, so the same logical
/// segment continues and no second is ever counted twice.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeAccumulator {
    segment_start: Option<DateTime<Utc>>,
}

impl TimeAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a segment at `now`. No-op when already tracking.
    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.segment_start.is_none() {
            self.segment_start = Some(now);
        }
    }

    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.segment_start.is_some()
    }

    /// Whole seconds elapsed since the segment start, resetting the start to
    /// `now`. Returns zero when not tracking.
    pub fn take_elapsed(&mut self, now: DateTime<Utc>) -> u64 {
        match self.segment_start {
            Some(start) => {
                let elapsed = (now - start).num_seconds().max(0);
                self.segment_start = Some(now);
                elapsed.unsigned_abs()
            }
            None => 0,
        }
    }

    /// Final flush of the segment; stops tracking. Idempotent — calling it
    /// when not tracking returns zero.
    pub fn stop(&mut self, now: DateTime<Utc>) -> u64 {
        let elapsed = self.take_elapsed(now);
        self.segment_start = None;
        elapsed
    }
}

/// Persists flushed watch-time segments.
///
/// Telemetry loss is acceptable: a failed write is logged and swallowed so it
/// never blocks playback or reaches UI code.
#[derive(Clone)]
pub struct TimeTrackingService {
    user: UserId,
    progress: Arc<dyn ProgressRepository>,
}

impl TimeTrackingService {
    #[must_use]
    pub fn new(user: UserId, progress: Arc<dyn ProgressRepository>) -> Self {
        Self { user, progress }
    }

    /// Credit `seconds` of watch time to `lesson` and to the learning-day
    /// total, carrying the raw playback position when available.
    pub async fn record(
        &self,
        lesson: &LessonId,
        day: &LearningDayKey,
        seconds: u64,
        playback_position: Option<f64>,
        at: DateTime<Utc>,
    ) {
        if seconds == 0 {
            return;
        }
        if let Err(e) = self
            .progress
            .add_watch_time(&self.user, lesson, day, seconds, playback_position, at)
            .await
        {
            tracing::warn!(
                user = %self.user,
                lesson = %lesson,
                seconds,
                error = %e,
                "failed to persist watch time; dropping flush"
            );
        }
    }
}
