use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::model::ids::{CourseId, LessonId};
use crate::time::LearningDayKey;

/// Per-activity progress for one lesson, quiz or test.
///
/// `score` is only meaningful for quizzes and tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityProgress {
    pub completed: bool,
    pub time_spent_seconds: u64,
    pub playback_time: f64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub score: Option<f64>,
}

impl Default for ActivityProgress {
    fn default() -> Self {
        Self {
            completed: false,
            time_spent_seconds: 0,
            playback_time: 0.0,
            last_accessed: None,
            score: None,
        }
    }
}

/// The durable per-user progress document.
///
/// Created lazily with empty sub-maps on first access. Watch time is only
/// credited alongside an existing or newly created lesson entry, and
/// `daily_time_spent` values never decrease within a learning day.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserProgressRecord {
    pub lessons: HashMap<LessonId, ActivityProgress>,
    pub quizzes: HashMap<String, ActivityProgress>,
    pub tests: HashMap<String, ActivityProgress>,
    pub daily_time_spent: HashMap<LearningDayKey, u64>,
    pub last_viewed_lesson: HashMap<CourseId, LessonId>,
    pub is_locked: bool,
}

impl UserProgressRecord {
    /// Ids of all lessons marked completed.
    #[must_use]
    pub fn completed_lesson_ids(&self) -> HashSet<LessonId> {
        self.lessons
            .iter()
            .filter(|(_, p)| p.completed)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Seconds accumulated for the given learning day, zero when absent.
    #[must_use]
    pub fn time_for_day(&self, day: &LearningDayKey) -> u64 {
        self.daily_time_spent.get(day).copied().unwrap_or(0)
    }

    /// The resumption bookmark for a course, if one is set.
    #[must_use]
    pub fn last_viewed(&self, course: &CourseId) -> Option<&LessonId> {
        self.last_viewed_lesson.get(course)
    }
}
