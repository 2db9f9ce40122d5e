use chrono::{DateTime, Utc};
use sqlx::Row;

use drive_core::model::{CourseId, LessonId, UserId, UserProgressRecord};
use drive_core::time::LearningDayKey;

use super::{
    SqliteStore,
    mapping::{conn, i64_to_u64, map_activity_row, ser, u64_to_i64},
};
use crate::repository::{ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteStore {
    async fn load_progress(&self, user: &UserId) -> Result<UserProgressRecord, StorageError> {
        let mut record = UserProgressRecord::default();

        let rows = sqlx::query(
            r"
            SELECT kind, activity_id, completed, time_spent_seconds,
                   playback_time, last_accessed, score
            FROM activity_progress
            WHERE user_id = ?1
            ",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        for row in rows {
            let (kind, activity_id, progress) = map_activity_row(&row)?;
            match kind.as_str() {
                "lesson" => {
                    record.lessons.insert(LessonId::new(activity_id), progress);
                }
                "quiz" => {
                    record.quizzes.insert(activity_id, progress);
                }
                "test" => {
                    record.tests.insert(activity_id, progress);
                }
                other => {
                    return Err(StorageError::Serialization(format!(
                        "invalid activity kind: {other}"
                    )));
                }
            }
        }

        let rows = sqlx::query(
            "SELECT day_key, seconds FROM daily_time WHERE user_id = ?1",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        for row in rows {
            let day: String = row.try_get("day_key").map_err(ser)?;
            let seconds: i64 = row.try_get("seconds").map_err(ser)?;
            record
                .daily_time_spent
                .insert(LearningDayKey::new(day), i64_to_u64("seconds", seconds)?);
        }

        let rows = sqlx::query(
            "SELECT course_id, lesson_id FROM last_viewed WHERE user_id = ?1",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        for row in rows {
            let course: String = row.try_get("course_id").map_err(ser)?;
            let lesson: String = row.try_get("lesson_id").map_err(ser)?;
            record
                .last_viewed_lesson
                .insert(CourseId::new(course), LessonId::new(lesson));
        }

        let locked = sqlx::query(
            "SELECT is_locked FROM account_flags WHERE user_id = ?1",
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        if let Some(row) = locked {
            let flag: i64 = row.try_get("is_locked").map_err(ser)?;
            record.is_locked = flag != 0;
        }

        Ok(record)
    }

    async fn add_watch_time(
        &self,
        user: &UserId,
        lesson: &LessonId,
        day: &LearningDayKey,
        seconds: u64,
        playback_position: Option<f64>,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let delta = u64_to_i64("seconds", seconds)?;
        // Only positions > 0 overwrite the stored playback time.
        let position = playback_position.filter(|p| *p > 0.0);

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO activity_progress (
                user_id, kind, activity_id, completed, time_spent_seconds,
                playback_time, last_accessed
            )
            VALUES (?1, 'lesson', ?2, 0, ?3, COALESCE(?4, 0), ?5)
            ON CONFLICT(user_id, kind, activity_id) DO UPDATE SET
                time_spent_seconds = time_spent_seconds + excluded.time_spent_seconds,
                playback_time = COALESCE(?4, playback_time),
                last_accessed = excluded.last_accessed
            ",
        )
        .bind(user.as_str())
        .bind(lesson.as_str())
        .bind(delta)
        .bind(position)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO daily_time (user_id, day_key, seconds)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id, day_key) DO UPDATE SET
                seconds = seconds + excluded.seconds
            ",
        )
        .bind(user.as_str())
        .bind(day.as_str())
        .bind(delta)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn mark_lesson_completed(
        &self,
        user: &UserId,
        lesson: &LessonId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO activity_progress (
                user_id, kind, activity_id, completed, time_spent_seconds,
                playback_time, last_accessed
            )
            VALUES (?1, 'lesson', ?2, 1, 0, 0, ?3)
            ON CONFLICT(user_id, kind, activity_id) DO UPDATE SET
                completed = 1,
                last_accessed = excluded.last_accessed
            ",
        )
        .bind(user.as_str())
        .bind(lesson.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn set_last_viewed(
        &self,
        user: &UserId,
        course: &CourseId,
        lesson: &LessonId,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO last_viewed (user_id, course_id, lesson_id)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id, course_id) DO UPDATE SET
                lesson_id = excluded.lesson_id
            ",
        )
        .bind(user.as_str())
        .bind(course.as_str())
        .bind(lesson.as_str())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn clear_last_viewed(
        &self,
        user: &UserId,
        course: &CourseId,
    ) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM last_viewed WHERE user_id = ?1 AND course_id = ?2")
            .bind(user.as_str())
            .bind(course.as_str())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }

    async fn daily_time(
        &self,
        user: &UserId,
        day: &LearningDayKey,
    ) -> Result<u64, StorageError> {
        let row = sqlx::query(
            "SELECT seconds FROM daily_time WHERE user_id = ?1 AND day_key = ?2",
        )
        .bind(user.as_str())
        .bind(day.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => {
                let seconds: i64 = row.try_get("seconds").map_err(ser)?;
                i64_to_u64("seconds", seconds)
            }
            None => Ok(0),
        }
    }

    async fn lock_account(&self, user: &UserId) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO account_flags (user_id, is_locked)
            VALUES (?1, 1)
            ON CONFLICT(user_id) DO UPDATE SET is_locked = 1
            ",
        )
        .bind(user.as_str())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}
