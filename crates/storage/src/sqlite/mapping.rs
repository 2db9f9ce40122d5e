use drive_core::model::{
    ActivityProgress, CourseId, Lesson, LessonId, LessonKind, Module, ModuleId,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

/// Maps one `activity_progress` row to `(kind, activity_id, progress)`.
pub(crate) fn map_activity_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<(String, String, ActivityProgress), StorageError> {
    let kind: String = row.try_get("kind").map_err(ser)?;
    let activity_id: String = row.try_get("activity_id").map_err(ser)?;

    let completed: i64 = row.try_get("completed").map_err(ser)?;
    let time_spent: i64 = row.try_get("time_spent_seconds").map_err(ser)?;

    let progress = ActivityProgress {
        completed: completed != 0,
        time_spent_seconds: i64_to_u64("time_spent_seconds", time_spent)?,
        playback_time: row.try_get("playback_time").map_err(ser)?,
        last_accessed: row.try_get("last_accessed").map_err(ser)?,
        score: row.try_get("score").map_err(ser)?,
    };

    Ok((kind, activity_id, progress))
}

pub(crate) fn map_module_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<Module, StorageError> {
    let lesson_order_json: String = row.try_get("lesson_order").map_err(ser)?;
    let lesson_order: Vec<LessonId> =
        serde_json::from_str(&lesson_order_json).map_err(ser)?;

    Ok(Module {
        id: ModuleId::new(row.try_get::<String, _>("id").map_err(ser)?),
        course_id: CourseId::new(row.try_get::<String, _>("course_id").map_err(ser)?),
        title: row.try_get("title").map_err(ser)?,
        lesson_order,
    })
}

pub(crate) fn map_lesson_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<Lesson, StorageError> {
    let kind: String = row.try_get("kind").map_err(ser)?;

    Ok(Lesson {
        id: LessonId::new(row.try_get::<String, _>("id").map_err(ser)?),
        module_id: ModuleId::new(row.try_get::<String, _>("module_id").map_err(ser)?),
        course_id: CourseId::new(row.try_get::<String, _>("course_id").map_err(ser)?),
        title: row.try_get("title").map_err(ser)?,
        kind: LessonKind::from_str_or_reading(&kind),
        video_url: row.try_get("video_url").map_err(ser)?,
    })
}
