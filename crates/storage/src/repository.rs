use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use drive_core::model::{Catalog, CourseId, LessonId, SecurityProfile, UserId, UserProgressRecord};
use drive_core::time::LearningDayKey;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Audit collection receiving identity-verification entries.
pub const VERIFICATION_LOGS: &str = "verification_logs";
/// Audit collection receiving course-completion entries.
pub const COMPLETION_LOGS: &str = "completion_logs";

/// One append-only audit entry.
///
/// Audit collections are write-only for this layer; nothing here ever reads
/// them back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub user: UserId,
    pub question: Option<String>,
    pub user_response: Option<String>,
    pub result: String,
    pub action: String,
    pub recorded_at: DateTime<Utc>,
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Durable per-user progress document operations.
///
/// Writes touch disjoint sub-paths of the record (watch time only adds to
/// `time_spent_seconds`/`playback_time`/`daily_time_spent`; completion only
/// sets `completed`), so callers may issue them independently without a
/// transaction.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the user's progress record, lazily creating an empty one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the backend cannot be reached.
    async fn load_progress(&self, user: &UserId) -> Result<UserProgressRecord, StorageError>;

    /// Atomically credit watch time to a lesson and to the learning-day total.
    ///
    /// Creates the lesson entry at zero when absent, bumps `last_accessed`,
    /// and stores `playback_position` when supplied and greater than zero.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the increments cannot be applied.
    async fn add_watch_time(
        &self,
        user: &UserId,
        lesson: &LessonId,
        day: &LearningDayKey,
        seconds: u64,
        playback_position: Option<f64>,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Set `completed = true` on one lesson entry, preserving sibling fields.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the write fails.
    async fn mark_lesson_completed(
        &self,
        user: &UserId,
        lesson: &LessonId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Record the resumption bookmark for a course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the write fails.
    async fn set_last_viewed(
        &self,
        user: &UserId,
        course: &CourseId,
        lesson: &LessonId,
    ) -> Result<(), StorageError>;

    /// Delete exactly one course's resumption bookmark.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the delete fails.
    async fn clear_last_viewed(
        &self,
        user: &UserId,
        course: &CourseId,
    ) -> Result<(), StorageError>;

    /// Seconds accumulated for the given learning day, zero when absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the read fails.
    async fn daily_time(&self, user: &UserId, day: &LearningDayKey)
    -> Result<u64, StorageError>;

    /// Persist the account lock. Never cleared by this layer.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the write fails.
    async fn lock_account(&self, user: &UserId) -> Result<(), StorageError>;
}

/// Stored security questions for identity re-verification.
#[async_trait]
pub trait SecurityRepository: Send + Sync {
    /// Fetch the user's security profile, `None` when never configured.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the read fails.
    async fn security_profile(
        &self,
        user: &UserId,
    ) -> Result<Option<SecurityProfile>, StorageError>;

    /// Overwrite the user's security profile wholesale.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the write fails.
    async fn save_security_profile(
        &self,
        user: &UserId,
        profile: &SecurityProfile,
    ) -> Result<(), StorageError>;
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Append a record to the named collection.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the append fails.
    async fn append(&self, collection: &str, record: AuditRecord) -> Result<(), StorageError>;
}

/// Read access to the authored course catalog.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Load one course's catalog (course, modules, lessons).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown course.
    async fn load_catalog(&self, course: &CourseId) -> Result<Catalog, StorageError>;

    /// Persist a catalog. Used by admin tooling and test seeding.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the write fails.
    async fn save_catalog(&self, catalog: &Catalog) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

/// Simple in-memory store implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    progress: Arc<Mutex<HashMap<UserId, UserProgressRecord>>>,
    profiles: Arc<Mutex<HashMap<UserId, SecurityProfile>>>,
    audits: Arc<Mutex<Vec<(String, AuditRecord)>>>,
    catalogs: Arc<Mutex<HashMap<CourseId, Catalog>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the audit entries appended to one collection.
    ///
    /// Test/seeding helper; production code never reads audits back.
    #[must_use]
    pub fn audit_entries(&self, collection: &str) -> Vec<AuditRecord> {
        self.audits
            .lock()
            .map(|guard| {
                guard
                    .iter()
                    .filter(|(c, _)| c == collection)
                    .map(|(_, r)| r.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn lock_err<T>(e: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl ProgressRepository for InMemoryStore {
    async fn load_progress(&self, user: &UserId) -> Result<UserProgressRecord, StorageError> {
        let mut guard = self.progress.lock().map_err(lock_err)?;
        Ok(guard.entry(user.clone()).or_default().clone())
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
        let mut guard = self.progress.lock().map_err(lock_err)?;
        let record = guard.entry(user.clone()).or_default();

        let entry = record.lessons.entry(lesson.clone()).or_default();
        entry.time_spent_seconds += seconds;
        entry.last_accessed = Some(at);
        if let Some(pos) = playback_position
            && pos > 0.0
        {
            entry.playback_time = pos;
        }

        *record.daily_time_spent.entry(day.clone()).or_insert(0) += seconds;
        Ok(())
    }

    async fn mark_lesson_completed(
        &self,
        user: &UserId,
        lesson: &LessonId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(lock_err)?;
        let record = guard.entry(user.clone()).or_default();
        let entry = record.lessons.entry(lesson.clone()).or_default();
        entry.completed = true;
        entry.last_accessed = Some(at);
        Ok(())
    }

    async fn set_last_viewed(
        &self,
        user: &UserId,
        course: &CourseId,
        lesson: &LessonId,
    ) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(lock_err)?;
        let record = guard.entry(user.clone()).or_default();
        record
            .last_viewed_lesson
            .insert(course.clone(), lesson.clone());
        Ok(())
    }

    async fn clear_last_viewed(
        &self,
        user: &UserId,
        course: &CourseId,
    ) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(lock_err)?;
        if let Some(record) = guard.get_mut(user) {
            record.last_viewed_lesson.remove(course);
        }
        Ok(())
    }

    async fn daily_time(
        &self,
        user: &UserId,
        day: &LearningDayKey,
    ) -> Result<u64, StorageError> {
        let guard = self.progress.lock().map_err(lock_err)?;
        Ok(guard.get(user).map_or(0, |r| r.time_for_day(day)))
    }

    async fn lock_account(&self, user: &UserId) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(lock_err)?;
        guard.entry(user.clone()).or_default().is_locked = true;
        Ok(())
    }
}

#[async_trait]
impl SecurityRepository for InMemoryStore {
    async fn security_profile(
        &self,
        user: &UserId,
    ) -> Result<Option<SecurityProfile>, StorageError> {
        let guard = self.profiles.lock().map_err(lock_err)?;
        Ok(guard.get(user).cloned())
    }

    async fn save_security_profile(
        &self,
        user: &UserId,
        profile: &SecurityProfile,
    ) -> Result<(), StorageError> {
        let mut guard = self.profiles.lock().map_err(lock_err)?;
        guard.insert(user.clone(), profile.clone());
        Ok(())
    }
}

#[async_trait]
impl AuditRepository for InMemoryStore {
    async fn append(&self, collection: &str, record: AuditRecord) -> Result<(), StorageError> {
        let mut guard = self.audits.lock().map_err(lock_err)?;
        guard.push((collection.to_owned(), record));
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn load_catalog(&self, course: &CourseId) -> Result<Catalog, StorageError> {
        let guard = self.catalogs.lock().map_err(lock_err)?;
        guard.get(course).cloned().ok_or(StorageError::NotFound)
    }

    async fn save_catalog(&self, catalog: &Catalog) -> Result<(), StorageError> {
        let mut guard = self.catalogs.lock().map_err(lock_err)?;
        guard.insert(catalog.course_id().clone(), catalog.clone());
        Ok(())
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Bundles the repository trait objects behind one handle for easy backend
/// swapping.
#[derive(Clone)]
pub struct Store {
    pub progress: Arc<dyn ProgressRepository>,
    pub security: Arc<dyn SecurityRepository>,
    pub audit: Arc<dyn AuditRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
}

impl Store {
    #[must_use]
    pub fn in_memory() -> Self {
        let store = InMemoryStore::new();
        Self::from_in_memory(&store)
    }

    /// Build a `Store` sharing the given in-memory backend, keeping the
    /// concrete handle available for seeding and audit inspection.
    #[must_use]
    pub fn from_in_memory(store: &InMemoryStore) -> Self {
        Self {
            progress: Arc::new(store.clone()),
            security: Arc::new(store.clone()),
            audit: Arc::new(store.clone()),
            catalog: Arc::new(store.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_core::time::fixed_now;

    fn user() -> UserId {
        UserId::new("u1")
    }

    fn day() -> LearningDayKey {
        LearningDayKey::new("2024-03-05")
    }

    #[tokio::test]
    async fn watch_time_creates_entry_and_accumulates() {
        let store = InMemoryStore::new();
        let lesson = LessonId::new("l1");

        store
            .add_watch_time(&user(), &lesson, &day(), 30, Some(28.5), fixed_now())
            .await
            .unwrap();
        store
            .add_watch_time(&user(), &lesson, &day(), 15, None, fixed_now())
            .await
            .unwrap();

        let record = store.load_progress(&user()).await.unwrap();
        let entry = &record.lessons[&lesson];
        assert_eq!(entry.time_spent_seconds, 45);
        assert!((entry.playback_time - 28.5).abs() < f64::EPSILON);
        assert!(!entry.completed);
        assert_eq!(record.time_for_day(&day()), 45);
        assert_eq!(store.daily_time(&user(), &day()).await.unwrap(), 45);
    }

    #[tokio::test]
    async fn completion_preserves_accumulated_time() {
        let store = InMemoryStore::new();
        let lesson = LessonId::new("l1");

        store
            .add_watch_time(&user(), &lesson, &day(), 90, None, fixed_now())
            .await
            .unwrap();
        store
            .mark_lesson_completed(&user(), &lesson, fixed_now())
            .await
            .unwrap();

        let record = store.load_progress(&user()).await.unwrap();
        let entry = &record.lessons[&lesson];
        assert!(entry.completed);
        assert_eq!(entry.time_spent_seconds, 90);
    }

    #[tokio::test]
    async fn clear_last_viewed_removes_only_that_course() {
        let store = InMemoryStore::new();
        store
            .set_last_viewed(&user(), &CourseId::new("c1"), &LessonId::new("l2"))
            .await
            .unwrap();
        store
            .set_last_viewed(&user(), &CourseId::new("c2"), &LessonId::new("l9"))
            .await
            .unwrap();

        store
            .clear_last_viewed(&user(), &CourseId::new("c1"))
            .await
            .unwrap();

        let record = store.load_progress(&user()).await.unwrap();
        assert!(record.last_viewed(&CourseId::new("c1")).is_none());
        assert_eq!(
            record.last_viewed(&CourseId::new("c2")),
            Some(&LessonId::new("l9"))
        );
    }

    #[tokio::test]
    async fn lock_is_persisted() {
        let store = InMemoryStore::new();
        store.lock_account(&user()).await.unwrap();
        assert!(store.load_progress(&user()).await.unwrap().is_locked);
    }

    #[tokio::test]
    async fn audit_appends_are_kept_per_collection() {
        let store = InMemoryStore::new();
        let record = AuditRecord {
            user: user(),
            question: Some("Q".into()),
            user_response: Some("A".into()),
            result: "Pass".into(),
            action: "Successful Validation".into(),
            recorded_at: fixed_now(),
        };
        store.append(VERIFICATION_LOGS, record.clone()).await.unwrap();

        assert_eq!(store.audit_entries(VERIFICATION_LOGS), vec![record]);
        assert!(store.audit_entries(COMPLETION_LOGS).is_empty());
    }
}
