//! Lesson progression: which lesson is current, and recording completion.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use drive_core::model::{Catalog, CourseId, Lesson, LessonId, LessonKind, UserId, UserProgressRecord};
use storage::repository::{
    AuditRecord, AuditRepository, COMPLETION_LOGS, ProgressRepository,
};

use crate::error::CompletionError;

/// Outcome of the current-lesson determination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentLesson {
    Lesson(LessonId),
    /// Every lesson in the catalog is completed.
    CourseComplete,
    /// The catalog resolves to no lessons at all.
    NoLessons,
}

/// Decide which lesson to present.
///
/// In order: course completion, the `last_viewed` bookmark (when it still
/// exists in the catalog), the first not-yet-completed lesson in course
/// order, and finally the very first lesson. Dangling catalog references are
/// skipped throughout.
#[must_use]
pub fn determine_current(
    catalog: &Catalog,
    completed: &HashSet<LessonId>,
    last_viewed: Option<&LessonId>,
) -> CurrentLesson {
    let total = catalog.lesson_count();
    if total > 0 && completed.len() == total {
        return CurrentLesson::CourseComplete;
    }

    if let Some(bookmark) = last_viewed
        && catalog.contains_lesson(bookmark)
    {
        return CurrentLesson::Lesson(bookmark.clone());
    }

    for lesson in catalog.lessons_in_order() {
        if !completed.contains(lesson) {
            return CurrentLesson::Lesson(lesson.clone());
        }
    }

    match catalog.first_lesson() {
        Some(lesson) => CurrentLesson::Lesson(lesson.clone()),
        None => CurrentLesson::NoLessons,
    }
}

/// Whether the "mark complete" action is enabled for a lesson.
///
/// Non-video lessons are always completable; video lessons only once their
/// playback has signalled the end.
#[must_use]
pub fn is_completable(lesson: &Lesson, ended_videos: &HashSet<LessonId>) -> bool {
    match lesson.kind {
        LessonKind::Reading => true,
        LessonKind::Video => lesson.video_url.is_none() || ended_videos.contains(&lesson.id),
    }
}

/// Session-local progression state, derived from the progress record on load
/// and mutated optimistically on completion.
#[derive(Debug, Clone, Default)]
pub struct ProgressionState {
    pub completed: HashSet<LessonId>,
    pub last_viewed: Option<LessonId>,
    /// Explicit sidebar navigation overriding the computed current lesson.
    pub manual_selection: Option<LessonId>,
    /// Lessons whose video content has signalled end-of-playback.
    pub ended_videos: HashSet<LessonId>,
}

impl ProgressionState {
    #[must_use]
    pub fn from_record(record: &UserProgressRecord, course: &CourseId) -> Self {
        Self {
            completed: record.completed_lesson_ids(),
            last_viewed: record.last_viewed(course).cloned(),
            manual_selection: None,
            ended_videos: HashSet::new(),
        }
    }

    /// The lesson to render: a valid manual selection wins, otherwise the
    /// progression algorithm decides.
    #[must_use]
    pub fn current(&self, catalog: &Catalog) -> CurrentLesson {
        if let Some(selected) = &self.manual_selection
            && catalog.contains_lesson(selected)
        {
            return CurrentLesson::Lesson(selected.clone());
        }
        determine_current(catalog, &self.completed, self.last_viewed.as_ref())
    }
}

/// Persists completion and bookmarks.
#[derive(Clone)]
pub struct ProgressionService {
    user: UserId,
    progress: Arc<dyn ProgressRepository>,
    audit: Arc<dyn AuditRepository>,
}

impl ProgressionService {
    #[must_use]
    pub fn new(
        user: UserId,
        progress: Arc<dyn ProgressRepository>,
        audit: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            user,
            progress,
            audit,
        }
    }

    /// Mark the lesson completed and clear the course bookmark.
    ///
    /// The store writes go first; in-memory state mutates only once they
    /// succeed, so the next determination pass reflects the change without a
    /// refetch and never diverges from storage.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError::NotCompletable` when the lesson is unknown
    /// or its video has not finished, and rethrows storage failures so the
    /// caller can ask the user to retry.
    pub async fn complete_lesson(
        &self,
        state: &mut ProgressionState,
        catalog: &Catalog,
        lesson: &LessonId,
        at: DateTime<Utc>,
    ) -> Result<(), CompletionError> {
        let Some(entry) = catalog.lesson(lesson) else {
            return Err(CompletionError::NotCompletable);
        };
        if !is_completable(entry, &state.ended_videos) {
            return Err(CompletionError::NotCompletable);
        }

        self.progress
            .mark_lesson_completed(&self.user, lesson, at)
            .await?;
        self.progress
            .clear_last_viewed(&self.user, catalog.course_id())
            .await?;

        state.completed.insert(lesson.clone());
        state.last_viewed = None;
        if state.manual_selection.as_ref() == Some(lesson) {
            state.manual_selection = None;
        }

        if determine_current(catalog, &state.completed, None) == CurrentLesson::CourseComplete {
            let record = AuditRecord {
                user: self.user.clone(),
                question: None,
                user_response: None,
                result: "Pass".to_owned(),
                action: format!("Course Completed ({})", catalog.course_id()),
                recorded_at: at,
            };
            if let Err(e) = self.audit.append(COMPLETION_LOGS, record).await {
                tracing::warn!(user = %self.user, error = %e, "failed to append completion audit");
            }
        }

        Ok(())
    }

    /// Record the resumption bookmark for the course. Bookmark loss is
    /// tolerable, so failures are logged and swallowed.
    pub async fn remember_last_viewed(
        &self,
        state: &mut ProgressionState,
        course: &CourseId,
        lesson: &LessonId,
    ) {
        if let Err(e) = self.progress.set_last_viewed(&self.user, course, lesson).await {
            tracing::warn!(user = %self.user, error = %e, "failed to persist bookmark");
        }
        state.last_viewed = Some(lesson.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_core::model::{Course, Module, ModuleId, UserId};
    use drive_core::time::fixed_now;
    use storage::repository::InMemoryStore;

    fn lesson(id: &str, module: &str, kind: LessonKind) -> Lesson {
        Lesson {
            id: LessonId::new(id),
            module_id: ModuleId::new(module),
            course_id: CourseId::new("c1"),
            title: id.to_owned(),
            kind,
            video_url: matches!(kind, LessonKind::Video).then(|| format!("videos/{id}.mp4")),
        }
    }

    fn catalog() -> Catalog {
        let course = Course {
            id: CourseId::new("c1"),
            title: "Traffic Rules".into(),
            module_order: vec![ModuleId::new("m1"), ModuleId::new("m2")],
        };
        let modules = vec![
            Module {
                id: ModuleId::new("m1"),
                course_id: CourseId::new("c1"),
                title: "Basics".into(),
                lesson_order: vec![LessonId::new("l1"), LessonId::new("l2")],
            },
            Module {
                id: ModuleId::new("m2"),
                course_id: CourseId::new("c1"),
                title: "Signs".into(),
                lesson_order: vec![LessonId::new("l3")],
            },
        ];
        let lessons = vec![
            lesson("l1", "m1", LessonKind::Video),
            lesson("l2", "m1", LessonKind::Video),
            lesson("l3", "m2", LessonKind::Reading),
        ];
        Catalog::new(course, modules, lessons)
    }

    fn ids(ids: &[&str]) -> HashSet<LessonId> {
        ids.iter().map(|id| LessonId::new(*id)).collect()
    }

    #[test]
    fn first_incomplete_lesson_is_current() {
        let cat = catalog();
        assert_eq!(
            determine_current(&cat, &ids(&["l1", "l2"]), None),
            CurrentLesson::Lesson(LessonId::new("l3"))
        );
    }

    #[test]
    fn all_completed_means_course_complete() {
        let cat = catalog();
        assert_eq!(
            determine_current(&cat, &ids(&["l1", "l2", "l3"]), None),
            CurrentLesson::CourseComplete
        );
    }

    #[test]
    fn no_progress_starts_at_the_first_lesson() {
        let cat = catalog();
        assert_eq!(
            determine_current(&cat, &HashSet::new(), None),
            CurrentLesson::Lesson(LessonId::new("l1"))
        );
    }

    #[test]
    fn bookmark_wins_when_it_resolves() {
        let cat = catalog();
        let bookmark = LessonId::new("l2");
        assert_eq!(
            determine_current(&cat, &HashSet::new(), Some(&bookmark)),
            CurrentLesson::Lesson(LessonId::new("l2"))
        );

        let dangling = LessonId::new("ghost");
        assert_eq!(
            determine_current(&cat, &HashSet::new(), Some(&dangling)),
            CurrentLesson::Lesson(LessonId::new("l1"))
        );
    }

    #[test]
    fn video_gates_completability_until_playback_ends() {
        let cat = catalog();
        let video = cat.lesson(&LessonId::new("l1")).unwrap();
        let reading = cat.lesson(&LessonId::new("l3")).unwrap();

        assert!(is_completable(reading, &HashSet::new()));
        assert!(!is_completable(video, &HashSet::new()));
        assert!(is_completable(video, &ids(&["l1"])));
    }

    #[test]
    fn manual_selection_overrides_determination() {
        let cat = catalog();
        let mut state = ProgressionState::default();
        state.manual_selection = Some(LessonId::new("l3"));
        assert_eq!(state.current(&cat), CurrentLesson::Lesson(LessonId::new("l3")));

        state.manual_selection = Some(LessonId::new("ghost"));
        assert_eq!(state.current(&cat), CurrentLesson::Lesson(LessonId::new("l1")));
    }

    #[tokio::test]
    async fn complete_lesson_clears_bookmark_and_mutates_locally() {
        let store = InMemoryStore::new();
        let user = UserId::new("u1");
        let cat = catalog();

        store
            .set_last_viewed(&user, &CourseId::new("c1"), &LessonId::new("l2"))
            .await
            .unwrap();

        let service = ProgressionService::new(
            user.clone(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        );
        let record = store.load_progress(&user).await.unwrap();
        let mut state = ProgressionState::from_record(&record, &CourseId::new("c1"));
        state.ended_videos.insert(LessonId::new("l2"));

        service
            .complete_lesson(&mut state, &cat, &LessonId::new("l2"), fixed_now())
            .await
            .unwrap();

        // In-memory state reflects the change without a refetch.
        assert!(state.completed.contains(&LessonId::new("l2")));
        assert!(state.last_viewed.is_none());

        let record = store.load_progress(&user).await.unwrap();
        assert!(record.lessons[&LessonId::new("l2")].completed);
        assert!(record.last_viewed(&CourseId::new("c1")).is_none());
    }

    #[tokio::test]
    async fn finishing_the_last_lesson_logs_course_completion() {
        let store = InMemoryStore::new();
        let user = UserId::new("u1");
        let cat = catalog();
        let service = ProgressionService::new(
            user.clone(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        );

        let mut state = ProgressionState {
            completed: ids(&["l1", "l2"]),
            ..ProgressionState::default()
        };

        service
            .complete_lesson(&mut state, &cat, &LessonId::new("l3"), fixed_now())
            .await
            .unwrap();

        let entries = store.audit_entries(COMPLETION_LOGS);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].action.contains("Course Completed"));
    }

    #[tokio::test]
    async fn unfinished_video_is_not_completable() {
        let store = InMemoryStore::new();
        let service = ProgressionService::new(
            UserId::new("u1"),
            Arc::new(store.clone()),
            Arc::new(store),
        );
        let mut state = ProgressionState::default();

        let err = service
            .complete_lesson(&mut state, &catalog(), &LessonId::new("l1"), fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::NotCompletable));
        assert!(state.completed.is_empty());
    }
}
