use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::ids::{CourseId, LessonId, ModuleId};

//
// ─── CATALOG TYPES ─────────────────────────────────────────────────────────────
//

/// Kind of lesson content, controlling when the lesson becomes completable.
///
/// Video lessons require end-of-playback before they can be marked complete;
/// reading lessons are completable as soon as they are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LessonKind {
    Video,
    Reading,
}

impl LessonKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonKind::Video => "video",
            LessonKind::Reading => "reading",
        }
    }

    #[must_use]
    pub fn from_str_or_reading(s: &str) -> Self {
        match s {
            "video" => LessonKind::Video,
            _ => LessonKind::Reading,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub module_id: ModuleId,
    pub course_id: CourseId,
    pub title: String,
    pub kind: LessonKind,
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub course_id: CourseId,
    pub title: String,
    pub lesson_order: Vec<LessonId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub module_order: Vec<ModuleId>,
}

//
// ─── CATALOG ───────────────────────────────────────────────────────────────────
//

/// One course's modules and lessons, indexed for ordered traversal.
///
/// The catalog is authored by admin tooling and read-only here. Module and
/// lesson ordering is taken from the course's `module_order` and each module's
/// `lesson_order`; references to ids that were never loaded are skipped rather
/// than treated as errors.
#[derive(Debug, Clone)]
pub struct Catalog {
    course: Course,
    modules: HashMap<ModuleId, Module>,
    lessons: HashMap<LessonId, Lesson>,
}

impl Catalog {
    #[must_use]
    pub fn new(course: Course, modules: Vec<Module>, lessons: Vec<Lesson>) -> Self {
        let modules = modules.into_iter().map(|m| (m.id.clone(), m)).collect();
        let lessons = lessons.into_iter().map(|l| (l.id.clone(), l)).collect();
        Self {
            course,
            modules,
            lessons,
        }
    }

    #[must_use]
    pub fn course(&self) -> &Course {
        &self.course
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course.id
    }

    #[must_use]
    pub fn lesson(&self, id: &LessonId) -> Option<&Lesson> {
        self.lessons.get(id)
    }

    #[must_use]
    pub fn module(&self, id: &ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    #[must_use]
    pub fn contains_lesson(&self, id: &LessonId) -> bool {
        self.lessons.contains_key(id)
    }

    /// Lesson ids in course order: modules in `module_order`, lessons within
    /// each module in its `lesson_order`. Dangling references are skipped.
    pub fn lessons_in_order(&self) -> impl Iterator<Item = &LessonId> {
        self.course
            .module_order
            .iter()
            .filter_map(|mid| self.modules.get(mid))
            .flat_map(|m| m.lesson_order.iter())
            .filter(|lid| self.lessons.contains_key(*lid))
    }

    /// Number of resolvable lessons across the whole course.
    #[must_use]
    pub fn lesson_count(&self) -> usize {
        self.lessons_in_order().count()
    }

    /// The very first resolvable lesson of the course, if any.
    #[must_use]
    pub fn first_lesson(&self) -> Option<&LessonId> {
        self.lessons_in_order().next()
    }
}
