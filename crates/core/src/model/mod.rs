mod catalog;
mod ids;
mod progress;
mod security;

pub use catalog::{Catalog, Course, Lesson, LessonKind, Module};
pub use ids::{CourseId, LessonId, ModuleId, UserId};
pub use progress::{ActivityProgress, UserProgressRecord};
pub use security::{AnswerHash, SecurityProfile, SecurityQuestion};
