#![forbid(unsafe_code)]

pub mod model;
pub mod time;

pub use time::{Clock, LearningDayKey, learning_day_key, resume_at};
