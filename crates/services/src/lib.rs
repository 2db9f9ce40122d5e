#![forbid(unsafe_code)]

pub mod break_scheduler;
pub mod coordinator;
pub mod daily_limit;
pub mod error;
pub mod identity;
pub mod idleness;
pub mod progression;
pub mod runtime;
pub mod time_accumulator;

pub use drive_core::Clock;

pub use break_scheduler::{BreakEvent, BreakScheduler};
pub use coordinator::{PauseState, SessionCoordinator};
pub use daily_limit::{DailyLimitService, DailyLimitStatus};
pub use error::{CompletionError, SessionError};
pub use identity::{ChallengeMachine, ChallengeOutcome, IdentityChallengeService, SubmitOutcome};
pub use idleness::{ActivityKind, IdlenessMonitor};
pub use progression::{CurrentLesson, ProgressionService, ProgressionState};
pub use runtime::SessionRuntime;
pub use time_accumulator::{TimeAccumulator, TimeTrackingService};
