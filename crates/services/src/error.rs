//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;

/// Errors emitted when starting a course-playing session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("account is locked; manual unlock required")]
    AccountLocked,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by lesson completion.
///
/// Unlike the telemetry paths, completion propagates storage failures so the
/// caller can surface a "could not save progress" notification.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompletionError {
    #[error("lesson cannot be completed yet")]
    NotCompletable,
    #[error(transparent)]
    Storage(#[from] StorageError),
}
