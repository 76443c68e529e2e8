//! Error types for the ports the engine talks to.

use crate::task::TaskId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task store unavailable: {0}")]
    Unavailable(String),

    #[error("task {0} could not be saved: {1}")]
    Save(TaskId, String),
}

#[derive(Debug, thiserror::Error)]
pub enum WakeError {
    /// The platform refused the wake-up (e.g. permission revoked).
    #[error("wake-up rejected: {0}")]
    Rejected(String),

    /// The timer backend is gone (e.g. the run loop exited).
    #[error("wake-up backend closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("notification could not be shown: {0}")]
    Sink(String),
}
