//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur during scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("state store error: {0}")]
    State(#[from] beacon_state::StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
