use futures::task::SpawnError;
use thiserror::Error;

use crate::task::TaskId;

/// Errors returned by [`Scheduler`](crate::Scheduler) and [`Task`](crate::Task)
/// construction.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The task parameters are not usable, for example a zero interval.
    #[error("invalid task configuration: {0}")]
    InvalidConfiguration(String),

    /// The task is not live in the scheduler, it either terminated already or
    /// was never scheduled.
    #[error("task with id: {id} cannot be stopped, because it was not found")]
    NotFound { id: TaskId },

    /// A live task already uses this identifier.
    #[error("task with id: {id} is already scheduled")]
    DuplicateId { id: TaskId },

    /// The executor refused the execution loop of a task.
    #[error("failed to spawn task execution loop: {0}")]
    Spawn(#[from] SpawnError),

    /// The executor or the timer driver could not be started.
    #[error("failed to start scheduler runtime: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;
