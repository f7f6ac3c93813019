//! Error types for the task scheduler.

use crate::scheduler::TaskId;

/// Errors returned by [`TaskManager`](crate::TaskManager) operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The identifier does not belong to a live task (fired, canceled, or never existed).
    #[error("invalid task id: {0}")]
    InvalidIdentifier(TaskId),

    /// The identifier supplier could not produce a value.
    #[error("failed to generate id for task: {0}")]
    IdGeneration(String),

    /// The registry already holds a record under this identifier.
    #[error("task id already registered: {0}")]
    IdCollision(TaskId),

    /// A duration was rejected (e.g. a zero period for a recurring task).
    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    /// No tokio runtime was available to run the task's control loop.
    #[error("no tokio runtime available: {0}")]
    Runtime(String),

    /// The manager was shut down and accepts no new tasks.
    #[error("task manager has been shut down")]
    ShutDown,

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, TaskError>;
