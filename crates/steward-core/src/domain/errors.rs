//! Error taxonomy of the orchestration core.

use thiserror::Error;

use super::ids::{ResourceId, TaskId};
use super::task_type::TaskType;

#[derive(Debug, Clone, Error)]
pub enum StewardError {
    #[error("no task implementation registered for task_type={0}")]
    InvalidTaskType(TaskType),

    #[error("task implementation already registered for task_type={0}")]
    DuplicateTaskType(TaskType),

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("resource {0} is already locked by another task")]
    AlreadyLocked(ResourceId),

    #[error(
        "resource {resource} version is {actual}, expected {expected}; refusing stale update"
    )]
    ConcurrentModification {
        resource: ResourceId,
        expected: u64,
        actual: u64,
    },

    #[error("subtask {task_id} ({task_type}) failed: {message}")]
    SubtaskFailure {
        task_id: TaskId,
        task_type: TaskType,
        message: String,
    },

    #[error("task {0} was cancelled")]
    Cancelled(TaskId),

    #[error("task store: {0}")]
    Store(String),

    #[error("{0}")]
    Other(String),
}

impl StewardError {
    /// Cancellation must be told apart from failure: the catcher releases
    /// the resource lock and marks records Aborted, not Failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StewardError::Cancelled(_))
    }
}
