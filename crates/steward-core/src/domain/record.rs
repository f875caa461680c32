//! Durable task record: one row per task node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::state::TaskState;
use super::task_type::{GroupType, TaskType};

/// Classification of a recorded error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Generic execution failure of the task's own logic.
    InternalError,
    /// The tree observed an abort signal.
    Cancelled,
    /// The owning process shut down before the task finished.
    PlatformShutdown,
}

/// Last error of a failed or aborted task, code plus message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub code: ErrorCode,
    pub message: String,
}

impl TaskError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Mutable execution details of a record.
///
/// `runtime_info` is an opaque blob a task writes to continue idempotently
/// on retry; it is inherited into the record of the next attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDetails {
    pub error: Option<TaskError>,
    pub version: String,
    pub runtime_info: Option<serde_json::Value>,
}

/// Durable record of one task node, root or subtask.
///
/// Single source of truth for task state. Parent/position fields form the
/// tree; child records are never embedded in their parent, all traversal is
/// by query so siblings can be mutated concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,

    /// Owning task; absent for root (user-facing) tasks.
    pub parent_id: Option<TaskId>,

    /// Zero-based order among siblings; absent for roots. Unique per parent.
    pub position: Option<u32>,

    pub task_type: TaskType,
    pub state: TaskState,

    /// Phase label for display aggregation; absent for roots.
    pub group_type: Option<GroupType>,

    /// 0..=100, self-reported or derived.
    pub percent_done: u8,

    /// Opaque input, write-once at creation.
    pub params: serde_json::Value,

    pub details: TaskDetails,

    /// Process instance currently owning this record.
    pub owner: String,

    pub created_at: DateTime<Utc>,

    /// Bumped on every mutation, heartbeats included.
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(id: TaskId, task_type: TaskType, params: serde_json::Value, owner: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            parent_id: None,
            position: None,
            task_type,
            state: TaskState::Created,
            group_type: None,
            percent_done: 0,
            params,
            details: TaskDetails::default(),
            owner,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a subtask record under `parent_id` at the given position.
    pub fn new_sub_task(
        id: TaskId,
        parent_id: TaskId,
        position: u32,
        task_type: TaskType,
        group_type: GroupType,
        params: serde_json::Value,
        owner: String,
    ) -> Self {
        let mut record = Self::new(id, task_type, params, owner);
        record.parent_id = Some(parent_id);
        record.position = Some(position);
        record.group_type = Some(group_type);
        record
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move to `next`, refusing terminal exits and backwards moves.
    ///
    /// Returns false (and leaves the record unchanged) when the record has
    /// already completed, or when `next` does not advance the lifecycle;
    /// terminal states are immutable and states only move forward.
    pub fn transition(&mut self, next: TaskState) -> bool {
        if self.state.is_completed() {
            return false;
        }
        if next.lifecycle_stage() <= self.state.lifecycle_stage() {
            return false;
        }
        self.state = next;
        if next == TaskState::Success {
            self.percent_done = 100;
        }
        self.touch();
        true
    }

    /// Record an error; callers transition to Failure/Aborted alongside.
    pub fn set_error(&mut self, error: TaskError) {
        self.details.error = Some(error);
        self.touch();
    }

    pub fn error(&self) -> Option<&TaskError> {
        if self.state == TaskState::Success {
            return None;
        }
        self.details.error.as_ref()
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.details.version = version.into();
        self.touch();
    }

    pub fn set_runtime_info(&mut self, info: serde_json::Value) {
        self.details.runtime_info = Some(info);
        self.touch();
    }

    pub fn runtime_info(&self) -> Option<&serde_json::Value> {
        self.details.runtime_info.as_ref()
    }

    /// Carry runtime info over from the previous attempt's record so the
    /// retried task can continue where it left off.
    pub fn inherit(&mut self, previous: &TaskRecord) {
        self.details.runtime_info = previous.details.runtime_info.clone();
        self.touch();
    }

    pub fn has_completed(&self) -> bool {
        self.state.is_completed()
    }
}
