//! Persisted task state machine and the phase-aggregation precedence rule.

use serde::{Deserialize, Serialize};

/// State of a task record, root or subtask.
///
/// Transitions:
/// - Created -> Initializing -> Running -> Success | Failure
/// - any non-terminal state -> Abort -> Aborted (on cancellation)
/// - Unknown is a sentinel for externally-observed indeterminate state
///   (owner process died); normal execution never sets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Created,
    Initializing,
    Running,
    Success,
    Failure,
    Unknown,
    Abort,
    Aborted,
}

impl TaskState {
    /// Precedence used to pick the displayed state for an aggregated phase.
    ///
    /// The ranking is a display rule, not a lifecycle ordering: a single
    /// failing leaf must win over many successful ones.
    pub fn precedence(self) -> u8 {
        match self {
            TaskState::Unknown => 0,
            TaskState::Initializing => 1,
            TaskState::Success => 2,
            TaskState::Created => 3,
            TaskState::Running => 4,
            TaskState::Abort => 5,
            TaskState::Aborted => 6,
            TaskState::Failure => 7,
        }
    }

    /// Position in the forward lifecycle, used to refuse backwards moves.
    ///
    /// Distinct from [`precedence`](Self::precedence), which is a display
    /// rule. `Unknown` shares the starting stage so a record recovered from
    /// an indeterminate state can re-enter the lifecycle anywhere.
    pub fn lifecycle_stage(self) -> u8 {
        match self {
            TaskState::Unknown | TaskState::Created => 0,
            TaskState::Initializing => 1,
            TaskState::Running => 2,
            TaskState::Abort => 3,
            TaskState::Success | TaskState::Failure | TaskState::Aborted => 4,
        }
    }

    /// Terminal states never change once persisted.
    pub fn is_completed(self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Failure | TaskState::Aborted
        )
    }

    /// States carrying an error in the record details.
    pub fn is_error(self) -> bool {
        matches!(self, TaskState::Failure | TaskState::Aborted)
    }

    /// States a live tree can still act on.
    pub fn is_incomplete(self) -> bool {
        matches!(
            self,
            TaskState::Created | TaskState::Initializing | TaskState::Running | TaskState::Abort
        )
    }
}

/// Merge one leaf state into a phase bucket's displayed state.
///
/// Pure function so every transition pair is directly testable. The incoming
/// state wins only when it outranks the current one. One deliberate override:
/// a bucket already shown as `Success` receiving a freshly `Created` leaf is
/// promoted to `Running` instead, so the display never looks like progress
/// reverted. Do not generalize this override to other pairs.
pub fn merge_phase_state(current: TaskState, incoming: TaskState) -> TaskState {
    if incoming.precedence() <= current.precedence() {
        return current;
    }
    if current == TaskState::Success && incoming == TaskState::Created {
        return TaskState::Running;
    }
    incoming
}
