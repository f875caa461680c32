//! Subtask group: a named batch of subtasks with one concurrency policy.

use std::sync::Arc;

use crate::domain::{GroupType, TaskType};

use super::task::Task;

/// One queued subtask with its params.
pub(crate) struct SubTaskUnit {
    pub(crate) task: Arc<dyn Task>,
    pub(crate) task_type: TaskType,
    pub(crate) params: serde_json::Value,
}

/// Ordered, named batch of subtasks.
///
/// Groups run serially in the order they are added to the tree; the subtasks
/// inside one group run concurrently up to the executor's pool bound and the
/// group completes only when every member has finished (full join barrier).
/// The group only sequences execution; each subtask's record carries its own
/// terminal state.
pub struct SubTaskGroup {
    name: String,
    group_type: GroupType,
    /// When true a failing member does not halt the group or the tree; the
    /// failure is still recorded on the member's record.
    ignore_errors: bool,
    pub(crate) sub_tasks: Vec<SubTaskUnit>,
}

impl SubTaskGroup {
    pub fn new(name: impl Into<String>, group_type: GroupType, ignore_errors: bool) -> Self {
        Self {
            name: name.into(),
            group_type,
            ignore_errors,
            sub_tasks: Vec::new(),
        }
    }

    /// Queue a subtask. Execution order inside the group is unspecified;
    /// work that depends on other work belongs in a later group.
    pub fn add_sub_task(&mut self, task: Arc<dyn Task>, params: serde_json::Value) {
        let task_type = task.task_type();
        self.sub_tasks.push(SubTaskUnit {
            task,
            task_type,
            params,
        });
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group_type(&self) -> &GroupType {
        &self.group_type
    }

    pub fn ignore_errors(&self) -> bool {
        self.ignore_errors
    }

    pub fn len(&self) -> usize {
        self.sub_tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sub_tasks.is_empty()
    }
}
