//! Execution context handed to every running task.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{GroupType, StewardError, TaskId};
use crate::lock::ResourceLocks;
use crate::records::TaskRecords;

use super::cache::TaskCache;
use super::group::SubTaskGroup;
use super::runnable::RunnableTask;

/// Capabilities injected into a task implementation.
///
/// Carries the identifiers of this node and of the tree root, the submitted
/// params, and the shared services: record access, the resource lock table,
/// and the live tree for grouping, waiting and abort checks.
pub struct TaskContext {
    task_id: TaskId,
    root_id: TaskId,
    params: serde_json::Value,
    runnable: Arc<RunnableTask>,
    records: Arc<TaskRecords>,
    resources: Arc<ResourceLocks>,
}

impl TaskContext {
    pub(crate) fn new(
        task_id: TaskId,
        root_id: TaskId,
        params: serde_json::Value,
        runnable: Arc<RunnableTask>,
        records: Arc<TaskRecords>,
        resources: Arc<ResourceLocks>,
    ) -> Self {
        Self {
            task_id,
            root_id,
            params,
            runnable,
            records,
            resources,
        }
    }

    /// Identifier of this node's own record.
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Identifier of the user-facing task at the top of the tree.
    pub fn root_id(&self) -> TaskId {
        self.root_id
    }

    pub fn params(&self) -> &serde_json::Value {
        &self.params
    }

    pub fn records(&self) -> &TaskRecords {
        &self.records
    }

    pub fn resources(&self) -> &ResourceLocks {
        &self.resources
    }

    /// The live tree; retry helpers take this for abort-aware waiting.
    pub fn runnable(&self) -> &Arc<RunnableTask> {
        &self.runnable
    }

    pub fn task_cache(&self) -> &TaskCache {
        self.runnable.task_cache()
    }

    /// Abort-aware sleep; the only sanctioned way for a task to block on
    /// time. Returns `Cancelled` the moment the tree is aborted.
    pub async fn wait_for(&self, duration: Duration) -> Result<(), StewardError> {
        self.runnable.wait_for(duration).await
    }

    pub fn is_abort_requested(&self) -> bool {
        self.runnable.is_abort_requested()
    }

    /// New empty group; queue it with [`add_sub_task_group`](Self::add_sub_task_group).
    pub fn create_sub_task_group(
        &self,
        name: impl Into<String>,
        group_type: GroupType,
        ignore_errors: bool,
    ) -> SubTaskGroup {
        SubTaskGroup::new(name, group_type, ignore_errors)
    }

    pub async fn add_sub_task_group(&self, group: SubTaskGroup) {
        self.runnable.add_sub_task_group(group).await;
    }

    /// Clear queued groups; used when a task rebuilds its plan before
    /// re-queuing (e.g. retry after partial progress).
    pub async fn reset(&self) {
        self.runnable.reset().await;
    }

    /// Run all queued groups in order.
    pub async fn run_sub_tasks(&self) -> Result<(), StewardError> {
        self.runnable.run_sub_tasks().await
    }
}
