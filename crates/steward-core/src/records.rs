//! Record service: the sanctioned mutation and query paths over a TaskStore.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::domain::{
    PhaseProgress, StewardError, TaskId, TaskRecord, aggregate_phases,
};
use crate::lock::KeyLock;
use crate::ports::TaskStore;

/// Access layer for persisted task records.
///
/// All concurrent writers to one record (heartbeats, error-setting,
/// completion) go through [`update_in_txn`](Self::update_in_txn); writing to
/// the store directly bypasses the per-identifier lock and reintroduces the
/// lost-update race.
pub struct TaskRecords {
    store: Arc<dyn TaskStore>,
    lock: KeyLock<TaskId>,
}

impl TaskRecords {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            lock: KeyLock::new(),
        }
    }

    /// Insert a freshly created record. The only path that does not need the
    /// per-identifier lock: nobody else can know the id yet.
    pub async fn create(&self, record: TaskRecord) -> Result<(), StewardError> {
        self.store.insert(record).await
    }

    pub async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StewardError> {
        self.store.get(id).await
    }

    pub async fn get_or_not_found(&self, id: TaskId) -> Result<TaskRecord, StewardError> {
        self.store
            .get(id)
            .await?
            .ok_or(StewardError::NotFound(id))
    }

    /// Atomic read-modify-write of one record.
    ///
    /// The per-identifier lock is held across the read, the update, and the
    /// persist; holding it only around the in-memory update would lose
    /// concurrent writes.
    pub async fn update_in_txn<F>(
        &self,
        id: TaskId,
        updater: F,
    ) -> Result<TaskRecord, StewardError>
    where
        F: FnOnce(&mut TaskRecord) + Send,
    {
        let _guard = self.lock.acquire(id).await;
        let mut record = self.get_or_not_found(id).await?;
        updater(&mut record);
        record.updated_at = Utc::now();
        self.store.save(record.clone()).await?;
        debug!(task = %id, state = ?record.state, "task record updated");
        Ok(record)
    }

    /// Children of `parent`, ordered by position.
    pub async fn sub_tasks(&self, parent: TaskId) -> Result<Vec<TaskRecord>, StewardError> {
        self.store.sub_tasks(parent).await
    }

    /// Children still in a non-terminal state (used by abort handling).
    pub async fn incomplete_sub_tasks(
        &self,
        parent: TaskId,
    ) -> Result<Vec<TaskRecord>, StewardError> {
        let mut children = self.store.sub_tasks(parent).await?;
        children.retain(|r| r.state.is_incomplete());
        Ok(children)
    }

    /// Maintenance scan: records of one type in any of the given states.
    pub async fn find_by_type_and_state(
        &self,
        task_type: &crate::domain::TaskType,
        states: &[crate::domain::TaskState],
    ) -> Result<Vec<TaskRecord>, StewardError> {
        self.store.find_by_type_and_state(task_type, states).await
    }

    /// Aggregate completion across subtasks, 0.0..=100.0.
    ///
    /// A parent that has itself reached Success reports 100.0 no matter what
    /// its subtask records say.
    pub async fn percent_completed(&self, id: TaskId) -> Result<f64, StewardError> {
        let record = self.get_or_not_found(id).await?;
        if record.state == crate::domain::TaskState::Success {
            return Ok(100.0);
        }
        let sub_tasks = self.store.sub_tasks(id).await?;
        if sub_tasks.is_empty() {
            return Ok(0.0);
        }
        let succeeded = sub_tasks
            .iter()
            .filter(|r| r.state == crate::domain::TaskState::Success)
            .count();
        Ok(succeeded as f64 * 100.0 / sub_tasks.len() as f64)
    }

    /// User-facing phase list for a root task, with optional progress hints
    /// keyed by subtask id (from the tree's task cache).
    ///
    /// Meaningful on the root of a tree; on a leaf it simply returns an
    /// empty list.
    pub async fn user_task_details(
        &self,
        id: TaskId,
        hints: &HashMap<TaskId, serde_json::Value>,
    ) -> Result<Vec<PhaseProgress>, StewardError> {
        let sub_tasks = self.store.sub_tasks(id).await?;
        Ok(aggregate_phases(&sub_tasks, hints))
    }
}
