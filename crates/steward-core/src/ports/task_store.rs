//! TaskStore port: durable storage of task records.

use async_trait::async_trait;

use crate::domain::{StewardError, TaskId, TaskRecord, TaskState, TaskType};

/// Source of truth for persisted task records.
///
/// The store itself carries no transition rules; it persists whole records.
/// Single-record atomicity is all that is required of an implementation:
/// the lost-update protection callers need is provided by
/// [`TaskRecords::update_in_txn`](crate::records::TaskRecords::update_in_txn),
/// which serializes writers per identifier before calling `save`.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a freshly created record.
    async fn insert(&self, record: TaskRecord) -> Result<(), StewardError>;

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StewardError>;

    /// Overwrite an existing record.
    async fn save(&self, record: TaskRecord) -> Result<(), StewardError>;

    /// Children of `parent`, ordered by position.
    async fn sub_tasks(&self, parent: TaskId) -> Result<Vec<TaskRecord>, StewardError>;

    /// Maintenance scan: records of one type in any of the given states
    /// (e.g. finding stuck tasks of a kind).
    async fn find_by_type_and_state(
        &self,
        task_type: &TaskType,
        states: &[TaskState],
    ) -> Result<Vec<TaskRecord>, StewardError>;
}
