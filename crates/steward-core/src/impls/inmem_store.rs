//! In-memory TaskStore.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{StewardError, TaskId, TaskRecord, TaskState, TaskType};
use crate::ports::TaskStore;

/// HashMap-backed store. Each call holds the map lock for the duration of
/// one read or write, which gives the single-record atomicity the port asks
/// for.
#[derive(Default)]
pub struct InMemoryTaskStore {
    records: Mutex<HashMap<TaskId, TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, record: TaskRecord) -> Result<(), StewardError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.id) {
            return Err(StewardError::Store(format!(
                "duplicate task record {}",
                record.id
            )));
        }
        records.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StewardError> {
        let records = self.records.lock().await;
        Ok(records.get(&id).cloned())
    }

    async fn save(&self, record: TaskRecord) -> Result<(), StewardError> {
        let mut records = self.records.lock().await;
        if !records.contains_key(&record.id) {
            return Err(StewardError::Store(format!(
                "save of unknown task record {}",
                record.id
            )));
        }
        records.insert(record.id, record);
        Ok(())
    }

    async fn sub_tasks(&self, parent: TaskId) -> Result<Vec<TaskRecord>, StewardError> {
        let records = self.records.lock().await;
        let mut children: Vec<TaskRecord> = records
            .values()
            .filter(|r| r.parent_id == Some(parent))
            .cloned()
            .collect();
        children.sort_by_key(|r| r.position);
        Ok(children)
    }

    async fn find_by_type_and_state(
        &self,
        task_type: &TaskType,
        states: &[TaskState],
    ) -> Result<Vec<TaskRecord>, StewardError> {
        let records = self.records.lock().await;
        Ok(records
            .values()
            .filter(|r| &r.task_type == task_type && states.contains(&r.state))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GroupType;

    fn record(task_type: &str) -> TaskRecord {
        TaskRecord::new(
            TaskId::generate(),
            TaskType::new(task_type),
            serde_json::json!({}),
            "owner-1".to_string(),
        )
    }

    #[tokio::test]
    async fn insert_then_get() {
        let store = InMemoryTaskStore::new();
        let r = record("test.noop.v1");
        let id = r.id;

        store.insert(r).await.unwrap();
        let loaded = store.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.id, id);
    }

    #[tokio::test]
    async fn double_insert_is_rejected() {
        let store = InMemoryTaskStore::new();
        let r = record("test.noop.v1");

        store.insert(r.clone()).await.unwrap();
        assert!(store.insert(r).await.is_err());
    }

    #[tokio::test]
    async fn save_requires_existing_record() {
        let store = InMemoryTaskStore::new();
        assert!(store.save(record("test.noop.v1")).await.is_err());
    }

    #[tokio::test]
    async fn sub_tasks_come_back_in_position_order() {
        let store = InMemoryTaskStore::new();
        let parent = record("test.root.v1");
        let parent_id = parent.id;
        store.insert(parent).await.unwrap();

        for position in [2u32, 0, 1] {
            let child = TaskRecord::new_sub_task(
                TaskId::generate(),
                parent_id,
                position,
                TaskType::new("test.noop.v1"),
                GroupType::new("A"),
                serde_json::json!({}),
                "owner-1".to_string(),
            );
            store.insert(child).await.unwrap();
        }

        let children = store.sub_tasks(parent_id).await.unwrap();
        let positions: Vec<u32> = children.iter().filter_map(|r| r.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn find_by_type_and_state_filters_both() {
        let store = InMemoryTaskStore::new();
        let mut a = record("test.scan.v1");
        a.state = TaskState::Running;
        let b = record("test.scan.v1");
        let c = record("test.other.v1");
        store.insert(a).await.unwrap();
        store.insert(b).await.unwrap();
        store.insert(c).await.unwrap();

        let hits = store
            .find_by_type_and_state(&TaskType::new("test.scan.v1"), &[TaskState::Running])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].state, TaskState::Running);
    }
}
