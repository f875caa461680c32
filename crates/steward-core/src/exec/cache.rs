//! Task cache: ephemeral progress hints, one store per task tree.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::domain::TaskId;

/// Best-effort map of subtask id to an opaque progress blob.
///
/// Lifetime is bounded by the owning RunnableTask and nothing here is
/// authoritative: hints are merged into the user-facing phase view and lost
/// on restart. Never use this as a correctness-critical store.
#[derive(Clone, Default)]
pub struct TaskCache {
    inner: Arc<Mutex<HashMap<TaskId, serde_json::Value>>>,
}

impl TaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, task_id: TaskId, data: serde_json::Value) {
        let mut inner = self.inner.lock().expect("task cache poisoned");
        inner.insert(task_id, data);
    }

    pub fn get(&self, task_id: TaskId) -> Option<serde_json::Value> {
        let inner = self.inner.lock().expect("task cache poisoned");
        inner.get(&task_id).cloned()
    }

    /// Snapshot for phase aggregation.
    pub fn snapshot(&self) -> HashMap<TaskId, serde_json::Value> {
        let inner = self.inner.lock().expect("task cache poisoned");
        inner.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("task cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
