//! Task trait and the registry of task implementations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{StewardError, TaskType};

use super::context::TaskContext;

/// One unit of administrative work, root or subtask.
///
/// Business logic lives behind this trait; the core only schedules, tracks
/// and cancels it. Shared capabilities (groups, waits, retries, the resource
/// lock, record access) come in through the [`TaskContext`] rather than a
/// base type.
#[async_trait]
pub trait Task: Send + Sync {
    /// The kind this implementation handles; stamped on its records.
    fn task_type(&self) -> TaskType;

    /// Check params before the tree starts. `is_first_try` is false when the
    /// submission continues a previous attempt.
    fn validate_params(
        &self,
        _params: &serde_json::Value,
        _is_first_try: bool,
    ) -> Result<(), StewardError> {
        Ok(())
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), StewardError>;
}

/// Builds a task instance from its submitted params.
pub type TaskFactory =
    Arc<dyn Fn(&serde_json::Value) -> Result<Arc<dyn Task>, StewardError> + Send + Sync>;

/// Registry of task implementations keyed by task type.
///
/// Built mutably during startup, then shared immutably behind an `Arc`; no
/// locking at dispatch time.
#[derive(Default)]
pub struct TaskRegistry {
    factories: HashMap<TaskType, TaskFactory>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory for a task type. Duplicate registration is a
    /// startup bug, not a last-wins overwrite.
    pub fn register(
        &mut self,
        task_type: TaskType,
        factory: TaskFactory,
    ) -> Result<(), StewardError> {
        if self.factories.contains_key(&task_type) {
            return Err(StewardError::DuplicateTaskType(task_type));
        }
        self.factories.insert(task_type, factory);
        Ok(())
    }

    /// Instantiate a task of the given type.
    pub fn create(
        &self,
        task_type: &TaskType,
        params: &serde_json::Value,
    ) -> Result<Arc<dyn Task>, StewardError> {
        let factory = self
            .factories
            .get(task_type)
            .ok_or_else(|| StewardError::InvalidTaskType(task_type.clone()))?;
        factory(params)
    }

    pub fn contains(&self, task_type: &TaskType) -> bool {
        self.factories.contains_key(task_type)
    }

    pub fn registered_types(&self) -> Vec<TaskType> {
        self.factories.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
