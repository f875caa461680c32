//! Task type: names which task implementation produced a record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Enumerated-by-convention task kind, e.g. `"cluster.create.v1"`.
///
/// Kept as a string newtype so the core never has to change when a new
/// administrative operation is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Label bucketing subtasks into user-facing phases.
///
/// Independent of execution order within a group; the same label may appear
/// in several `SubTaskGroup`s of one tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupType(String);

impl GroupType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
