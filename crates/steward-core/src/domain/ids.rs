//! Strongly-typed identifiers.
//!
//! ULID-based so identifiers sort by creation time and can be generated on
//! any node without coordination. A phantom marker type keeps the different
//! identifier kinds from being mixed up at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for identifier kinds.
///
/// Provides the prefix used by `Display` (e.g. "task-", "resource-").
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic identifier over a marker type.
///
/// `T` is `PhantomData`: zero-sized at runtime, but a `TaskId` can never be
/// passed where a `ResourceId` is expected.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Marker for task records (root tasks and subtasks alike).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKey {}

impl IdMarker for TaskKey {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Marker for guarded cluster resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {}

impl IdMarker for ResourceKey {
    fn prefix() -> &'static str {
        "resource-"
    }
}

/// Identifier of a task record, root or subtask.
pub type TaskId = Id<TaskKey>;

/// Identifier of a cluster resource guarded by the exclusive lock.
pub type ResourceId = Id<ResourceKey>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_kind_prefix() {
        let task = TaskId::generate();
        let resource = ResourceId::generate();

        assert!(task.to_string().starts_with("task-"));
        assert!(resource.to_string().starts_with("resource-"));
        // The whole point: you can't accidentally mix these types.
        // let _: TaskId = resource; // <- does not compile
    }

    #[test]
    fn ids_sort_by_creation_time() {
        let id1 = TaskId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = TaskId::generate();

        assert!(id1 < id2);
    }

    #[test]
    fn ids_round_trip_through_serde() {
        let id = TaskId::generate();
        let serialized = serde_json::to_string(&id).unwrap();
        let deserialized: TaskId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn marker_adds_no_size() {
        use std::mem::size_of;
        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
        assert_eq!(size_of::<ResourceId>(), size_of::<Ulid>());
    }
}
