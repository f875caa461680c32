//! Resource exclusive lock: at most one task tree mutates a cluster at a time.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::{ResourceId, StewardError, TaskId};

/// Sentinel for [`ResourceLocks::lock`]: skip the optimistic version check.
pub const ANY_VERSION: i64 = -1;

#[derive(Debug, Default)]
struct ResourceEntry {
    version: u64,
    update_in_progress: bool,
    holder: Option<TaskId>,
    /// `Some(false)` after a failed update: the resource needs reconciliation
    /// (this core never rolls back; the task must leave the resource in a
    /// recoverable state before unlocking).
    last_update_succeeded: Option<bool>,
}

/// Registry of per-resource exclusive locks with optimistic version checks.
///
/// One instance per executor, dependency-injected; tests build their own.
#[derive(Default)]
pub struct ResourceLocks {
    entries: Mutex<HashMap<ResourceId, ResourceEntry>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `resource` as update-in-progress on behalf of `task`.
    ///
    /// `expected_version` is the version the caller last read; the lock is
    /// refused with `ConcurrentModification` when the resource has moved past
    /// it, and with `AlreadyLocked` when another tree holds it. Pass
    /// [`ANY_VERSION`] to skip the version check. On success the version is
    /// bumped and the previous version returned for CAS-style release.
    pub async fn lock(
        &self,
        resource: ResourceId,
        task: TaskId,
        expected_version: i64,
    ) -> Result<u64, StewardError> {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(resource).or_default();

        if entry.update_in_progress {
            warn!(%resource, %task, holder = ?entry.holder, "resource already locked");
            return Err(StewardError::AlreadyLocked(resource));
        }
        if expected_version >= 0 && entry.version != expected_version as u64 {
            return Err(StewardError::ConcurrentModification {
                resource,
                expected: expected_version as u64,
                actual: entry.version,
            });
        }

        let previous = entry.version;
        entry.version += 1;
        entry.update_in_progress = true;
        entry.holder = Some(task);
        entry.last_update_succeeded = None;
        info!(%resource, %task, version = entry.version, "locked resource for update");
        Ok(previous)
    }

    /// Clear the update-in-progress marker.
    ///
    /// Idempotent: a tree unlocking on more than one exit path is harmless.
    /// `success = false` leaves the resource flagged as needing
    /// reconciliation.
    pub async fn unlock(&self, resource: ResourceId, success: bool) -> Result<(), StewardError> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(&resource) else {
            return Ok(());
        };
        if !entry.update_in_progress {
            return Ok(());
        }
        entry.update_in_progress = false;
        entry.holder = None;
        entry.last_update_succeeded = Some(success);
        info!(%resource, success, "unlocked resource");
        Ok(())
    }

    pub async fn version(&self, resource: ResourceId) -> u64 {
        let entries = self.entries.lock().await;
        entries.get(&resource).map(|e| e.version).unwrap_or(0)
    }

    pub async fn is_locked(&self, resource: ResourceId) -> bool {
        let entries = self.entries.lock().await;
        entries
            .get(&resource)
            .map(|e| e.update_in_progress)
            .unwrap_or(false)
    }

    /// True after an unlock with `success = false`, until the next lock.
    pub async fn needs_reconciliation(&self, resource: ResourceId) -> bool {
        let entries = self.entries.lock().await;
        entries
            .get(&resource)
            .map(|e| e.last_update_succeeded == Some(false))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn second_lock_fails_until_unlock() {
        let locks = ResourceLocks::new();
        let resource = ResourceId::generate();
        let t1 = TaskId::generate();
        let t2 = TaskId::generate();

        locks.lock(resource, t1, ANY_VERSION).await.unwrap();
        let err = locks.lock(resource, t2, ANY_VERSION).await.unwrap_err();
        assert!(matches!(err, StewardError::AlreadyLocked(r) if r == resource));

        locks.unlock(resource, true).await.unwrap();
        locks.lock(resource, t2, ANY_VERSION).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_lock_has_exactly_one_winner() {
        let locks = Arc::new(ResourceLocks::new());
        let resource = ResourceId::generate();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let locks = Arc::clone(&locks);
            handles.push(tokio::spawn(async move {
                locks.lock(resource, TaskId::generate(), ANY_VERSION).await
            }));
        }
        let mut wins = 0;
        let mut already_locked = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(StewardError::AlreadyLocked(_)) => already_locked += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!((wins, already_locked), (1, 1));
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let locks = ResourceLocks::new();
        let resource = ResourceId::generate();
        let t1 = TaskId::generate();

        let previous = locks.lock(resource, t1, 0).await.unwrap();
        assert_eq!(previous, 0);
        locks.unlock(resource, true).await.unwrap();

        // Version advanced to 1; a caller still expecting 0 is stale.
        let err = locks
            .lock(resource, TaskId::generate(), 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StewardError::ConcurrentModification {
                expected: 0,
                actual: 1,
                ..
            }
        ));

        locks.lock(resource, TaskId::generate(), 1).await.unwrap();
    }

    #[tokio::test]
    async fn failed_unlock_flags_reconciliation() {
        let locks = ResourceLocks::new();
        let resource = ResourceId::generate();

        locks
            .lock(resource, TaskId::generate(), ANY_VERSION)
            .await
            .unwrap();
        locks.unlock(resource, false).await.unwrap();

        assert!(!locks.is_locked(resource).await);
        assert!(locks.needs_reconciliation(resource).await);

        // The flag clears on the next successful cycle.
        locks
            .lock(resource, TaskId::generate(), ANY_VERSION)
            .await
            .unwrap();
        locks.unlock(resource, true).await.unwrap();
        assert!(!locks.needs_reconciliation(resource).await);
    }

    #[tokio::test]
    async fn unlock_is_idempotent() {
        let locks = ResourceLocks::new();
        let resource = ResourceId::generate();

        locks.unlock(resource, true).await.unwrap();
        locks
            .lock(resource, TaskId::generate(), ANY_VERSION)
            .await
            .unwrap();
        locks.unlock(resource, true).await.unwrap();
        locks.unlock(resource, true).await.unwrap();
        assert!(!locks.is_locked(resource).await);
    }
}
