//! Generic per-key exclusive lock.
//!
//! Serializes access to a shared identifier (one task record, one cluster)
//! without a table-wide lock: contention on key A never blocks key B. Lock
//! entries are created on demand and reclaimed once the last holder or
//! waiter is gone, so the table does not grow with historic keys.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

struct Entry {
    lock: Arc<AsyncMutex<()>>,
    /// Current holder plus waiters; the entry is removed when this reaches 0.
    interested: usize,
}

/// Exclusive lock keyed by `K`. Cheap to share behind an `Arc`.
pub struct KeyLock<K: Eq + Hash + Clone> {
    entries: Mutex<HashMap<K, Entry>>,
}

impl<K: Eq + Hash + Clone> Default for KeyLock<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> KeyLock<K> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the lock for `key`, waiting if another holder has it.
    ///
    /// The lock is released when the returned guard drops.
    pub async fn acquire(&self, key: K) -> KeyLockGuard<'_, K> {
        let lock = {
            let mut entries = self.entries.lock().expect("key lock table poisoned");
            let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
                lock: Arc::new(AsyncMutex::new(())),
                interested: 0,
            });
            entry.interested += 1;
            Arc::clone(&entry.lock)
        };
        // Await outside the table lock so waiting on one key never blocks
        // acquisition on another.
        let guard = lock.lock_owned().await;
        KeyLockGuard {
            key,
            table: self,
            guard: Some(guard),
        }
    }

    /// Number of keys with a holder or waiter. Used by tests to check
    /// entries are reclaimed.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("key lock table poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Guard holding the exclusive lock for one key.
pub struct KeyLockGuard<'a, K: Eq + Hash + Clone> {
    key: K,
    table: &'a KeyLock<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyLockGuard<'_, K> {
    fn drop(&mut self) {
        // Release the mutex first so a queued waiter proceeds, then drop our
        // interest; the entry survives as long as anyone still wants it.
        self.guard.take();
        let mut entries = self.table.entries.lock().expect("key lock table poisoned");
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.interested -= 1;
            if entry.interested == 0 {
                entries.remove(&self.key);
            }
        }
    }
}
