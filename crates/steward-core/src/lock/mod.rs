//! Locking primitives: per-key exclusive locks and the resource lock that
//! serializes task trees touching the same cluster.

pub mod key_lock;
pub mod resource_lock;

pub use key_lock::{KeyLock, KeyLockGuard};
pub use resource_lock::{ANY_VERSION, ResourceLocks};
