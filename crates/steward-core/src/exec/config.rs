//! Executor configuration.

use std::time::Duration;

/// Construction-time configuration of a [`TaskExecutor`](super::TaskExecutor).
///
/// Injected explicitly so every test can build an isolated executor; there is
/// no ambient global configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Identifier of this process instance, stamped on every record it owns.
    pub owner: String,

    /// Upper bound on subtasks executing concurrently across all trees.
    pub pool_size: usize,

    /// How long `shutdown` waits for running trees before abandoning them.
    pub shutdown_grace: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            owner: format!("steward-{}", std::process::id()),
            pool_size: 16,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}
