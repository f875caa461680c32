//! Execution layer: the executor, live task trees and their helpers.
//!
//! - **config**: construction-time executor settings
//! - **task**: the [`Task`] trait and the [`TaskRegistry`] of implementations
//! - **group**: [`SubTaskGroup`], a named batch with one concurrency policy
//! - **context**: [`TaskContext`], the capabilities handed to a running task
//! - **runnable**: [`RunnableTask`], one live tree and its group queue
//! - **executor**: [`TaskExecutor`], submission, abort and shutdown
//! - **cache**: [`TaskCache`], ephemeral per-tree progress hints
//! - **retry**: abort-aware polling and retry helpers

pub mod cache;
pub mod config;
pub mod context;
pub mod executor;
pub mod group;
pub mod retry;
pub mod runnable;
pub mod task;

pub use cache::TaskCache;
pub use config::ExecutorConfig;
pub use context::TaskContext;
pub use executor::TaskExecutor;
pub use group::SubTaskGroup;
pub use runnable::RunnableTask;
pub use task::{Task, TaskFactory, TaskRegistry};
