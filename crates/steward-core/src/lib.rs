//! steward-core
//!
//! Orchestration core for long-running administrative operations over
//! database clusters: hierarchical tasks with durable records, phase-level
//! progress reporting, cooperative cancellation and per-resource exclusive
//! locking.
//!
//! # Module map
//! - **domain**: model types (ids, task_type, state, record, phase, errors)
//! - **ports**: abstraction seams ([`ports::TaskStore`])
//! - **impls**: development implementations ([`impls::InMemoryTaskStore`])
//! - **lock**: per-identifier mutual exclusion and the resource lock table
//! - **records**: the sanctioned mutation and query paths over a store
//! - **exec**: the executor, live task trees, groups, retries
//!
//! A task implementation lives behind [`exec::Task`]; the executor persists a
//! record per node, runs queued subtask groups strictly in order and reports
//! progress as one entry per phase. Everything is dependency-injected; there
//! are no globals.

pub mod domain;
pub mod exec;
pub mod impls;
pub mod lock;
pub mod ports;
pub mod records;
