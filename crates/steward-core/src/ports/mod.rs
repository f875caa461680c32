//! Ports: the boundaries this core consumes but does not implement.
//!
//! Persistence lives behind [`TaskStore`]; the production control plane backs
//! it with its database, tests and the demo CLI use the in-memory
//! implementation from `impls`.

pub mod task_store;

pub use task_store::TaskStore;
