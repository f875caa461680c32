//! Implementations of the ports (in-memory, for tests and the demo CLI).

pub mod inmem_store;

pub use inmem_store::InMemoryTaskStore;
