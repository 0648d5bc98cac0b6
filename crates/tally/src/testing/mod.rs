//! Test support shared by unit and integration tests

mod memory_store;

pub use memory_store::{CallCounts, MemoryFileStore};
