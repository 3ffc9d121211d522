//! Storage implementations of the [`GraphStore`](crate::traits::GraphStore)
//! contract.

mod memory;

pub use memory::MemoryGraphStore;
