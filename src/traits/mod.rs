//! Core trait definitions: the graph-store capability contract and the
//! name-resolution collaborator.

pub mod graph_store;
pub mod name_resolver;

pub use graph_store::GraphStore;
pub use name_resolver::NameResolver;
