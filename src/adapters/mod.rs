//! Database adapters behind the [`GraphStore`](crate::traits::GraphStore)
//! contract.

#[cfg(feature = "adapters")]
mod neo4j_store;

#[cfg(feature = "adapters")]
pub use neo4j_store::{Neo4jConfig, Neo4jGraphStore};
