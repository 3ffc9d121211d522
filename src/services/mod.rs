//! Construction, query and retrieval services over the graph store.

mod builder;
mod query;
mod retrieval;

pub use builder::{BuilderConfig, GraphBuilder};
pub use query::{QueryEngine, MAX_HOPS};
pub use retrieval::{Retriever, DEFAULT_TOP_K, MAX_TOP_K, NO_RESULTS_SENTINEL};
