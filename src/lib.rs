//! Property-graph knowledge base of factual triples with vector retrieval.
//!
//! The pipeline: raw (head, relation, tail) triples are canonicalized and
//! deduplicated, embedded through a persistent cache, and written into a
//! graph store as Entity and Fact nodes. Retrieval embeds a query, searches
//! the fact vector index, and formats the hits as a prompt context fragment.

// Core modules
pub mod canonical;
pub mod data;
pub mod embedding;
pub mod services;
pub mod storage;
pub mod traits;

// Implementation adapters (optional, can be provided externally)
pub mod adapters;

// Re-export key types for convenient usage
pub use data::errors::{BuildError, CoreError, GraphStoreError};
pub use data::trace_context::TraceContext;
pub use data::types::{
    BuildReport, EdgeStrategy, EntitySearchResult, FactRecord, FactUpsert, GraphStatistics,
    HopFact, NeighborResult, RawTriple, RetrievalMetadata, RetrievalResult, SchemaOutcome,
    ScoredFact,
};

// Re-export core traits
pub use traits::{GraphStore, NameResolver};

// Re-export canonicalization
pub use canonical::{Canonicalizer, FileNameResolver};

// Re-export embedding services
#[cfg(feature = "embed-openai")]
pub use embedding::OpenAiEmbeddingService;
pub use embedding::{
    create_embedding_service, EmbeddingCache, EmbeddingCacheConfig, EmbeddingService,
    EmbeddingServiceConfig, MockEmbeddingService, DEFAULT_EMBEDDING_DIMENSION,
};

// Re-export stores
#[cfg(feature = "adapters")]
pub use adapters::{Neo4jConfig, Neo4jGraphStore};
pub use storage::MemoryGraphStore;

// Re-export core services
pub use services::{
    BuilderConfig, GraphBuilder, QueryEngine, Retriever, DEFAULT_TOP_K, MAX_HOPS, MAX_TOP_K,
    NO_RESULTS_SENTINEL,
};

/// Initialize tracing for the knowledge base.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
