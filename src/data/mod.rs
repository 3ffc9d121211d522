//! Data model: typed records, errors, trace context.

pub mod errors;
pub mod trace_context;
pub mod types;

pub use errors::{BuildError, CoreError, GraphStoreError};
pub use trace_context::TraceContext;
pub use types::{
    BuildReport, EdgeStrategy, EntitySearchResult, FactRecord, FactUpsert, GraphStatistics,
    HopFact, NeighborResult, RawTriple, RetrievalMetadata, RetrievalResult, SchemaOutcome,
    ScoredFact,
};
