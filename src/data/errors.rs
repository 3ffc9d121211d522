//! Error types for the fact-graph knowledge base

use thiserror::Error;

/// Base error type for core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Embedding generation error: {0}")]
    EmbeddingError(String),

    #[error("Embedding dimension mismatch: cache has {cached}, model produces {model}")]
    DimensionMismatch { cached: usize, model: usize },

    #[error("Cache persistence error: {0}")]
    CacheError(String),

    #[error("Name resolution error: {0}")]
    ResolutionError(String),

    #[error("Graph store error: {0}")]
    Store(#[from] GraphStoreError),

    #[error("Serialization/Deserialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    ValidationError(String),

    #[error("Internal system error: {0}")]
    Internal(String),
}

/// Error type for the graph store boundary.
///
/// Variants are split along the lines the failure policy needs: schema
/// objects that already exist are a tolerated outcome, transient store
/// unavailability is retryable, and a missing capability selects a fallback
/// rather than aborting.
#[derive(Error, Debug)]
pub enum GraphStoreError {
    #[error("Graph store connection error: {0}")]
    ConnectionError(String),

    #[error("Schema object already exists: {0}")]
    SchemaAlreadyExists(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Dynamic relationship types unsupported: {0}")]
    DynamicEdgeTypesUnsupported(String),

    #[error("Vector index unavailable: {0}")]
    VectorIndexUnavailable(String),

    #[error("Transient store error: {0}")]
    Transient(String),

    #[error("Graph query execution error: {0}")]
    QueryError(String),

    #[error("Data mapping error from graph result: {0}")]
    MappingError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GraphStoreError {
    /// Transient errors are retried once before a batch is abandoned.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GraphStoreError::Transient(_) | GraphStoreError::ConnectionError(_)
        )
    }
}

/// Error type for the construction pipeline.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Schema creation failed: {0}")]
    Schema(GraphStoreError),

    #[error("Graph store operation failed: {0}")]
    Store(GraphStoreError),

    #[error("Batch {batch_index} failed; first unprocessed record at offset {first_unprocessed}")]
    Batch {
        batch_index: usize,
        first_unprocessed: usize,
        #[source]
        source: GraphStoreError,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_store_error_display() {
        let error = GraphStoreError::ConnectionError("connection refused".into());
        assert_eq!(
            format!("{}", error),
            "Graph store connection error: connection refused"
        );
    }

    #[test]
    fn test_transient_predicate() {
        assert!(GraphStoreError::Transient("timeout".into()).is_transient());
        assert!(GraphStoreError::ConnectionError("reset".into()).is_transient());
        assert!(!GraphStoreError::QueryError("bad query".into()).is_transient());
        assert!(!GraphStoreError::SchemaAlreadyExists("entity_name".into()).is_transient());
    }

    #[test]
    fn test_store_error_display_is_not_schema_flavored() {
        let error = BuildError::Store(GraphStoreError::Transient("timeout".into()));
        assert_eq!(
            format!("{}", error),
            "Graph store operation failed: Transient store error: timeout"
        );
    }

    #[test]
    fn test_batch_error_carries_resume_offset() {
        let error = BuildError::Batch {
            batch_index: 3,
            first_unprocessed: 3000,
            source: GraphStoreError::Transient("timeout".into()),
        };
        let rendered = format!("{}", error);
        assert!(rendered.contains("Batch 3"));
        assert!(rendered.contains("3000"));
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let error = CoreError::DimensionMismatch { cached: 768, model: 384 };
        assert_eq!(
            format!("{}", error),
            "Embedding dimension mismatch: cache has 768, model produces 384"
        );
    }
}
