//! GraphStore trait definition for graph database interaction

use async_trait::async_trait;

use crate::data::{
    errors::GraphStoreError,
    trace_context::TraceContext,
    types::{
        EdgeStrategy, EntitySearchResult, FactUpsert, GraphStatistics, HopFact, NeighborResult,
        SchemaOutcome, ScoredFact,
    },
};

/// Capability contract for the underlying graph store.
///
/// This abstracts the database technology (e.g. Neo4j) behind the operations
/// the construction pipeline and query engine actually need: key-based
/// upserts, idempotent schema DDL, an approximate-nearest-neighbor vector
/// index, and bounded traversal. Implementations return typed records, never
/// raw store rows.
///
/// All query-side methods are read-only and safe to call concurrently.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Removes all nodes and edges. Destructive; schema objects survive.
    /// Used only as an explicit precondition of a full rebuild.
    async fn clear(&self, ctx: &TraceContext) -> Result<(), GraphStoreError>;

    /// Ensures a uniqueness constraint on `label.property` exists.
    async fn ensure_unique_constraint(
        &self,
        label: &str,
        property: &str,
        ctx: &TraceContext,
    ) -> Result<SchemaOutcome, GraphStoreError>;

    /// Ensures a secondary index on `label.property` exists.
    async fn ensure_index(
        &self,
        label: &str,
        property: &str,
        ctx: &TraceContext,
    ) -> Result<SchemaOutcome, GraphStoreError>;

    /// Ensures a cosine-similarity vector index of the given fixed dimension
    /// exists over `label.property`.
    async fn ensure_vector_index(
        &self,
        index_name: &str,
        label: &str,
        property: &str,
        dimensions: usize,
        ctx: &TraceContext,
    ) -> Result<SchemaOutcome, GraphStoreError>;

    /// Probes whether the store can create relationship types dynamically
    /// (the relation's own label becoming the edge type).
    async fn supports_dynamic_edge_types(&self, ctx: &TraceContext) -> bool;

    /// Upserts one batch of facts as a single logical unit: entities merged
    /// by name with alias-set union, a Fact node created unless its
    /// case-insensitive text key already exists, `HAS_HEAD`/`HAS_TAIL` edges,
    /// and one merged relation edge per entity pair.
    ///
    /// Under [`EdgeStrategy::Typed`] a store without dynamic edge types fails
    /// with [`GraphStoreError::DynamicEdgeTypesUnsupported`] so the caller
    /// can fall back to [`EdgeStrategy::Generic`].
    async fn upsert_fact_batch(
        &self,
        batch: &[FactUpsert],
        strategy: EdgeStrategy,
        ctx: &TraceContext,
    ) -> Result<(), GraphStoreError>;

    /// Case-insensitive substring search over entity names and aliases,
    /// ordered by degree descending.
    async fn search_entities(
        &self,
        term: &str,
        limit: usize,
        ctx: &TraceContext,
    ) -> Result<Vec<EntitySearchResult>, GraphStoreError>;

    /// Approximate-nearest-neighbor search over fact embeddings. Fails with
    /// [`GraphStoreError::VectorIndexUnavailable`] when the index was never
    /// created.
    async fn vector_search(
        &self,
        index_name: &str,
        embedding: &[f32],
        k: usize,
        ctx: &TraceContext,
    ) -> Result<Vec<ScoredFact>, GraphStoreError>;

    /// One-hop neighbors of an entity along relation edges. Behaves
    /// identically under both edge strategies.
    async fn entity_neighbors(
        &self,
        entity_name: &str,
        limit: usize,
        ctx: &TraceContext,
    ) -> Result<Vec<NeighborResult>, GraphStoreError>;

    /// Facts reachable within `hops` relation edges of the seed entity,
    /// annotated with minimum hop distance, ordered by (distance ascending,
    /// reaching-entity degree descending).
    async fn multi_hop_facts(
        &self,
        entity_name: &str,
        hops: usize,
        limit: usize,
        ctx: &TraceContext,
    ) -> Result<Vec<HopFact>, GraphStoreError>;

    /// Post-build counters plus a uniform random sample of entity names.
    async fn statistics(
        &self,
        sample_size: usize,
        ctx: &TraceContext,
    ) -> Result<GraphStatistics, GraphStoreError>;
}
