//! Read-only query operations over the populated graph.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::data::{
    errors::GraphStoreError,
    trace_context::TraceContext,
    types::{EntitySearchResult, HopFact, ScoredFact},
};
use crate::traits::GraphStore;

/// Traversal depth cap. Keeps multi-hop cost bounded.
pub const MAX_HOPS: usize = 5;

/// Row cap for traversal queries.
const TRAVERSAL_LIMIT: usize = 30;

/// Line cap for the rendered subgraph listing.
const MAX_CONTEXT_LINES: usize = 60;

/// Minimum token length considered for subgraph entity lookup.
const MIN_TOKEN_LENGTH: usize = 3;

/// Query facade over a [`GraphStore`]. All operations are read-only and safe
/// to run concurrently.
pub struct QueryEngine {
    store: Arc<dyn GraphStore>,
    vector_index: String,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn GraphStore>, vector_index: impl Into<String>) -> Self {
        Self {
            store,
            vector_index: vector_index.into(),
        }
    }

    /// Case-insensitive substring entity search, highest degree first.
    pub async fn search_by_name(
        &self,
        term: &str,
        limit: usize,
        ctx: &TraceContext,
    ) -> Result<Vec<EntitySearchResult>, GraphStoreError> {
        self.store.search_entities(term, limit, ctx).await
    }

    /// Nearest-neighbor fact search. A missing vector index degrades to an
    /// empty result so callers built during a fallback run keep working.
    #[instrument(skip(self, embedding, ctx), fields(trace_id = %ctx.trace_id, k))]
    pub async fn vector_search(
        &self,
        embedding: &[f32],
        k: usize,
        ctx: &TraceContext,
    ) -> Result<Vec<ScoredFact>, GraphStoreError> {
        match self
            .store
            .vector_search(&self.vector_index, embedding, k, ctx)
            .await
        {
            Ok(hits) => Ok(hits),
            Err(GraphStoreError::VectorIndexUnavailable(name)) => {
                warn!(index = %name, "Vector index unavailable, returning no hits");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Facts within `hops` edges of the seed entity, nearest first. Depth is
    /// clamped to `1..=MAX_HOPS` and the row count to `TRAVERSAL_LIMIT`.
    pub async fn multi_hop(
        &self,
        entity_name: &str,
        hops: usize,
        limit: usize,
        ctx: &TraceContext,
    ) -> Result<Vec<HopFact>, GraphStoreError> {
        let hops = hops.clamp(1, MAX_HOPS);
        let limit = limit.clamp(1, TRAVERSAL_LIMIT);
        self.store
            .multi_hop_facts(entity_name, hops, limit, ctx)
            .await
    }

    /// Renders a one-hop neighborhood listing for the entities named in a
    /// free-text query. Used when vector search is not desired.
    #[instrument(skip(self, ctx), fields(trace_id = %ctx.trace_id))]
    pub async fn subgraph_for_query(
        &self,
        query_text: &str,
        k: usize,
        ctx: &TraceContext,
    ) -> Result<String, GraphStoreError> {
        let mut entities: Vec<EntitySearchResult> = Vec::new();
        for token in query_text
            .to_lowercase()
            .split_whitespace()
            .filter(|t| t.len() >= MIN_TOKEN_LENGTH)
        {
            for hit in self.store.search_entities(token, k, ctx).await? {
                if !entities.iter().any(|e| e.name == hit.name) {
                    entities.push(hit);
                }
            }
        }
        entities.sort_by(|a, b| b.degree.cmp(&a.degree).then_with(|| a.name.cmp(&b.name)));
        entities.truncate(k);
        debug!(entities = entities.len(), "Expanding subgraph");

        let mut lines: Vec<String> = Vec::new();
        'outer: for entity in &entities {
            if lines.len() >= MAX_CONTEXT_LINES {
                break;
            }
            lines.push(format!("Entity: {}", entity.name));
            for neighbor in self
                .store
                .entity_neighbors(&entity.name, TRAVERSAL_LIMIT, ctx)
                .await?
            {
                if lines.len() >= MAX_CONTEXT_LINES {
                    break 'outer;
                }
                lines.push(format!("  - {} -> {}", neighbor.readable, neighbor.name));
            }
        }
        Ok(lines.join("\n"))
    }
}
