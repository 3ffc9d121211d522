//! Retrieval orchestrator: query text in, ranked fact context out.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::data::{
    trace_context::TraceContext,
    types::{RetrievalMetadata, RetrievalResult, ScoredFact},
};
use crate::embedding::EmbeddingCache;
use crate::services::QueryEngine;

/// Context returned when nothing relevant was found or retrieval failed.
/// The generation collaborator always receives a well-formed prompt fragment.
pub const NO_RESULTS_SENTINEL: &str = "No relevant information found in the knowledge graph.";

pub const DEFAULT_TOP_K: usize = 10;
pub const MAX_TOP_K: usize = 50;

/// Embeds a query, searches the fact index, and formats the hits for prompt
/// assembly. Never fails: every underlying error downgrades to the sentinel
/// result.
pub struct Retriever {
    cache: Arc<EmbeddingCache>,
    engine: Arc<QueryEngine>,
}

impl Retriever {
    pub fn new(cache: Arc<EmbeddingCache>, engine: Arc<QueryEngine>) -> Self {
        Self { cache, engine }
    }

    #[instrument(skip(self, ctx), fields(trace_id = %ctx.trace_id))]
    pub async fn retrieve(
        &self,
        query_text: &str,
        top_k: Option<usize>,
        ctx: &TraceContext,
    ) -> RetrievalResult {
        let top_k = top_k.unwrap_or(DEFAULT_TOP_K).clamp(1, MAX_TOP_K);

        let embedding = match self.cache.get_or_compute(query_text, ctx).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(error = %e, "Query embedding failed");
                return Self::empty_result(query_text);
            }
        };

        // Over-fetch so exact-text duplicates can be dropped without
        // shrinking the final result.
        let hits = match self.engine.vector_search(&embedding, 2 * top_k, ctx).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Vector search failed");
                return Self::empty_result(query_text);
            }
        };

        let mut seen = HashSet::new();
        let facts: Vec<ScoredFact> = hits
            .into_iter()
            .filter(|hit| seen.insert(hit.text.clone()))
            .take(top_k)
            .collect();

        if facts.is_empty() {
            debug!("No facts found");
            return Self::empty_result(query_text);
        }

        let mut context = String::new();
        for (i, fact) in facts.iter().enumerate() {
            if i > 0 {
                context.push('\n');
            }
            let _ = write!(context, "{}. [score: {:.3}] {}", i + 1, fact.score, fact.text);
        }

        let found = facts.len();
        debug!(found, "Retrieval complete");
        RetrievalResult {
            facts,
            context,
            metadata: RetrievalMetadata {
                query: query_text.to_string(),
                found,
            },
        }
    }

    fn empty_result(query_text: &str) -> RetrievalResult {
        RetrievalResult {
            facts: Vec::new(),
            context: NO_RESULTS_SENTINEL.to_string(),
            metadata: RetrievalMetadata {
                query: query_text.to_string(),
                found: 0,
            },
        }
    }
}
