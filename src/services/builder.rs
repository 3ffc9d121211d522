//! Sequential single-writer construction pipeline: canonicalized facts in,
//! populated graph out.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::canonical::{aliases_for, sanitize_relation_type};
use crate::data::{
    errors::{BuildError, GraphStoreError},
    trace_context::TraceContext,
    types::{BuildReport, EdgeStrategy, FactRecord, FactUpsert, GraphStatistics, SchemaOutcome},
};
use crate::embedding::EmbeddingCache;
use crate::traits::GraphStore;

/// Tunables for one construction run.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Facts per store round-trip. Larger batches amortize overhead but
    /// raise the cost of a failed batch.
    pub batch_size: usize,
    pub vector_index: String,
    pub embedding_dimension: usize,
    /// Entity names sampled for the post-build report.
    pub sample_size: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            vector_index: "fact_embeddings".to_string(),
            embedding_dimension: crate::embedding::DEFAULT_EMBEDDING_DIMENSION,
            sample_size: 5,
        }
    }
}

/// Builds the knowledge graph from canonicalized fact records.
///
/// Batches are processed one at a time in input order; each batch is one
/// logical unit against the store, so an abort leaves no partially visible
/// batch and the reported offset resumes at a batch boundary.
pub struct GraphBuilder {
    store: Arc<dyn GraphStore>,
    cache: Arc<EmbeddingCache>,
    config: BuilderConfig,
}

impl GraphBuilder {
    pub fn new(
        store: Arc<dyn GraphStore>,
        cache: Arc<EmbeddingCache>,
        config: BuilderConfig,
    ) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    /// Wipes all graph data. Explicit precondition of a full rebuild.
    pub async fn clear(&self, ctx: &TraceContext) -> Result<(), BuildError> {
        self.store.clear(ctx).await.map_err(BuildError::Store)
    }

    /// Idempotently establishes the schema: the entity name constraint, the
    /// alias index, and the fact embedding vector index.
    #[instrument(skip(self, ctx), fields(trace_id = %ctx.trace_id))]
    pub async fn create_schema(&self, ctx: &TraceContext) -> Result<(), BuildError> {
        for outcome in [
            self.store
                .ensure_unique_constraint("Entity", "name", ctx)
                .await,
            self.store.ensure_index("Entity", "aliases", ctx).await,
            self.store
                .ensure_vector_index(
                    &self.config.vector_index,
                    "Fact",
                    "embedding",
                    self.config.embedding_dimension,
                    ctx,
                )
                .await,
        ] {
            match outcome {
                Ok(SchemaOutcome::Created) => {}
                Ok(SchemaOutcome::AlreadyExists) => {
                    debug!("Schema object already exists, continuing");
                }
                Err(GraphStoreError::SchemaAlreadyExists(name)) => {
                    debug!("Schema object '{}' already exists, continuing", name);
                }
                Err(e) => return Err(BuildError::Schema(e)),
            }
        }
        info!("Schema ready");
        Ok(())
    }

    /// Writes all facts batch by batch, embedding through the cache.
    ///
    /// The edge strategy is probed once up front; a batch that still fails
    /// with a dynamic-edge-type error downgrades the run to generic edges and
    /// retries. Transient store errors are retried once. Any other failure
    /// aborts with the batch index and the offset of the first unprocessed
    /// record.
    #[instrument(skip(self, facts, ctx), fields(trace_id = %ctx.trace_id, facts = facts.len()))]
    pub async fn build(
        &self,
        facts: &[FactRecord],
        ctx: &TraceContext,
    ) -> Result<BuildReport, BuildError> {
        let mut strategy = if self.store.supports_dynamic_edge_types(ctx).await {
            EdgeStrategy::Typed
        } else {
            info!("Store does not support dynamic edge types, using generic edges");
            EdgeStrategy::Generic
        };

        let mut facts_written = 0usize;
        let mut facts_skipped = 0usize;
        let mut batches = 0usize;

        for (batch_index, batch) in facts.chunks(self.config.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|f| f.text.clone()).collect();
            let embeddings = self.cache.batch_get_or_compute(&texts, ctx).await?;

            let mut upserts = Vec::with_capacity(batch.len());
            for (record, embedding) in batch.iter().zip(embeddings) {
                match embedding {
                    Some(embedding) => upserts.push(FactUpsert {
                        head_aliases: aliases_for(&record.head_name),
                        tail_aliases: aliases_for(&record.tail_name),
                        relation_type: sanitize_relation_type(&record.relation_label),
                        embedding,
                        record: record.clone(),
                    }),
                    None => {
                        warn!(text = %record.text, "Skipping fact without embedding");
                        facts_skipped += 1;
                    }
                }
            }

            strategy = self
                .write_batch(&upserts, strategy, batch_index, ctx)
                .await?;
            facts_written += upserts.len();
            batches += 1;
            debug!(batch_index, written = upserts.len(), "Batch committed");
        }

        info!(facts_written, facts_skipped, batches, %strategy, "Construction complete");
        Ok(BuildReport {
            facts_written,
            facts_skipped,
            batches,
            strategy,
        })
    }

    /// Writes one batch, applying the fallback and retry policy. Returns the
    /// strategy in effect afterwards.
    async fn write_batch(
        &self,
        upserts: &[FactUpsert],
        mut strategy: EdgeStrategy,
        batch_index: usize,
        ctx: &TraceContext,
    ) -> Result<EdgeStrategy, BuildError> {
        let mut retried_transient = false;
        loop {
            match self.store.upsert_fact_batch(upserts, strategy, ctx).await {
                Ok(()) => return Ok(strategy),
                Err(GraphStoreError::DynamicEdgeTypesUnsupported(reason))
                    if strategy == EdgeStrategy::Typed =>
                {
                    warn!(batch_index, %reason, "Falling back to generic relation edges");
                    strategy = EdgeStrategy::Generic;
                }
                Err(e) if e.is_transient() && !retried_transient => {
                    warn!(batch_index, error = %e, "Transient batch failure, retrying once");
                    retried_transient = true;
                }
                Err(e) => {
                    return Err(BuildError::Batch {
                        batch_index,
                        first_unprocessed: batch_index * self.config.batch_size,
                        source: e,
                    });
                }
            }
        }
    }

    /// Post-build verification counters.
    pub async fn statistics(&self, ctx: &TraceContext) -> Result<GraphStatistics, BuildError> {
        self.store
            .statistics(self.config.sample_size, ctx)
            .await
            .map_err(BuildError::Store)
    }
}
