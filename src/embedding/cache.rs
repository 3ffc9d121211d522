//! Persistent text-to-vector cache in front of the embedding collaborator.
//!
//! The cache is loaded fully into memory at startup and rewritten wholesale
//! after every batch computation, so restarts between batches never lose
//! work. It never evicts; if the embedding model changes, the file must be
//! invalidated wholesale rather than patched incrementally.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::EmbeddingService;
use crate::data::{CoreError, TraceContext};

/// Configuration for the persistent embedding cache.
#[derive(Debug, Clone)]
pub struct EmbeddingCacheConfig {
    /// Location of the serialized cache file.
    pub path: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    dimension: usize,
    saved_at: DateTime<Utc>,
    entries: HashMap<String, Vec<f32>>,
}

struct CacheState {
    entries: HashMap<String, Vec<f32>>,
    /// Texts whose computation failed in this run; not retried in a tight
    /// loop, cleared on restart.
    failed: HashSet<String>,
}

/// Shared embedding cache. Clone the surrounding `Arc` to hand it to both the
/// construction pipeline and the retrieval orchestrator; the internal lock
/// serializes writers.
pub struct EmbeddingCache {
    config: EmbeddingCacheConfig,
    service: Arc<dyn EmbeddingService>,
    dimension: usize,
    state: RwLock<CacheState>,
}

impl EmbeddingCache {
    /// Opens the cache, loading any existing file. A stored dimension that
    /// differs from the live service's output dimension is fatal: the cache
    /// must be invalidated wholesale, never truncated or padded.
    pub async fn open(
        config: EmbeddingCacheConfig,
        service: Arc<dyn EmbeddingService>,
    ) -> Result<Self, CoreError> {
        let dimension = service.dimension();
        let entries = match tokio::fs::read(&config.path).await {
            Ok(bytes) => {
                let file: CacheFile = serde_json::from_slice(&bytes)?;
                if file.dimension != dimension {
                    return Err(CoreError::DimensionMismatch {
                        cached: file.dimension,
                        model: dimension,
                    });
                }
                if let Some((text, vector)) =
                    file.entries.iter().find(|(_, v)| v.len() != dimension)
                {
                    warn!(text = %text, len = vector.len(), "Corrupt cache entry");
                    return Err(CoreError::DimensionMismatch {
                        cached: vector.len(),
                        model: dimension,
                    });
                }
                info!(
                    path = %config.path.display(),
                    entries = file.entries.len(),
                    "Loaded embedding cache"
                );
                file.entries
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %config.path.display(), "No embedding cache file, starting empty");
                HashMap::new()
            }
            Err(e) => return Err(CoreError::IoError(e)),
        };

        Ok(Self {
            config,
            service,
            dimension,
            state: RwLock::new(CacheState {
                entries,
                failed: HashSet::new(),
            }),
        })
    }

    /// Fixed embedding dimension of this cache and its backing service.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    pub async fn contains(&self, text: &str) -> bool {
        self.state.read().await.entries.contains_key(text)
    }

    /// Returns the cached vector for `text`, computing and persisting it on a
    /// miss.
    #[instrument(skip(self, ctx), fields(trace_id = %ctx.trace_id))]
    pub async fn get_or_compute(
        &self,
        text: &str,
        ctx: &TraceContext,
    ) -> Result<Vec<f32>, CoreError> {
        if let Some(vector) = self.state.read().await.entries.get(text) {
            return Ok(vector.clone());
        }

        let vector = self.service.embed_text(text, ctx).await?;
        self.check_dimension(&vector)?;

        {
            let mut state = self.state.write().await;
            state.entries.insert(text.to_string(), vector.clone());
        }
        self.persist().await?;
        Ok(vector)
    }

    /// Batched variant of [`get_or_compute`](Self::get_or_compute). The output
    /// is aligned to the input order regardless of which texts were cached;
    /// `None` marks texts whose computation failed (recorded so they are not
    /// retried within this run). The cache file is rewritten once per call,
    /// after the uncomputed subset has been resolved.
    #[instrument(skip_all, fields(trace_id = %ctx.trace_id, texts = texts.len()))]
    pub async fn batch_get_or_compute(
        &self,
        texts: &[String],
        ctx: &TraceContext,
    ) -> Result<Vec<Option<Vec<f32>>>, CoreError> {
        // Unique uncached texts, in first-occurrence order.
        let missing: Vec<String> = {
            let state = self.state.read().await;
            let mut seen = HashSet::new();
            texts
                .iter()
                .filter(|t| {
                    !state.entries.contains_key(*t)
                        && !state.failed.contains(*t)
                        && seen.insert(t.as_str())
                })
                .cloned()
                .collect()
        };

        if !missing.is_empty() {
            debug!(missing = missing.len(), "Computing uncached embeddings");
            let computed = self.compute_missing(&missing, ctx).await?;

            {
                let mut state = self.state.write().await;
                for (text, outcome) in missing.into_iter().zip(computed) {
                    match outcome {
                        Some(vector) => {
                            state.entries.insert(text, vector);
                        }
                        None => {
                            state.failed.insert(text);
                        }
                    }
                }
            }
            self.persist().await?;
        }

        let state = self.state.read().await;
        Ok(texts
            .iter()
            .map(|t| state.entries.get(t).cloned())
            .collect())
    }

    /// Computes embeddings for the given texts, preserving order. A failure
    /// of the batched call degrades to per-item computation so one bad item
    /// cannot sink the whole batch; per-item failures become `None`.
    async fn compute_missing(
        &self,
        missing: &[String],
        ctx: &TraceContext,
    ) -> Result<Vec<Option<Vec<f32>>>, CoreError> {
        match self.service.embed_batch(missing, ctx).await {
            Ok(vectors) => {
                if vectors.len() != missing.len() {
                    return Err(CoreError::EmbeddingError(format!(
                        "embedding collaborator returned {} vectors for {} texts",
                        vectors.len(),
                        missing.len()
                    )));
                }
                for vector in &vectors {
                    self.check_dimension(vector)?;
                }
                Ok(vectors.into_iter().map(Some).collect())
            }
            Err(batch_err) => {
                warn!(error = %batch_err, "Batch embedding failed, degrading to per-item calls");
                let mut out = Vec::with_capacity(missing.len());
                for text in missing {
                    match self.service.embed_text(text, ctx).await {
                        Ok(vector) => {
                            self.check_dimension(&vector)?;
                            out.push(Some(vector));
                        }
                        Err(e) => {
                            warn!(text = %text, error = %e, "Embedding failed, fact will be skipped");
                            out.push(None);
                        }
                    }
                }
                Ok(out)
            }
        }
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), CoreError> {
        if vector.len() != self.dimension {
            return Err(CoreError::DimensionMismatch {
                cached: self.dimension,
                model: vector.len(),
            });
        }
        Ok(())
    }

    /// Rewrites the cache file wholesale.
    async fn persist(&self) -> Result<(), CoreError> {
        let file = {
            let state = self.state.read().await;
            CacheFile {
                dimension: self.dimension,
                saved_at: Utc::now(),
                entries: state.entries.clone(),
            }
        };
        let bytes = serde_json::to_vec(&file)?;
        if let Some(parent) = self.config.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.config.path, bytes)
            .await
            .map_err(|e| CoreError::CacheError(format!("failed to write cache file: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingService;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache_config(dir: &tempfile::TempDir) -> EmbeddingCacheConfig {
        EmbeddingCacheConfig {
            path: dir.path().join("embeddings.json"),
        }
    }

    /// Counts single and batch calls so tests can assert what was recomputed.
    struct CountingService {
        inner: MockEmbeddingService,
        single_calls: AtomicUsize,
        batch_texts: AtomicUsize,
    }

    impl CountingService {
        fn new(dimension: usize) -> Self {
            Self {
                inner: MockEmbeddingService::new(dimension),
                single_calls: AtomicUsize::new(0),
                batch_texts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingService for CountingService {
        async fn embed_text(&self, text: &str, ctx: &TraceContext) -> Result<Vec<f32>, CoreError> {
            self.single_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed_text(text, ctx).await
        }

        async fn embed_batch(
            &self,
            texts: &[String],
            ctx: &TraceContext,
        ) -> Result<Vec<Vec<f32>>, CoreError> {
            self.batch_texts.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.embed_batch(texts, ctx).await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    /// Fails on texts containing a marker substring; batch calls fail
    /// outright when any input is poisoned.
    struct FlakyService {
        inner: MockEmbeddingService,
    }

    #[async_trait]
    impl EmbeddingService for FlakyService {
        async fn embed_text(&self, text: &str, ctx: &TraceContext) -> Result<Vec<f32>, CoreError> {
            if text.contains("poison") {
                return Err(CoreError::EmbeddingError("poisoned input".into()));
            }
            self.inner.embed_text(text, ctx).await
        }

        async fn embed_batch(
            &self,
            texts: &[String],
            ctx: &TraceContext,
        ) -> Result<Vec<Vec<f32>>, CoreError> {
            if texts.iter().any(|t| t.contains("poison")) {
                return Err(CoreError::EmbeddingError("poisoned batch".into()));
            }
            self.inner.embed_batch(texts, ctx).await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    #[tokio::test]
    async fn test_batch_preserves_input_order_with_warm_entries() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(CountingService::new(32));
        let cache = EmbeddingCache::open(cache_config(&dir), service.clone())
            .await
            .unwrap();
        let ctx = TraceContext::default();

        // Warm `a` and `c`, leave `b` cold.
        cache.get_or_compute("a", &ctx).await.unwrap();
        cache.get_or_compute("c", &ctx).await.unwrap();

        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let vectors = cache.batch_get_or_compute(&texts, &ctx).await.unwrap();

        assert_eq!(vectors.len(), 3);
        let expected_a = cache.get_or_compute("a", &ctx).await.unwrap();
        let expected_b = cache.get_or_compute("b", &ctx).await.unwrap();
        let expected_c = cache.get_or_compute("c", &ctx).await.unwrap();
        assert_eq!(vectors[0].as_deref(), Some(expected_a.as_slice()));
        assert_eq!(vectors[1].as_deref(), Some(expected_b.as_slice()));
        assert_eq!(vectors[2].as_deref(), Some(expected_c.as_slice()));

        // Only `b` went through the batched computation.
        assert_eq!(service.batch_texts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = TraceContext::default();
        let expected = {
            let cache = EmbeddingCache::open(
                cache_config(&dir),
                Arc::new(MockEmbeddingService::new(32)),
            )
            .await
            .unwrap();
            cache.get_or_compute("persistent fact", &ctx).await.unwrap()
        };

        let service = Arc::new(CountingService::new(32));
        let reopened = EmbeddingCache::open(cache_config(&dir), service.clone())
            .await
            .unwrap();
        assert_eq!(reopened.len().await, 1);
        let vector = reopened.get_or_compute("persistent fact", &ctx).await.unwrap();
        assert_eq!(vector, expected);
        assert_eq!(
            service.single_calls.load(Ordering::SeqCst),
            0,
            "cached entry must not be recomputed"
        );
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_fatal_on_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = EmbeddingCache::open(
                cache_config(&dir),
                Arc::new(MockEmbeddingService::new(32)),
            )
            .await
            .unwrap();
            cache
                .get_or_compute("fact", &TraceContext::default())
                .await
                .unwrap();
        }

        let result = EmbeddingCache::open(
            cache_config(&dir),
            Arc::new(MockEmbeddingService::new(64)),
        )
        .await;
        match result {
            Err(CoreError::DimensionMismatch { cached, model }) => {
                assert_eq!(cached, 32);
                assert_eq!(model, 64);
            }
            other => panic!("expected DimensionMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_single_item_failure_does_not_sink_batch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::open(
            cache_config(&dir),
            Arc::new(FlakyService {
                inner: MockEmbeddingService::new(32),
            }),
        )
        .await
        .unwrap();
        let ctx = TraceContext::default();

        let texts = vec![
            "good fact".to_string(),
            "poison fact".to_string(),
            "another good fact".to_string(),
        ];
        let vectors = cache.batch_get_or_compute(&texts, &ctx).await.unwrap();

        assert!(vectors[0].is_some());
        assert!(vectors[1].is_none(), "failed item yields None, not an error");
        assert!(vectors[2].is_some());

        // The failure is recorded; a second pass does not recompute it.
        let again = cache.batch_get_or_compute(&texts, &ctx).await.unwrap();
        assert!(again[1].is_none());
    }
}
