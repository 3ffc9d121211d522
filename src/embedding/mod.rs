//! Embedding collaborator interface and implementations.

use async_trait::async_trait;
use std::sync::Arc;

use crate::data::{CoreError, TraceContext};

mod cache;
#[cfg(feature = "embed-openai")]
mod openai;

pub use cache::{EmbeddingCache, EmbeddingCacheConfig};
#[cfg(feature = "embed-openai")]
pub use openai::OpenAiEmbeddingService;

/// External text-encoder interface. Vectors are unit-normalized and of a
/// fixed dimension for the process lifetime.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed_text(&self, text: &str, ctx: &TraceContext) -> Result<Vec<f32>, CoreError>;

    async fn embed_batch(
        &self,
        texts: &[String],
        ctx: &TraceContext,
    ) -> Result<Vec<Vec<f32>>, CoreError>;

    /// Fixed output dimension of this encoder.
    fn dimension(&self) -> usize;
}

/// Reference encoder dimension (all-MiniLM-L6-v2).
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

/// Deterministic embedding service for tests and offline development.
///
/// Embeddings are derived from the byte content of the text, so identical
/// texts always map to identical unit-normalized vectors and related texts
/// that share words get overlapping components.
#[derive(Debug, Clone)]
pub struct MockEmbeddingService {
    embedding_dimension: usize,
}

impl MockEmbeddingService {
    pub fn new(embedding_dimension: usize) -> Self {
        Self {
            embedding_dimension,
        }
    }

    fn generate_deterministic_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.embedding_dimension];

        // Per-word contributions so texts sharing words are close in cosine
        // space, which is enough for retrieval ranking tests.
        for word in text.to_lowercase().split_whitespace() {
            let word_hash = word
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            for offset in 0..4u64 {
                let idx = ((word_hash.wrapping_add(offset * 7919)) as usize)
                    % self.embedding_dimension;
                embedding[idx] += 1.0 + (offset as f32) * 0.25;
            }
        }

        // Whole-text component keeps distinct texts distinct.
        let text_hash = text
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(131).wrapping_add(b as u64));
        let idx = (text_hash as usize) % self.embedding_dimension;
        embedding[idx] += 0.5;

        let magnitude: f32 = embedding.iter().map(|&v| v * v).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut embedding {
                *value /= magnitude;
            }
        }

        embedding
    }
}

impl Default for MockEmbeddingService {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingService for MockEmbeddingService {
    async fn embed_text(&self, text: &str, _ctx: &TraceContext) -> Result<Vec<f32>, CoreError> {
        Ok(self.generate_deterministic_embedding(text))
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        ctx: &TraceContext,
    ) -> Result<Vec<Vec<f32>>, CoreError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_text(text, ctx).await?);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }
}

/// Configuration for embedding services.
#[derive(Debug, Clone)]
pub enum EmbeddingServiceConfig {
    /// OpenAI embeddings API.
    OpenAi { api_key: String, model: String, dimensions: usize },
    /// Deterministic embeddings for tests and offline development.
    Mock { dimensions: usize },
}

impl Default for EmbeddingServiceConfig {
    fn default() -> Self {
        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            Self::OpenAi {
                api_key,
                model: "text-embedding-3-small".to_string(),
                dimensions: 1536,
            }
        } else {
            Self::Mock {
                dimensions: DEFAULT_EMBEDDING_DIMENSION,
            }
        }
    }
}

/// Creates an embedding service from the provided configuration.
pub fn create_embedding_service(config: EmbeddingServiceConfig) -> Arc<dyn EmbeddingService> {
    match config {
        #[cfg(feature = "embed-openai")]
        EmbeddingServiceConfig::OpenAi { api_key, model, dimensions } => {
            Arc::new(OpenAiEmbeddingService::new(api_key, model, dimensions))
        }
        #[cfg(not(feature = "embed-openai"))]
        EmbeddingServiceConfig::OpenAi { dimensions, .. } => {
            tracing::warn!(
                "OpenAI embedding service requested without the 'embed-openai' feature; \
                 falling back to deterministic embeddings"
            );
            Arc::new(MockEmbeddingService::new(dimensions))
        }
        EmbeddingServiceConfig::Mock { dimensions } => {
            Arc::new(MockEmbeddingService::new(dimensions))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embeddings_are_deterministic() {
        let service = MockEmbeddingService::default();
        let ctx = TraceContext::default();

        let a = service.embed_text("Jackie Chan profession Actor", &ctx).await.unwrap();
        let b = service.embed_text("Jackie Chan profession Actor", &ctx).await.unwrap();
        assert_eq!(a, b, "Embeddings should be deterministic");
        assert_eq!(a.len(), DEFAULT_EMBEDDING_DIMENSION);

        let c = service.embed_text("something else entirely", &ctx).await.unwrap();
        assert_ne!(a, c, "Different text should have different embeddings");
    }

    #[tokio::test]
    async fn test_mock_embeddings_are_unit_normalized() {
        let service = MockEmbeddingService::new(64);
        let ctx = TraceContext::default();
        let embedding = service.embed_text("normalization check", &ctx).await.unwrap();
        let magnitude: f32 = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_batch_matches_single() {
        let service = MockEmbeddingService::default();
        let ctx = TraceContext::default();
        let texts = vec!["first fact".to_string(), "second fact".to_string()];
        let batch = service.embed_batch(&texts, &ctx).await.unwrap();
        let single = service.embed_text("first fact", &ctx).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], single);
    }

    #[test]
    fn test_create_mock_service() {
        let service = create_embedding_service(EmbeddingServiceConfig::Mock { dimensions: 128 });
        assert_eq!(service.dimension(), 128);
    }
}
