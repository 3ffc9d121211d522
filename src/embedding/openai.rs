use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client,
};
use async_trait::async_trait;

use super::EmbeddingService;
use crate::data::{CoreError, TraceContext};

/// Embedding collaborator backed by the OpenAI embeddings API.
pub struct OpenAiEmbeddingService {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbeddingService {
    pub fn new(api_key: String, model: String, dimensions: usize) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        let client = Client::with_config(config);
        Self {
            client,
            model,
            dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingService for OpenAiEmbeddingService {
    async fn embed_text(&self, text: &str, _ctx: &TraceContext) -> Result<Vec<f32>, CoreError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| CoreError::EmbeddingError(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| CoreError::EmbeddingError(e.to_string()))?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| CoreError::EmbeddingError("empty embedding response".to_string()))
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        _ctx: &TraceContext,
    ) -> Result<Vec<Vec<f32>>, CoreError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts.to_vec())
            .build()
            .map_err(|e| CoreError::EmbeddingError(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| CoreError::EmbeddingError(e.to_string()))?;

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dotenv::dotenv;
    use std::env;

    #[tokio::test]
    async fn test_embed_text_against_live_api() {
        dotenv().ok();
        let api_key = match env::var("OPENAI_API_KEY") {
            Ok(key) => key,
            Err(_) => {
                eprintln!("Skipping test: OPENAI_API_KEY not set");
                return;
            }
        };

        let service =
            OpenAiEmbeddingService::new(api_key, "text-embedding-3-small".to_string(), 1536);
        let ctx = TraceContext::default();

        match service.embed_text("Jackie Chan profession Actor", &ctx).await {
            Ok(embedding) => assert!(!embedding.is_empty()),
            Err(e) => eprintln!("OpenAI API error: {}", e),
        }
    }
}
