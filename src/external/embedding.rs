use async_trait::async_trait;
use ollama_rs::{generation::options::GenerationOptions, Ollama};
use serde::{Deserialize, Serialize};

use crate::external::error::{service_url, ExternalError};

/// Maps text onto a fixed-dimension vector.
///
/// One instance must be shared between chunking, ingestion and querying:
/// similarity scores only make sense inside a single model's vector space.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the model producing the vectors.
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalError>;

    /// Embed several texts in order, one request at a time.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ExternalError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub host: String,
    pub port: u16,
}

impl EmbeddingConfig {
    /// Get the full URL for the Ollama service
    pub fn get_url(&self) -> Result<String, ExternalError> {
        let url = service_url(&self.host, self.port)?;
        Ok(url.as_str().trim_end_matches('/').to_string())
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
            host: "localhost".to_string(),
            port: 11434,
        }
    }
}

/// Wrapper for Ollama embedding engine
pub struct EmbeddingEngine {
    client: Ollama,
    config: EmbeddingConfig,
}

impl EmbeddingEngine {
    /// Create a new embedding engine with the given configuration
    pub fn new(config: EmbeddingConfig) -> Result<Self, ExternalError> {
        let url = service_url(&config.host, config.port)?;
        let host = url
            .host_str()
            .ok_or_else(|| ExternalError::ConfigError(format!("No host in {}", url)))?;

        let client = Ollama::new(format!("{}://{}", url.scheme(), host), config.port);

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Embedder for EmbeddingEngine {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalError> {
        let response = self
            .client
            .generate_embeddings(
                self.config.model.clone(),
                text.to_string(),
                Some(GenerationOptions::default()),
            )
            .await
            .map_err(|e| ExternalError::EmbeddingFailed(e.to_string()))?;

        if response.embeddings.is_empty() {
            return Err(ExternalError::EmbeddingFailed(format!(
                "model {} returned an empty embedding",
                self.config.model
            )));
        }

        // Convert from Vec<f64> to Vec<f32>
        Ok(response.embeddings.into_iter().map(|x| x as f32).collect())
    }
}
