use async_trait::async_trait;
use ollama_rs::{
    generation::{completion::request::GenerationRequest, options::GenerationOptions},
    Ollama,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::external::error::{service_url, ExternalError};

/// A text-generation backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send the prompt to the model and return the generated text.
    async fn generate(&self, prompt: &str) -> Result<String, ExternalError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub model: String,
    pub host: String,
    pub port: u16,
    pub temperature: f32,
    pub top_p: f32,
    /// Maximum number of tokens to generate.
    pub num_predict: i32,
}

impl LLMConfig {
    /// Get the full URL for the Ollama service
    pub fn get_url(&self) -> Result<String, ExternalError> {
        let url = service_url(&self.host, self.port)?;
        Ok(url.as_str().trim_end_matches('/').to_string())
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            model: "qwen2.5-coder:14b".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            temperature: 0.7,
            top_p: 0.9,
            num_predict: 4096,
        }
    }
}

/// Wrapper for Ollama LLM engine
pub struct LLMEngine {
    client: Ollama,
    config: LLMConfig,
}

impl LLMEngine {
    /// Create a new LLM engine with the given configuration
    pub fn new(config: LLMConfig) -> Result<Self, ExternalError> {
        let url = service_url(&config.host, config.port)?;
        let host = url
            .host_str()
            .ok_or_else(|| ExternalError::ConfigError(format!("No host in {}", url)))?;

        let client = Ollama::new(format!("{}://{}", url.scheme(), host), config.port);

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LLMConfig {
        &self.config
    }
}

#[async_trait]
impl LanguageModel for LLMEngine {
    async fn generate(&self, prompt: &str) -> Result<String, ExternalError> {
        let mut request = GenerationRequest::new(self.config.model.clone(), prompt.to_string());

        let options = GenerationOptions::default()
            .temperature(self.config.temperature)
            .top_p(self.config.top_p)
            .num_predict(self.config.num_predict);

        request.options = Some(options);

        debug!(model = %self.config.model, prompt_len = prompt.len(), "sending generation request");
        let response = self
            .client
            .generate(request)
            .await
            .map_err(|e| ExternalError::GenerationFailed(e.to_string()))?;

        Ok(response.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_generation() {
        // Test with plain hostname
        let config = LLMConfig {
            host: "localhost".to_string(),
            ..LLMConfig::default()
        };
        assert_eq!(config.get_url().unwrap(), "http://localhost:11434");

        // Test with http:// prefix
        let config = LLMConfig {
            host: "http://172.20.10.2".to_string(),
            ..LLMConfig::default()
        };
        assert_eq!(config.get_url().unwrap(), "http://172.20.10.2:11434");

        // Test with https:// prefix
        let config = LLMConfig {
            host: "https://example.com".to_string(),
            ..LLMConfig::default()
        };
        assert_eq!(config.get_url().unwrap(), "https://example.com:11434");
    }

    #[test]
    fn test_invalid_host_is_config_error() {
        let config = LLMConfig {
            host: "http://bad host".to_string(),
            ..LLMConfig::default()
        };
        assert!(matches!(
            LLMEngine::new(config),
            Err(ExternalError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_generation_failure() {
        // Port 9 (discard) is never an Ollama server.
        let config = LLMConfig {
            host: "127.0.0.1".to_string(),
            port: 9,
            ..LLMConfig::default()
        };
        let engine = LLMEngine::new(config).unwrap();

        let result = engine.generate("hello").await;
        assert!(matches!(result, Err(ExternalError::GenerationFailed(_))));
    }
}
