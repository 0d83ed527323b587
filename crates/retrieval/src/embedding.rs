//! HTTP embedding client
//!
//! Thin client for the external embedding service. Queries may be prefixed
//! with a retrieval instruction for instruction-tuned models; documents are
//! embedded as plain text.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use rag_agent_config::EmbeddingSettings;
use rag_agent_core::{Embedder, Error};

/// Default retrieval instruction prepended to queries.
pub const DEFAULT_RETRIEVAL_INSTRUCTION: &str =
    "Given a user question, retrieve passages that answer the question";

#[derive(Debug, Clone)]
pub struct EmbeddingClientConfig {
    pub endpoint: String,
    pub model: String,
    pub dim: usize,
    pub timeout: Duration,
    /// Query instruction prefix; `None` embeds queries as plain text.
    pub instruction: Option<String>,
}

impl From<&EmbeddingSettings> for EmbeddingClientConfig {
    fn from(settings: &EmbeddingSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            dim: settings.vector_dim,
            timeout: Duration::from_millis(settings.timeout_ms),
            instruction: Some(DEFAULT_RETRIEVAL_INSTRUCTION.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedding service client.
pub struct HttpEmbedder {
    client: Client,
    config: EmbeddingClientConfig,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingClientConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn embed_raw(&self, text: &str) -> Result<Vec<f32>, Error> {
        let request = EmbedRequest {
            model: self.config.model.clone(),
            input: text.to_string(),
        };

        let url = format!("{}/api/embed", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "embedding service returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("malformed embedding response: {e}")))?;

        let vector = parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("no embedding returned".to_string()))?;

        if vector.len() != self.config.dim {
            return Err(Error::Embedding(format!(
                "embedding dimension mismatch: got {}, expected {}",
                vector.len(),
                self.config.dim
            )));
        }

        Ok(vector)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, Error> {
        self.embed_raw(text).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, Error> {
        match &self.config.instruction {
            Some(instruction) => {
                let formatted = format!("Instruct: {instruction}\nQuery: {query}");
                self.embed_raw(&formatted).await
            }
            None => self.embed_raw(query).await,
        }
    }

    fn dim(&self) -> usize {
        self.config.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let settings = EmbeddingSettings::default();
        let config = EmbeddingClientConfig::from(&settings);
        assert_eq!(config.dim, 384);
        assert!(config.instruction.is_some());
    }
}
