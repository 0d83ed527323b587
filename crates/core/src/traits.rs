//! Traits for pluggable collaborators
//!
//! All external services sit behind these seams so backends can be swapped
//! without code changes and tests can inject mocks:
//! - `Embedder`: text → fixed-dim vector
//! - `VectorIndex`: filtered k-NN search, filtered scroll, optional discover
//! - `RerankBackend`: joint (query, document) relevance scoring
//! - `LlmBackend`: prompt → streamed tokens + completion summary

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::filter::PayloadFilter;

/// Embedding provider. Must be deterministic given model + text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed document text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a query. Providers with instruction-tuned models override this
    /// to apply their query prefix.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(query).await
    }

    /// Embedding dimension.
    fn dim(&self) -> usize;
}

/// k-NN query against a collection.
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub limit: usize,
    pub filter: Option<PayloadFilter>,
}

/// Filtered scroll request. `offset` is the store's opaque continuation
/// token from the previous page.
#[derive(Debug, Clone)]
pub struct ScrollRequest {
    pub filter: PayloadFilter,
    pub limit: usize,
    pub offset: Option<String>,
}

/// A point returned by the store: id, native score (0 for scroll results)
/// and the raw payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f64,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub points: Vec<ScoredPoint>,
    pub next_offset: Option<String>,
}

/// Vector store access. Payloads are requested, vectors are not.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(&self, collection: &str, query: VectorQuery) -> Result<Vec<ScoredPoint>>;

    async fn scroll(&self, collection: &str, request: ScrollRequest) -> Result<ScrollPage>;

    /// Text-target search for stores that support it. The keyword adapter
    /// uses this as a logged fallback when the text-match operator is
    /// unavailable.
    async fn discover(
        &self,
        collection: &str,
        target: &str,
        limit: usize,
        filter: Option<PayloadFilter>,
    ) -> Result<Vec<ScoredPoint>> {
        let _ = (collection, target, limit, filter);
        Err(Error::Unsupported("discover".to_string()))
    }
}

/// Document handed to a reranker backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankDocument {
    pub id: String,
    pub content: String,
}

/// Cross-encoder scoring backend. Scores are normalized to [0,1] and
/// returned in input order.
#[async_trait]
pub trait RerankBackend: Send + Sync {
    async fn score(&self, query: &str, documents: &[RerankDocument]) -> Result<Vec<f64>>;

    fn model(&self) -> &str;
}

/// Request to the LLM.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    Error,
    Cancelled,
}

/// Completion summary returned once a generation finishes.
#[derive(Debug, Clone)]
pub struct LlmCompletion {
    pub text: String,
    pub tokens: u32,
    pub total_time_ms: u64,
    pub finish_reason: FinishReason,
}

/// Streaming LLM backend. `generate_stream` sends token deltas on `tx` as
/// they arrive and returns the completion summary when done.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmCompletion>;

    async fn generate_stream(
        &self,
        request: &LlmRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<LlmCompletion>;

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str;

    /// Rough token estimate at ~4 chars/token.
    fn estimate_tokens(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }
}
