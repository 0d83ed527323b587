//! Guarded hybrid retrieval
//!
//! The retrieval-and-answerability core of the pipeline:
//! - Access filter construction (tenant + ACL + language)
//! - Vector and keyword search adapters over the vector store
//! - Reciprocal Rank Fusion of the two candidate lists
//! - Optional cross-encoder reranking with a pass-through fallback
//! - The answerability guardrail (ensemble confidence + per-tenant
//!   thresholds + IDK fallback)
//! - The orchestrator tying the stages together under per-stage timeouts,
//!   with stage metrics and audit records

pub mod access;
pub mod embedding;
pub mod fusion;
pub mod guardrail;
pub mod keyword_search;
pub mod metrics;
pub mod orchestrator;
pub mod qdrant;
pub mod rerank;
pub mod vector_search;

pub use access::build_filter;
pub use embedding::{EmbeddingClientConfig, HttpEmbedder};
pub use fusion::{fuse, FusionParams};
pub use guardrail::{
    AlgorithmScores, AnswerabilityScore, AuditRecord, DecisionRationale, Guardrail,
    GuardrailDecision, IdkResponse, SourceRanks,
};
pub use keyword_search::KeywordSearchAdapter;
pub use metrics::{PerformanceWindow, StageMetrics, WindowSummary};
pub use orchestrator::{GuardedRetrievalResult, GuardedRetriever, RetrievalRequest};
pub use qdrant::{QdrantIndex, QdrantIndexConfig};
pub use rerank::{CrossEncoder, HttpReranker, RerankerAdapter, RerankerConfig, RerankerStats};
pub use vector_search::VectorSearchAdapter;

use thiserror::Error;

/// Retrieval pipeline errors, aligned with the caller-facing error table:
/// fatal kinds surface to the caller; keyword and reranker failures are
/// absorbed as degradations by the orchestrator and never appear here.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid user context: {0}")]
    InvalidUser(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("Vector search failed: {0}")]
    VectorSearchFailed(String),

    #[error("Keyword search failed: {0}")]
    KeywordSearchFailed(String),

    #[error("Reranker failed: {0}")]
    RerankerFailed(String),

    #[error("Stage '{stage}' exceeded its {budget_ms}ms budget")]
    StageTimeout { stage: &'static str, budget_ms: u64 },

    #[error("Overall retrieval deadline exceeded")]
    OverallTimeout,

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl From<rag_agent_config::ConfigError> for RetrievalError {
    fn from(err: rag_agent_config::ConfigError) -> Self {
        RetrievalError::ConfigInvalid(err.to_string())
    }
}
