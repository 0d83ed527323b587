//! Core traits and types for the RAG query pipeline
//!
//! This crate provides the foundational types used across all other crates:
//! - Identity and access types (`UserContext`, access predicate)
//! - Chunk payload and ranked-result types that flow between stages
//! - The payload-filter grammar consumed by the vector store
//! - Score statistics shared by fusion and the guardrail
//! - Traits for pluggable collaborators (embedding, vector index,
//!   reranker, LLM)
//! - Error types

pub mod chunk;
pub mod error;
pub mod filter;
pub mod identity;
pub mod stats;
pub mod traits;

pub use chunk::{ChunkPayload, RankedResult, SearchType};
pub use error::{Error, Result};
pub use filter::{FilterCondition, MatchValue, PayloadFilter};
pub use identity::UserContext;
pub use stats::{Percentiles, ScoreStats};
pub use traits::{
    Embedder, FinishReason, LlmBackend, LlmCompletion, LlmRequest, RerankBackend, RerankDocument,
    ScoredPoint, ScrollPage, ScrollRequest, VectorIndex, VectorQuery,
};
