//! Error types shared by the pipeline crates

use thiserror::Error;

/// Errors raised by core collaborators (embedding, vector store, reranker,
/// LLM). Stage-level failure semantics live in the retrieval crate; this
/// enum only names the fault domain.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid user context: {0}")]
    InvalidUser(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Reranker error: {0}")]
    Reranker(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, Error>;
