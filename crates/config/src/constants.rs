//! Centralized constants for the RAG query pipeline
//!
//! Single source of truth for infrastructure endpoints and search-engine
//! tuning defaults. Per-tenant policy (weights, thresholds, templates)
//! lives in `tenant.rs`, not here.

/// Service endpoints (loaded from env vars with fallback defaults)
pub mod endpoints {
    use once_cell::sync::Lazy;

    /// Qdrant vector store endpoint (env: QDRANT_URL)
    pub static QDRANT_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6333".to_string())
    });

    /// Embedding service endpoint (env: EMBEDDING_URL)
    pub static EMBEDDING_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("EMBEDDING_URL").unwrap_or_else(|_| "http://localhost:11434".to_string())
    });

    /// Reranker service endpoint (env: RERANKER_URL)
    pub static RERANKER_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("RERANKER_URL").unwrap_or_else(|_| "http://localhost:8087".to_string())
    });

    /// LLM endpoint (env: LLM_URL)
    pub static LLM_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("LLM_URL").unwrap_or_else(|_| "http://localhost:11434".to_string())
    });
}

/// Stage timeouts (in milliseconds unless noted)
pub mod timeouts {
    /// Embedding call timeout (ms)
    pub const EMBEDDING_MS: u64 = 2_000;

    /// Vector search timeout (ms)
    pub const VECTOR_SEARCH_MS: u64 = 2_000;

    /// Keyword search timeout (ms)
    pub const KEYWORD_SEARCH_MS: u64 = 2_000;

    /// Hard cap on a whole rerank call (ms)
    pub const RERANKER_MS: u64 = 500;

    /// Guardrail evaluation budget (ms)
    pub const GUARDRAIL_MS: u64 = 50;

    /// Budget reserved for LLM synthesis out of the overall deadline (ms)
    pub const SYNTHESIS_RESERVE_MS: u64 = 5_000;

    /// LLM request timeout (ms)
    pub const LLM_REQUEST_MS: u64 = 60_000;
}

/// Retrieval defaults
pub mod retrieval {
    /// Weight for vector (semantic) results in RRF fusion
    pub const VECTOR_WEIGHT: f64 = 0.7;

    /// Weight for keyword (lexical) results in RRF fusion
    pub const KEYWORD_WEIGHT: f64 = 0.3;

    /// RRF constant k (higher flattens the rank contribution curve)
    pub const RRF_K: f64 = 60.0;

    /// Default number of results requested per source
    pub const DEFAULT_LIMIT: usize = 10;

    /// Page size used when scrolling keyword candidates
    pub const SCROLL_PAGE_SIZE: usize = 256;

    /// BM25-style term saturation parameter
    pub const BM25_K1: f64 = 1.2;

    /// BM25-style length normalization parameter
    pub const BM25_B: f64 = 0.75;

    /// Assumed average document length in tokens (no corpus-wide stats
    /// without an inverted index)
    pub const BM25_AVG_DOC_LEN: f64 = 1000.0;
}

/// Reranker defaults
pub mod reranker {
    /// Results kept after reranking
    pub const TOP_K: usize = 8;

    /// Fused candidates handed to the reranker
    pub const TOP_N_IN: usize = 20;

    /// Documents per backend batch
    pub const BATCH_SIZE: usize = 16;

    /// Hard timeout for the whole rerank call (ms)
    pub const TIMEOUT_MS: u64 = 500;

    /// Minimum reranker score to keep a result (0 keeps everything)
    pub const SCORE_THRESHOLD: f64 = 0.0;

    /// Query truncation: ~300 tokens at ~4 chars/token
    pub const MAX_QUERY_CHARS: usize = 1_200;

    /// Document truncation: ~512 tokens at ~4 chars/token
    pub const MAX_DOC_CHARS: usize = 2_048;
}

/// Answerability guardrail defaults
pub mod guardrail {
    /// Ensemble weight for the statistical sub-score
    pub const WEIGHT_STATISTICAL: f64 = 0.4;

    /// Ensemble weight for the threshold sub-score
    pub const WEIGHT_THRESHOLD: f64 = 0.3;

    /// Ensemble weight for the ml-features sub-score
    pub const WEIGHT_ML_FEATURES: f64 = 0.2;

    /// Ensemble weight for reranker confidence (when the reranker ran)
    pub const WEIGHT_RERANKER: f64 = 0.1;

    /// Max suggestions attached to an IDK response
    pub const MAX_SUGGESTIONS: usize = 3;

    /// Minimum evidence score for a result to seed a suggestion
    pub const SUGGESTION_THRESHOLD: f64 = 0.5;
}

/// Tenant config cache defaults
pub mod cache {
    /// TTL for cached tenant config entries (seconds)
    pub const TENANT_TTL_SECS: u64 = 600;
}
