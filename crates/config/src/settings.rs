//! Process settings
//!
//! Loaded once at startup from an optional file plus `RAG_AGENT_*`
//! environment overrides (e.g. `RAG_AGENT_QDRANT__ENDPOINT`). Every field
//! has a serde default so a missing file yields a fully usable
//! configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{endpoints, reranker as rr, retrieval as rt, timeouts};
use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantSettings {
    #[serde(default = "default_qdrant_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for QdrantSettings {
    fn default() -> Self {
        Self {
            endpoint: default_qdrant_endpoint(),
            collection: default_collection(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Embedding dimension; tenant-configurable upstream, 384 by default.
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,
    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            vector_dim: default_vector_dim(),
            timeout_ms: default_embedding_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_reranker_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_reranker_model")]
    pub model: String,
    #[serde(default = "default_rerank_top_k")]
    pub top_k: usize,
    #[serde(default = "default_rerank_top_n_in")]
    pub top_n_in: usize,
    #[serde(default = "default_rerank_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_rerank_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub score_threshold: f64,
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_reranker_endpoint(),
            model: default_reranker_model(),
            top_k: default_rerank_top_k(),
            top_n_in: default_rerank_top_n_in(),
            batch_size: default_rerank_batch_size(),
            timeout_ms: default_rerank_timeout_ms(),
            score_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
            timeout_ms: default_llm_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_true")]
    pub keyword_search_enabled: bool,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default = "default_vector_timeout_ms")]
    pub vector_timeout_ms: u64,
    #[serde(default = "default_keyword_timeout_ms")]
    pub keyword_timeout_ms: u64,
    #[serde(default = "default_guardrail_timeout_ms")]
    pub guardrail_timeout_ms: u64,
    /// Budget reserved for synthesis out of the caller's overall deadline.
    #[serde(default = "default_synthesis_reserve_ms")]
    pub synthesis_reserve_ms: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            keyword_search_enabled: true,
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
            rrf_k: default_rrf_k(),
            vector_timeout_ms: default_vector_timeout_ms(),
            keyword_timeout_ms: default_keyword_timeout_ms(),
            guardrail_timeout_ms: default_guardrail_timeout_ms(),
            synthesis_reserve_ms: default_synthesis_reserve_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub qdrant: QdrantSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub reranker: RerankerSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    /// Tenant config cache TTL (seconds).
    #[serde(default = "default_tenant_cache_ttl_secs")]
    pub tenant_cache_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            qdrant: QdrantSettings::default(),
            embedding: EmbeddingSettings::default(),
            reranker: RerankerSettings::default(),
            llm: LlmSettings::default(),
            retrieval: RetrievalSettings::default(),
            tenant_cache_ttl_secs: default_tenant_cache_ttl_secs(),
        }
    }
}

/// Load settings from `config_path` (optional) layered under `RAG_AGENT_*`
/// environment overrides.
pub fn load_settings(config_path: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::with_name(path).required(false));
    }

    let loaded = builder
        .add_source(
            config::Environment::with_prefix("RAG_AGENT")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings: Settings = loaded.try_deserialize()?;
    Ok(settings)
}

fn default_qdrant_endpoint() -> String {
    endpoints::QDRANT_DEFAULT.clone()
}

fn default_collection() -> String {
    "knowledge_chunks".to_string()
}

fn default_embedding_endpoint() -> String {
    endpoints::EMBEDDING_DEFAULT.clone()
}

fn default_embedding_model() -> String {
    "bge-small-en-v1.5".to_string()
}

fn default_vector_dim() -> usize {
    384
}

fn default_embedding_timeout_ms() -> u64 {
    timeouts::EMBEDDING_MS
}

fn default_reranker_endpoint() -> String {
    endpoints::RERANKER_DEFAULT.clone()
}

fn default_reranker_model() -> String {
    "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string()
}

fn default_rerank_top_k() -> usize {
    rr::TOP_K
}

fn default_rerank_top_n_in() -> usize {
    rr::TOP_N_IN
}

fn default_rerank_batch_size() -> usize {
    rr::BATCH_SIZE
}

fn default_rerank_timeout_ms() -> u64 {
    rr::TIMEOUT_MS
}

fn default_llm_endpoint() -> String {
    endpoints::LLM_DEFAULT.clone()
}

fn default_llm_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_llm_max_tokens() -> usize {
    1024
}

fn default_llm_temperature() -> f32 {
    0.2
}

fn default_llm_timeout_ms() -> u64 {
    timeouts::LLM_REQUEST_MS
}

fn default_limit() -> usize {
    rt::DEFAULT_LIMIT
}

fn default_vector_weight() -> f64 {
    rt::VECTOR_WEIGHT
}

fn default_keyword_weight() -> f64 {
    rt::KEYWORD_WEIGHT
}

fn default_rrf_k() -> f64 {
    rt::RRF_K
}

fn default_vector_timeout_ms() -> u64 {
    timeouts::VECTOR_SEARCH_MS
}

fn default_keyword_timeout_ms() -> u64 {
    timeouts::KEYWORD_SEARCH_MS
}

fn default_guardrail_timeout_ms() -> u64 {
    timeouts::GUARDRAIL_MS
}

fn default_synthesis_reserve_ms() -> u64 {
    timeouts::SYNTHESIS_RESERVE_MS
}

fn default_tenant_cache_ttl_secs() -> u64 {
    crate::constants::cache::TENANT_TTL_SECS
}

fn default_true() -> bool {
    true
}
