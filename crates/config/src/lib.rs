//! Configuration management for the RAG query pipeline
//!
//! Two layers live here:
//! - Process settings (`Settings`): service endpoints, collection names and
//!   pipeline defaults, loaded from a file plus `RAG_AGENT_*` environment
//!   overrides.
//! - Per-tenant configuration (`TenantConfig`): search weights, reranker
//!   toggle and guardrail policy, held in a TTL-cached store with change
//!   notifications.

pub mod constants;
pub mod settings;
pub mod store;
pub mod tenant;

pub use settings::{
    load_settings, EmbeddingSettings, LlmSettings, QdrantSettings, RerankerSettings,
    RetrievalSettings, Settings,
};
pub use store::{TenantConfigEvent, TenantConfigStore};
pub use tenant::{
    AlgorithmWeights, FallbackConfig, GuardrailConfig, GuardrailThreshold, IdkTemplate,
    ReasonCode, TenantConfig, TenantRerankerConfig, ThresholdKind,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
