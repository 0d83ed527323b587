//! Per-tenant configuration
//!
//! Search weights, reranker toggle and guardrail policy for one tenant.
//! Values arrive over the wire in camelCase and are validated before the
//! store accepts them. Threshold presets are read-only constants.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::constants::{guardrail as gw, reranker as rr, retrieval as rt};
use crate::ConfigError;

/// Why an IDK response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    LowConfidence,
    NoRelevantDocs,
    AmbiguousQuery,
}

/// Named threshold presets plus a custom escape hatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKind {
    Strict,
    #[default]
    Standard,
    Permissive,
    Custom,
}

/// Guardrail decision gates. All score fields are in [0,1];
/// `min_result_count` is a count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailThreshold {
    #[serde(rename = "type", default)]
    pub kind: ThresholdKind,
    pub min_confidence: f64,
    pub min_top_score: f64,
    pub min_mean_score: f64,
    pub max_std_dev: f64,
    pub min_result_count: usize,
}

pub static STRICT_THRESHOLD: Lazy<GuardrailThreshold> = Lazy::new(|| GuardrailThreshold {
    kind: ThresholdKind::Strict,
    min_confidence: 0.7,
    min_top_score: 0.6,
    min_mean_score: 0.4,
    max_std_dev: 0.3,
    min_result_count: 3,
});

pub static STANDARD_THRESHOLD: Lazy<GuardrailThreshold> = Lazy::new(|| GuardrailThreshold {
    kind: ThresholdKind::Standard,
    min_confidence: 0.5,
    min_top_score: 0.4,
    min_mean_score: 0.25,
    max_std_dev: 0.4,
    min_result_count: 2,
});

pub static PERMISSIVE_THRESHOLD: Lazy<GuardrailThreshold> = Lazy::new(|| GuardrailThreshold {
    kind: ThresholdKind::Permissive,
    min_confidence: 0.3,
    min_top_score: 0.2,
    min_mean_score: 0.1,
    max_std_dev: 0.6,
    min_result_count: 1,
});

impl GuardrailThreshold {
    /// Resolve a preset by kind; `Custom` falls back to standard values
    /// (callers supply their own numbers for custom thresholds).
    pub fn preset(kind: ThresholdKind) -> Self {
        match kind {
            ThresholdKind::Strict => *STRICT_THRESHOLD,
            ThresholdKind::Standard | ThresholdKind::Custom => *STANDARD_THRESHOLD,
            ThresholdKind::Permissive => *PERMISSIVE_THRESHOLD,
        }
    }
}

impl Default for GuardrailThreshold {
    fn default() -> Self {
        *STANDARD_THRESHOLD
    }
}

/// Ensemble weights for the guardrail sub-scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmWeights {
    pub statistical: f64,
    pub threshold: f64,
    pub ml_features: f64,
    pub reranker_confidence: f64,
}

impl Default for AlgorithmWeights {
    fn default() -> Self {
        Self {
            statistical: gw::WEIGHT_STATISTICAL,
            threshold: gw::WEIGHT_THRESHOLD,
            ml_features: gw::WEIGHT_ML_FEATURES,
            reranker_confidence: gw::WEIGHT_RERANKER,
        }
    }
}

/// One IDK response template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdkTemplate {
    pub id: String,
    pub reason_code: ReasonCode,
    pub template: String,
    #[serde(default)]
    pub include_suggestions: bool,
}

/// Default template set covering every reason code.
pub fn default_idk_templates() -> Vec<IdkTemplate> {
    vec![
        IdkTemplate {
            id: "idk-low-confidence".to_string(),
            reason_code: ReasonCode::LowConfidence,
            template: "I don't have enough confidence in the available documents to answer that."
                .to_string(),
            include_suggestions: true,
        },
        IdkTemplate {
            id: "idk-no-docs".to_string(),
            reason_code: ReasonCode::NoRelevantDocs,
            template: "I couldn't find any documents relevant to your question.".to_string(),
            include_suggestions: false,
        },
        IdkTemplate {
            id: "idk-ambiguous".to_string(),
            reason_code: ReasonCode::AmbiguousQuery,
            template: "Your question matches several unrelated topics. Could you narrow it down?"
                .to_string(),
            include_suggestions: true,
        },
    ]
}

/// Suggestion derivation settings for IDK responses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackConfig {
    pub enabled: bool,
    pub max_suggestions: usize,
    pub suggestion_threshold: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_suggestions: gw::MAX_SUGGESTIONS,
            suggestion_threshold: gw::SUGGESTION_THRESHOLD,
        }
    }
}

/// Guardrail policy for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub threshold: GuardrailThreshold,
    #[serde(default)]
    pub algorithm_weights: AlgorithmWeights,
    #[serde(default = "default_idk_templates")]
    pub idk_templates: Vec<IdkTemplate>,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub bypass_enabled: bool,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: GuardrailThreshold::default(),
            algorithm_weights: AlgorithmWeights::default(),
            idk_templates: default_idk_templates(),
            fallback: FallbackConfig::default(),
            bypass_enabled: false,
        }
    }
}

/// Per-tenant reranker overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRerankerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
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

impl Default for TenantRerankerConfig {
    fn default() -> Self {
        Self {
            model: None,
            top_k: rr::TOP_K,
            top_n_in: rr::TOP_N_IN,
            batch_size: rr::BATCH_SIZE,
            timeout_ms: rr::TIMEOUT_MS,
            score_threshold: rr::SCORE_THRESHOLD,
        }
    }
}

/// Complete per-tenant configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfig {
    pub tenant_id: String,
    #[serde(default = "default_true")]
    pub keyword_search_enabled: bool,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default)]
    pub reranker_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reranker: Option<TenantRerankerConfig>,
    #[serde(default)]
    pub guardrail: GuardrailConfig,
}

impl TenantConfig {
    /// Default configuration for a tenant never seen before.
    pub fn default_for(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            keyword_search_enabled: true,
            vector_weight: rt::VECTOR_WEIGHT,
            keyword_weight: rt::KEYWORD_WEIGHT,
            rrf_k: rt::RRF_K,
            reranker_enabled: false,
            reranker: None,
            guardrail: GuardrailConfig::default(),
        }
    }

    /// Effective reranker settings (overrides or defaults).
    pub fn reranker_config(&self) -> TenantRerankerConfig {
        self.reranker.clone().unwrap_or_default()
    }

    /// Validate before the store accepts an update.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tenant_id.is_empty() {
            return Err(ConfigError::MissingField("tenantId".to_string()));
        }

        let weight_sum = self.vector_weight + self.keyword_weight;
        if !(0.8..=1.2).contains(&weight_sum) {
            return Err(ConfigError::InvalidValue {
                field: "vectorWeight+keywordWeight".to_string(),
                message: format!("sum {weight_sum:.3} outside [0.8, 1.2]"),
            });
        }
        for (name, w) in [
            ("vectorWeight", self.vector_weight),
            ("keywordWeight", self.keyword_weight),
        ] {
            if !(0.0..=1.0).contains(&w) {
                return Err(ConfigError::InvalidValue {
                    field: name.to_string(),
                    message: format!("{w} outside [0, 1]"),
                });
            }
        }
        if self.rrf_k < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "rrfK".to_string(),
                message: format!("{} below 1", self.rrf_k),
            });
        }

        let t = &self.guardrail.threshold;
        for (name, v) in [
            ("minConfidence", t.min_confidence),
            ("minTopScore", t.min_top_score),
            ("minMeanScore", t.min_mean_score),
            ("maxStdDev", t.max_std_dev),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::InvalidValue {
                    field: format!("guardrail.threshold.{name}"),
                    message: format!("{v} outside [0, 1]"),
                });
            }
        }
        if t.min_result_count > 100 {
            return Err(ConfigError::InvalidValue {
                field: "guardrail.threshold.minResultCount".to_string(),
                message: format!("{} outside [0, 100]", t.min_result_count),
            });
        }

        let w = &self.guardrail.algorithm_weights;
        let algo_sum = w.statistical + w.threshold + w.ml_features + w.reranker_confidence;
        for (name, v) in [
            ("statistical", w.statistical),
            ("threshold", w.threshold),
            ("mlFeatures", w.ml_features),
            ("rerankerConfidence", w.reranker_confidence),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::InvalidValue {
                    field: format!("guardrail.algorithmWeights.{name}"),
                    message: format!("{v} outside [0, 1]"),
                });
            }
        }
        if algo_sum <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "guardrail.algorithmWeights".to_string(),
                message: "weights sum to zero".to_string(),
            });
        }

        for template in &self.guardrail.idk_templates {
            if template.id.is_empty() || template.template.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "guardrail.idkTemplates".to_string(),
                    message: "template requires id, reasonCode and template text".to_string(),
                });
            }
        }

        if let Some(reranker) = &self.reranker {
            if reranker.top_k == 0 || reranker.batch_size == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "reranker".to_string(),
                    message: "topK and batchSize must be positive".to_string(),
                });
            }
        }

        Ok(())
    }
}

fn default_true() -> bool {
    true
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = TenantConfig::default_for("t1");
        assert!(config.validate().is_ok());
        assert_eq!(config.tenant_id, "t1");
        assert!(config.keyword_search_enabled);
    }

    #[test]
    fn test_weight_sum_rejected() {
        let mut config = TenantConfig::default_for("t1");
        config.vector_weight = 0.9;
        config.keyword_weight = 0.9;
        assert!(config.validate().is_err());

        config.vector_weight = 0.2;
        config.keyword_weight = 0.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rrf_k_floor() {
        let mut config = TenantConfig::default_for("t1");
        config.rrf_k = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_range_rejected() {
        let mut config = TenantConfig::default_for("t1");
        config.guardrail.threshold.min_confidence = 1.5;
        assert!(config.validate().is_err());

        let mut config = TenantConfig::default_for("t1");
        config.guardrail.threshold.min_result_count = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_template_rejected() {
        let mut config = TenantConfig::default_for("t1");
        config.guardrail.idk_templates.push(IdkTemplate {
            id: String::new(),
            reason_code: ReasonCode::LowConfidence,
            template: "x".to_string(),
            include_suggestions: false,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_presets_ordering() {
        assert!(STRICT_THRESHOLD.min_confidence > STANDARD_THRESHOLD.min_confidence);
        assert!(STANDARD_THRESHOLD.min_confidence > PERMISSIVE_THRESHOLD.min_confidence);
        assert!(STRICT_THRESHOLD.max_std_dev < PERMISSIVE_THRESHOLD.max_std_dev);
    }

    #[test]
    fn test_wire_shape_camel_case() {
        let config = TenantConfig::default_for("t1");
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("tenantId").is_some());
        assert!(json.get("keywordSearchEnabled").is_some());
        assert!(json["guardrail"].get("bypassEnabled").is_some());
    }

    #[test]
    fn test_default_templates_cover_reason_codes() {
        let templates = default_idk_templates();
        for code in [
            ReasonCode::LowConfidence,
            ReasonCode::NoRelevantDocs,
            ReasonCode::AmbiguousQuery,
        ] {
            assert!(templates.iter().any(|t| t.reason_code == code));
        }
    }
}
