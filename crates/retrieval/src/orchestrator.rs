//! Guarded retrieval orchestrator
//!
//! Runs the pipeline for one request: access filter → embed → (vector ∥
//! keyword) search → RRF fusion → optional rerank → ACL post-filter →
//! guardrail. Every stage is timed and bounded; vector-path failures are
//! fatal while keyword and rerank failures degrade the request. The caller
//! owns the overall wall-clock budget and is expected to reserve synthesis
//! headroom on top of the per-stage budgets here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use rag_agent_config::{RetrievalSettings, TenantConfigStore};
use rag_agent_core::{
    Embedder, FilterCondition, PayloadFilter, RankedResult, UserContext, VectorIndex,
};

use crate::access::build_filter;
use crate::fusion::{fuse, FusionParams};
use crate::guardrail::{Guardrail, GuardrailDecision, IdkResponse, SourceRanks};
use crate::keyword_search::KeywordSearchAdapter;
use crate::metrics::{PerformanceWindow, StageMetrics};
use crate::rerank::{RerankerAdapter, RerankerConfig};
use crate::vector_search::VectorSearchAdapter;
use crate::RetrievalError;

/// One retrieval request. Fusion parameters may override the tenant's
/// configured weights for this request only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<PayloadFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrf_k: Option<f64>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: None,
            filter: None,
            doc_id: None,
            vector_weight: None,
            keyword_weight: None,
            rrf_k: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }
}

/// Outcome of a guarded retrieval. `results` is present only when the
/// guardrail said answerable; the decision itself is always attached and
/// authoritative for synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardedRetrievalResult {
    pub is_answerable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<RankedResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idk_response: Option<IdkResponse>,
    pub decision: GuardrailDecision,
    pub metrics: StageMetrics,
}

pub struct GuardedRetriever {
    vector_search: VectorSearchAdapter,
    keyword_search: KeywordSearchAdapter,
    embedder: Arc<dyn Embedder>,
    reranker: RerankerAdapter,
    tenants: Arc<TenantConfigStore>,
    settings: RetrievalSettings,
    base_reranker_config: RerankerConfig,
    window: Arc<PerformanceWindow>,
}

impl GuardedRetriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        reranker: RerankerAdapter,
        tenants: Arc<TenantConfigStore>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            vector_search: VectorSearchAdapter::new(Arc::clone(&index)),
            keyword_search: KeywordSearchAdapter::new(index),
            embedder,
            reranker,
            tenants,
            settings,
            base_reranker_config: RerankerConfig::default(),
            window: Arc::new(PerformanceWindow::new()),
        }
    }

    pub fn with_reranker_config(mut self, config: RerankerConfig) -> Self {
        self.base_reranker_config = config;
        self
    }

    pub fn performance_window(&self) -> Arc<PerformanceWindow> {
        Arc::clone(&self.window)
    }

    /// Run the guarded pipeline for one request.
    pub async fn retrieve(
        &self,
        collection: &str,
        request: RetrievalRequest,
        user: &UserContext,
    ) -> Result<GuardedRetrievalResult, RetrievalError> {
        let total_started = Instant::now();

        if user.user_id.is_empty() || user.tenant_id.is_empty() {
            return Err(RetrievalError::Unauthorized(
                "request requires a user and tenant identity".to_string(),
            ));
        }

        let mut extra = request.filter.clone().unwrap_or_default();
        if let Some(doc_id) = &request.doc_id {
            extra = extra.must(FilterCondition::keyword("docId", doc_id.clone()));
        }
        let extra = if extra.is_empty() { None } else { Some(extra) };
        let access_filter = build_filter(user, extra)?;

        let tenant = self.tenants.get(&user.tenant_id);
        let limit = request.limit.unwrap_or(self.settings.limit);

        let query_vector = match timeout(
            Duration::from_millis(rag_agent_config::constants::timeouts::EMBEDDING_MS),
            self.embedder.embed_query(&request.query),
        )
        .await
        {
            Ok(Ok(vector)) => vector,
            Ok(Err(e)) => return Err(RetrievalError::EmbeddingFailed(e.to_string())),
            Err(_) => {
                return Err(RetrievalError::EmbeddingFailed(
                    "embedding call timed out".to_string(),
                ))
            }
        };

        // Vector and keyword search run concurrently; each carries its own
        // stage budget. The keyword leg degrades to an empty list on any
        // failure, the vector leg is fatal.
        let keyword_enabled =
            self.settings.keyword_search_enabled && tenant.keyword_search_enabled && limit > 0;

        let vector_budget = Duration::from_millis(self.settings.vector_timeout_ms);
        let keyword_budget = Duration::from_millis(self.settings.keyword_timeout_ms);

        let vector_future = async {
            let started = Instant::now();
            let outcome = timeout(
                vector_budget,
                self.vector_search
                    .search(collection, query_vector.clone(), limit, access_filter.clone()),
            )
            .await;
            (outcome, started.elapsed())
        };

        let keyword_future = async {
            if !keyword_enabled {
                return (Ok(Ok(Vec::new())), Duration::ZERO);
            }
            let started = Instant::now();
            let outcome = timeout(
                keyword_budget,
                self.keyword_search
                    .search(collection, &request.query, limit, access_filter.clone()),
            )
            .await;
            (outcome, started.elapsed())
        };

        let ((vector_outcome, vector_elapsed), (keyword_outcome, keyword_elapsed)) =
            tokio::join!(vector_future, keyword_future);

        let vector_results = match vector_outcome {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(RetrievalError::VectorSearchFailed(format!(
                    "vector search exceeded its {}ms budget",
                    self.settings.vector_timeout_ms
                )))
            }
        };

        let keyword_results = match keyword_outcome {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Keyword search failed, continuing vector-only");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    budget_ms = self.settings.keyword_timeout_ms,
                    "Keyword search timed out, continuing vector-only"
                );
                Vec::new()
            }
        };

        let source_ranks = SourceRanks {
            vector_ids: vector_results.iter().map(|r| r.id.clone()).collect(),
            keyword_ids: keyword_results.iter().map(|r| r.id.clone()).collect(),
        };
        let vector_result_count = vector_results.len();
        let keyword_result_count = keyword_results.len();

        let params = FusionParams {
            k: request.rrf_k.unwrap_or(tenant.rrf_k),
            vector_weight: request.vector_weight.unwrap_or(tenant.vector_weight),
            keyword_weight: request.keyword_weight.unwrap_or(tenant.keyword_weight),
        };
        let fusion_started = Instant::now();
        let fused = fuse(vector_results, keyword_results, params);
        let fusion_elapsed = fusion_started.elapsed();

        let reranking_enabled = tenant.reranker_enabled;
        let rerank_started = Instant::now();
        let (mut final_list, documents_reranked) = if reranking_enabled {
            let tenant_rerank = tenant.reranker_config();
            let mut config = self.base_reranker_config.with_tenant(&tenant_rerank);
            config.enabled = true;

            let mut candidates = fused;
            candidates.truncate(tenant_rerank.top_n_in);
            self.reranker.rerank(&request.query, candidates, &config).await
        } else {
            let mut list = fused;
            list.truncate(limit);
            (list, 0)
        };
        let rerank_elapsed = rerank_started.elapsed();
        let reranker_ran = documents_reranked > 0;

        // Defense in depth: re-check the ACL on every surviving result,
        // then reweight by language relevance.
        final_list.retain(|r| {
            let allowed = r.payload.allows(user);
            if !allowed {
                tracing::warn!(id = %r.id, "Dropping result failing post-filter ACL check");
            }
            allowed
        });

        if let Some(user_lang) = user.language.as_deref() {
            if !user_lang.is_empty() {
                for result in &mut final_list {
                    result.score *= language_factor(user_lang, result.payload.lang.as_deref());
                }
                final_list.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.id.cmp(&b.id))
                });
            }
        }
        for (idx, result) in final_list.iter_mut().enumerate() {
            result.rank = idx + 1;
        }

        let guardrail_started = Instant::now();
        let decision = Guardrail::evaluate(
            &request.query,
            &final_list,
            user,
            &tenant.guardrail,
            &source_ranks,
            reranker_ran,
        );
        let guardrail_elapsed = guardrail_started.elapsed();

        let metrics = StageMetrics {
            vector_search_duration_ms: vector_elapsed.as_millis() as u64,
            keyword_search_duration_ms: keyword_elapsed.as_millis() as u64,
            fusion_duration_ms: fusion_elapsed.as_millis() as u64,
            reranker_duration_ms: rerank_elapsed.as_millis() as u64,
            guardrail_duration_ms: guardrail_elapsed.as_millis() as u64,
            total_duration_ms: total_started.elapsed().as_millis() as u64,
            vector_result_count,
            keyword_result_count,
            final_result_count: final_list.len(),
            documents_reranked,
            reranking_enabled,
        };
        self.window.record(&user.tenant_id, metrics);

        tracing::debug!(
            tenant = %user.tenant_id,
            answerable = decision.is_answerable,
            results = final_list.len(),
            total_ms = metrics.total_duration_ms,
            "Guarded retrieval complete"
        );

        let is_answerable = decision.is_answerable;
        Ok(GuardedRetrievalResult {
            is_answerable,
            results: if is_answerable { Some(final_list) } else { None },
            idk_response: decision.idk_response.clone(),
            decision,
            metrics,
        })
    }
}

/// Language relevance multiplier: 1.0 on a primary-subtag match, 0.7 on a
/// mismatch, no reweight when the chunk carries no language tag.
fn language_factor(user_lang: &str, chunk_lang: Option<&str>) -> f64 {
    match chunk_lang {
        Some(lang) if !lang.is_empty() => {
            if primary_subtag(lang).eq_ignore_ascii_case(primary_subtag(user_lang)) {
                1.0
            } else {
                0.7
            }
        }
        _ => 1.0,
    }
}

fn primary_subtag(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}
