//! Cross-encoder reranking
//!
//! Optional second-pass scoring of the fused candidates. Two backends sit
//! behind the `RerankBackend` trait: an HTTP cross-encoder service and an
//! in-process scorer (a real ONNX cross-encoder behind the `onnx` feature,
//! a lexical-overlap approximation otherwise).
//!
//! The adapter never raises: on disable, transport failure or the hard
//! per-call timeout it passes the inputs through unchanged (order and
//! cardinality preserved, `reranker_score` set to the original score) and
//! logs the degradation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use rag_agent_config::constants::reranker as rr;
use rag_agent_config::{RerankerSettings, TenantRerankerConfig};
use rag_agent_core::{Error, RankedResult, RerankBackend, RerankDocument};

/// Adapter configuration. Inputs are token-capped via character limits at
/// ~4 chars/token (query ≈ 300 tokens, document ≈ 512 tokens).
#[derive(Debug, Clone)]
pub struct RerankerConfig {
    pub enabled: bool,
    pub top_k: usize,
    pub batch_size: usize,
    pub timeout: Duration,
    pub score_threshold: f64,
    pub max_query_chars: usize,
    pub max_doc_chars: usize,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            top_k: rr::TOP_K,
            batch_size: rr::BATCH_SIZE,
            timeout: Duration::from_millis(rr::TIMEOUT_MS),
            score_threshold: rr::SCORE_THRESHOLD,
            max_query_chars: rr::MAX_QUERY_CHARS,
            max_doc_chars: rr::MAX_DOC_CHARS,
        }
    }
}

impl RerankerConfig {
    pub fn from_settings(settings: &RerankerSettings) -> Self {
        Self {
            enabled: settings.enabled,
            top_k: settings.top_k,
            batch_size: settings.batch_size,
            timeout: Duration::from_millis(settings.timeout_ms),
            score_threshold: settings.score_threshold,
            ..Default::default()
        }
    }

    /// Apply a tenant's overrides on top of this configuration.
    pub fn with_tenant(&self, tenant: &TenantRerankerConfig) -> Self {
        Self {
            enabled: self.enabled,
            top_k: tenant.top_k,
            batch_size: tenant.batch_size,
            timeout: Duration::from_millis(tenant.timeout_ms),
            score_threshold: tenant.score_threshold,
            max_query_chars: self.max_query_chars,
            max_doc_chars: self.max_doc_chars,
        }
    }
}

/// Counters for monitoring rerank behavior.
#[derive(Debug, Clone, Default)]
pub struct RerankerStats {
    pub total_calls: usize,
    pub documents_scored: usize,
    pub pass_throughs: usize,
    pub timeouts: usize,
}

/// The rerank stage. Holds an optional backend; without one every call is
/// a pass-through.
pub struct RerankerAdapter {
    backend: Option<Arc<dyn RerankBackend>>,
    config: RerankerConfig,
    stats: Mutex<RerankerStats>,
}

impl RerankerAdapter {
    pub fn new(backend: Option<Arc<dyn RerankBackend>>, config: RerankerConfig) -> Self {
        Self {
            backend,
            config,
            stats: Mutex::new(RerankerStats::default()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, RerankerConfig::default())
    }

    pub fn stats(&self) -> RerankerStats {
        self.stats.lock().clone()
    }

    /// Rerank the candidates with `config` (tenant-resolved). Returns the
    /// final list and the number of documents actually scored by the
    /// backend (0 on pass-through).
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RankedResult>,
        config: &RerankerConfig,
    ) -> (Vec<RankedResult>, usize) {
        self.stats.lock().total_calls += 1;

        if candidates.is_empty() {
            return (candidates, 0);
        }

        let backend = match (&self.backend, config.enabled) {
            (Some(backend), true) => Arc::clone(backend),
            _ => {
                return (self.pass_through(candidates), 0);
            }
        };

        let query = truncate_chars(query, config.max_query_chars);
        let documents: Vec<RerankDocument> = candidates
            .iter()
            .map(|r| RerankDocument {
                id: r.id.clone(),
                content: truncate_chars(&r.content, config.max_doc_chars).to_string(),
            })
            .collect();

        let scored = timeout(
            config.timeout,
            score_batches(backend, query, &documents, config.batch_size),
        )
        .await;

        match scored {
            Ok(Ok(scores)) => {
                let count = candidates.len();
                self.stats.lock().documents_scored += count;
                (self.apply_scores(candidates, scores, config), count)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Reranker backend failed, passing candidates through");
                (self.pass_through(candidates), 0)
            }
            Err(_) => {
                tracing::warn!(
                    budget_ms = config.timeout.as_millis() as u64,
                    "Reranker exceeded its hard timeout, passing candidates through"
                );
                self.stats.lock().timeouts += 1;
                (self.pass_through(candidates), 0)
            }
        }
    }

    fn apply_scores(
        &self,
        candidates: Vec<RankedResult>,
        scores: Vec<f64>,
        config: &RerankerConfig,
    ) -> Vec<RankedResult> {
        let mut reranked: Vec<RankedResult> = candidates
            .into_iter()
            .zip(scores)
            .map(|(mut result, score)| {
                let score = score.clamp(0.0, 1.0);
                result.reranker_score = Some(score);
                result.score = score;
                result
            })
            .filter(|r| r.score >= config.score_threshold)
            .collect();

        reranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        reranked.truncate(config.top_k);
        for (idx, result) in reranked.iter_mut().enumerate() {
            result.rank = idx + 1;
        }
        reranked
    }

    /// Return the inputs unchanged: same order, same cardinality, ranks
    /// preserved, `reranker_score` mirroring the original score.
    fn pass_through(&self, mut candidates: Vec<RankedResult>) -> Vec<RankedResult> {
        self.stats.lock().pass_throughs += 1;
        for result in &mut candidates {
            result.reranker_score = Some(result.score);
        }
        candidates
    }
}

/// Score all documents in sequential batches (remote services rate-limit;
/// batches are not parallelized). Returned scores align with input order.
async fn score_batches(
    backend: Arc<dyn RerankBackend>,
    query: &str,
    documents: &[RerankDocument],
    batch_size: usize,
) -> Result<Vec<f64>, Error> {
    let batch_size = batch_size.max(1);
    let mut scores = Vec::with_capacity(documents.len());
    for batch in documents.chunks(batch_size) {
        let batch_scores = backend.score(query, batch).await?;
        if batch_scores.len() != batch.len() {
            return Err(Error::Reranker(format!(
                "backend returned {} scores for {} documents",
                batch_scores.len(),
                batch.len()
            )));
        }
        scores.extend(batch_scores);
    }
    Ok(scores)
}

/// Truncate at a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// HTTP backend

#[derive(Debug, Serialize)]
struct HttpRerankRequest<'a> {
    query: &'a str,
    documents: &'a [RerankDocument],
    model: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct HttpRerankResult {
    id: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct HttpRerankResponse {
    results: Vec<HttpRerankResult>,
}

/// HTTP cross-encoder service client.
pub struct HttpReranker {
    client: Client,
    endpoint: String,
    model: String,
}

impl HttpReranker {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self, Error> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
        })
    }

    pub fn from_settings(settings: &RerankerSettings) -> Result<Self, Error> {
        Self::new(settings.endpoint.clone(), settings.model.clone())
    }

    pub async fn health(&self) -> bool {
        let url = format!("{}/health", self.endpoint);
        matches!(self.client.get(&url).send().await, Ok(r) if r.status().is_success())
    }
}

#[async_trait]
impl RerankBackend for HttpReranker {
    async fn score(&self, query: &str, documents: &[RerankDocument]) -> Result<Vec<f64>, Error> {
        let request = HttpRerankRequest {
            query,
            documents,
            model: &self.model,
            top_k: documents.len(),
        };

        let url = format!("{}/rerank", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Reranker(format!("rerank request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Reranker(format!("rerank service returned {status}")));
        }

        let parsed: HttpRerankResponse = response
            .json()
            .await
            .map_err(|e| Error::Reranker(format!("malformed rerank response: {e}")))?;

        // Response is sorted by score; realign to input order by id.
        let mut scores = vec![0.0f64; documents.len()];
        for result in parsed.results {
            if let Some(idx) = documents.iter().position(|d| d.id == result.id) {
                scores[idx] = result.score.clamp(0.0, 1.0);
            }
        }
        Ok(scores)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// In-process backend

/// In-process cross-encoder. With the `onnx` feature this runs a real
/// model; without it, a lexical-overlap approximation keeps the variant
/// usable in tests and minimal deployments.
pub struct CrossEncoder {
    #[cfg(feature = "onnx")]
    session: ort::session::Session,
    #[cfg(feature = "onnx")]
    tokenizer: tokenizers::Tokenizer,
    #[cfg(feature = "onnx")]
    max_seq_len: usize,
    model: String,
}

impl CrossEncoder {
    #[cfg(feature = "onnx")]
    pub fn new(
        model_path: impl AsRef<std::path::Path>,
        tokenizer_path: impl AsRef<std::path::Path>,
        max_seq_len: usize,
    ) -> Result<Self, Error> {
        use ort::session::builder::GraphOptimizationLevel;

        let session = ort::session::Session::builder()
            .map_err(|e| Error::Reranker(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| Error::Reranker(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e| Error::Reranker(e.to_string()))?
            .commit_from_file(model_path.as_ref())
            .map_err(|e| Error::Reranker(e.to_string()))?;

        let tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path.as_ref())
            .map_err(|e| Error::Reranker(e.to_string()))?;

        Ok(Self {
            session,
            tokenizer,
            max_seq_len,
            model: model_path.as_ref().to_string_lossy().into_owned(),
        })
    }

    #[cfg(not(feature = "onnx"))]
    pub fn lexical() -> Self {
        Self {
            model: "lexical-overlap".to_string(),
        }
    }

    #[cfg(feature = "onnx")]
    fn score_pair(&self, query: &str, document: &str) -> Result<f64, Error> {
        use ndarray::Array2;
        use ort::value::Tensor;

        let encoding = self
            .tokenizer
            .encode((query, document), true)
            .map_err(|e| Error::Reranker(e.to_string()))?;

        let ids: Vec<i64> = encoding
            .get_ids()
            .iter()
            .take(self.max_seq_len)
            .map(|&id| id as i64)
            .collect();

        let mut padded_ids = vec![0i64; self.max_seq_len];
        let mut padded_mask = vec![0i64; self.max_seq_len];
        padded_ids[..ids.len()].copy_from_slice(&ids);
        for slot in padded_mask.iter_mut().take(ids.len()) {
            *slot = 1;
        }

        let input_ids = Array2::from_shape_vec((1, self.max_seq_len), padded_ids)
            .map_err(|e| Error::Reranker(e.to_string()))?;
        let attention = Array2::from_shape_vec((1, self.max_seq_len), padded_mask)
            .map_err(|e| Error::Reranker(e.to_string()))?;

        let input_tensor =
            Tensor::from_array(input_ids).map_err(|e| Error::Reranker(e.to_string()))?;
        let mask_tensor =
            Tensor::from_array(attention).map_err(|e| Error::Reranker(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![
                "input_ids" => input_tensor,
                "attention_mask" => mask_tensor,
            ])
            .map_err(|e| Error::Reranker(e.to_string()))?;

        let (_, logits) = outputs
            .get("logits")
            .ok_or_else(|| Error::Reranker("missing logits output".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Reranker(e.to_string()))?;

        Ok(relevance_from_logits(logits))
    }

    /// Lexical overlap score in [0,1]: tf-weighted term matches with a
    /// coverage bonus, squashed by s/(1+s).
    #[cfg(not(feature = "onnx"))]
    fn lexical_score(query: &str, document: &str) -> f64 {
        let query_terms = crate::keyword_search::tokenize(query);
        if query_terms.is_empty() {
            return 0.0;
        }
        let doc_tokens = crate::keyword_search::tokenize(document);

        let mut raw = 0.0f64;
        let mut matched = 0usize;
        for term in &query_terms {
            let tf = doc_tokens.iter().filter(|t| *t == term).count() as f64;
            if tf > 0.0 {
                matched += 1;
                raw += tf.sqrt() * (1.0 + term.len() as f64).ln();
            }
        }

        let coverage = matched as f64 / query_terms.len() as f64;
        let raw = raw + coverage * 0.5;
        raw / (1.0 + raw)
    }
}

/// Softmax relevance probability from a cross-encoder logit slice.
#[cfg(feature = "onnx")]
fn relevance_from_logits(logits: &[f32]) -> f64 {
    if logits.len() >= 2 {
        let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exp_sum: f32 = logits.iter().map(|&x| (x - max).exp()).sum();
        ((logits[1] - max).exp() / exp_sum) as f64
    } else if logits.len() == 1 {
        (1.0 / (1.0 + (-logits[0]).exp())) as f64
    } else {
        0.0
    }
}

#[async_trait]
impl RerankBackend for CrossEncoder {
    async fn score(&self, query: &str, documents: &[RerankDocument]) -> Result<Vec<f64>, Error> {
        #[cfg(feature = "onnx")]
        {
            let mut scores = Vec::with_capacity(documents.len());
            for doc in documents {
                scores.push(self.score_pair(query, &doc.content)?);
            }
            Ok(scores)
        }

        #[cfg(not(feature = "onnx"))]
        {
            Ok(documents
                .iter()
                .map(|doc| Self::lexical_score(query, &doc.content))
                .collect())
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}
