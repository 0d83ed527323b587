//! End-to-end tests for the guarded retrieval pipeline over an in-memory
//! vector index with deterministic payload filtering and cosine scoring.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use rag_agent_config::{ReasonCode, RetrievalSettings, TenantConfig, TenantConfigStore};
use rag_agent_core::{
    Embedder, Error, FilterCondition, MatchValue, PayloadFilter, RerankBackend, RerankDocument,
    ScoredPoint, ScrollPage, ScrollRequest, SearchType, UserContext, VectorIndex, VectorQuery,
};
use rag_agent_retrieval::{
    DecisionRationale, GuardedRetriever, RerankerAdapter, RerankerConfig, RetrievalError,
    RetrievalRequest,
};

const DIM: usize = 6;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

// ---------------------------------------------------------------------------
// In-memory collaborators

#[derive(Clone)]
struct StoredChunk {
    id: String,
    vector: Vec<f32>,
    payload: serde_json::Value,
}

fn chunk(id: &str, tenant: &str, acl: &[&str], content: &str, vector: [f32; DIM]) -> StoredChunk {
    StoredChunk {
        id: id.to_string(),
        vector: vector.to_vec(),
        payload: serde_json::json!({
            "tenant": tenant,
            "docId": format!("doc-{id}"),
            "acl": acl,
            "content": content,
        }),
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)) as f64
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn condition_matches(payload: &serde_json::Value, condition: &FilterCondition) -> bool {
    let FilterCondition::Match { key, value } = condition;
    let field = payload.get(key);
    match value {
        MatchValue::Keyword(keyword) => match field {
            Some(serde_json::Value::String(s)) => s == keyword,
            Some(serde_json::Value::Array(items)) => {
                items.iter().any(|v| v.as_str() == Some(keyword))
            }
            _ => false,
        },
        MatchValue::AnyOf(keywords) => match field {
            Some(serde_json::Value::String(s)) => keywords.iter().any(|k| k == s),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .any(|s| keywords.iter().any(|k| k == s)),
            _ => false,
        },
        MatchValue::Text(text) => match field {
            Some(serde_json::Value::String(s)) => {
                let haystack = tokens(s);
                tokens(text).iter().all(|t| haystack.contains(t))
            }
            _ => false,
        },
    }
}

fn filter_matches(payload: &serde_json::Value, filter: &PayloadFilter) -> bool {
    filter.must.iter().all(|c| condition_matches(payload, c))
        && !filter.must_not.iter().any(|c| condition_matches(payload, c))
        && (filter.should.is_empty() || filter.should.iter().any(|c| condition_matches(payload, c)))
}

struct MemoryIndex {
    chunks: Vec<StoredChunk>,
    fail_scroll: bool,
}

impl MemoryIndex {
    fn new(chunks: Vec<StoredChunk>) -> Self {
        Self {
            chunks,
            fail_scroll: false,
        }
    }

    fn with_failing_scroll(chunks: Vec<StoredChunk>) -> Self {
        Self {
            chunks,
            fail_scroll: true,
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn search(&self, _collection: &str, query: VectorQuery) -> Result<Vec<ScoredPoint>, Error> {
        let mut hits: Vec<ScoredPoint> = self
            .chunks
            .iter()
            .filter(|c| {
                query
                    .filter
                    .as_ref()
                    .map(|f| filter_matches(&c.payload, f))
                    .unwrap_or(true)
            })
            .map(|c| ScoredPoint {
                id: c.id.clone(),
                score: cosine(&query.vector, &c.vector),
                payload: c.payload.clone(),
            })
            .filter(|p| p.score > 0.0)
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap()
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn scroll(&self, _collection: &str, request: ScrollRequest) -> Result<ScrollPage, Error> {
        if self.fail_scroll {
            return Err(Error::Search("scroll backend unavailable".to_string()));
        }
        let points = self
            .chunks
            .iter()
            .filter(|c| filter_matches(&c.payload, &request.filter))
            .map(|c| ScoredPoint {
                id: c.id.clone(),
                score: 0.0,
                payload: c.payload.clone(),
            })
            .collect();
        Ok(ScrollPage {
            points,
            next_offset: None,
        })
    }
}

/// Returns a cross-tenant point from search regardless of the filter,
/// simulating a store whose payloads were tampered with.
struct TamperedIndex {
    inner: MemoryIndex,
    planted: StoredChunk,
}

#[async_trait]
impl VectorIndex for TamperedIndex {
    async fn search(&self, collection: &str, query: VectorQuery) -> Result<Vec<ScoredPoint>, Error> {
        let mut hits = self.inner.search(collection, query).await?;
        hits.push(ScoredPoint {
            id: self.planted.id.clone(),
            score: 0.99,
            payload: self.planted.payload.clone(),
        });
        Ok(hits)
    }

    async fn scroll(&self, collection: &str, request: ScrollRequest) -> Result<ScrollPage, Error> {
        self.inner.scroll(collection, request).await
    }
}

/// Deterministic embedder over a fixed phrase table; unknown text embeds to
/// the zero vector.
struct TableEmbedder {
    table: HashMap<String, [f32; DIM]>,
}

impl TableEmbedder {
    fn new(entries: &[(&str, [f32; DIM])]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, Error> {
        Ok(self
            .table
            .get(text)
            .map(|v| v.to_vec())
            .unwrap_or_else(|| vec![0.0; DIM]))
    }

    fn dim(&self) -> usize {
        DIM
    }
}

struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, Error> {
        Err(Error::Embedding("model unavailable".to_string()))
    }

    fn dim(&self) -> usize {
        DIM
    }
}

struct SlowRerankBackend;

#[async_trait]
impl RerankBackend for SlowRerankBackend {
    async fn score(&self, _query: &str, documents: &[RerankDocument]) -> Result<Vec<f64>, Error> {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok(vec![1.0; documents.len()])
    }

    fn model(&self) -> &str {
        "slow"
    }
}

struct RecordingRerankBackend {
    calls: Arc<Mutex<usize>>,
}

#[async_trait]
impl RerankBackend for RecordingRerankBackend {
    async fn score(&self, _query: &str, documents: &[RerankDocument]) -> Result<Vec<f64>, Error> {
        *self.calls.lock().await += 1;
        // Rank documents by position, descending but bounded.
        Ok(documents
            .iter()
            .enumerate()
            .map(|(i, _)| 0.9 - 0.05 * i as f64)
            .collect())
    }

    fn model(&self) -> &str {
        "recording"
    }
}

// ---------------------------------------------------------------------------
// Fixtures

const Q_REFUND: [f32; DIM] = [1.0, 0.15, 0.0, 0.0, 0.0, 0.0];
const Q_QUANTUM: [f32; DIM] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0];
const Q_BUDGET: [f32; DIM] = [0.0, 0.0, 0.0, 0.0, 1.0, 0.0];

fn embedder() -> Arc<TableEmbedder> {
    Arc::new(TableEmbedder::new(&[
        ("refund policy", Q_REFUND),
        ("quantum chromodynamics", Q_QUANTUM),
        ("quarterly budget", Q_BUDGET),
    ]))
}

fn corpus() -> Vec<StoredChunk> {
    vec![
        chunk(
            "c1",
            "t1",
            &["public"],
            "Refund policy: full refund within 30 days.",
            [1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ),
        chunk(
            "c2",
            "t1",
            &["public"],
            "Shipping policy handbook for parcels.",
            [0.35, 0.94, 0.0, 0.0, 0.0, 0.0],
        ),
        chunk(
            "c3",
            "t1",
            &["public"],
            "Office lunch menu on Tuesdays.",
            [0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
        ),
        chunk(
            "c4",
            "t1",
            &["public"],
            "Particle physics glossary of quantum terms.",
            [0.0, 0.0, 0.984, 0.18, 0.0, 0.0],
        ),
        chunk(
            "c5",
            "t1",
            &["public"],
            "Lab equipment inventory list.",
            [0.0, 0.0, 0.9995, 0.03, 0.0, 0.0],
        ),
        chunk(
            "c6",
            "t1",
            &["public"],
            "Annual holiday schedule overview.",
            [0.0, 0.0, 0.999, 0.04, 0.0, 0.0],
        ),
        chunk(
            "c7",
            "t1",
            &["g_finance"],
            "Internal refund fraud playbook.",
            [0.97, 0.05, 0.0, 0.0, 0.0, 0.0],
        ),
        // Foreign tenant content, matching the budget query only.
        chunk(
            "c9",
            "t2",
            &["public"],
            "Quarterly budget numbers for the board.",
            [0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        ),
    ]
}

fn refund_heavy_corpus() -> Vec<StoredChunk> {
    (0..5)
        .map(|i| {
            chunk(
                &format!("rc{i}"),
                "t1",
                &["public"],
                &format!("Refund policy clause {i} covering refunds."),
                [1.0 - 0.04 * i as f32, 0.02 * i as f32, 0.0, 0.0, 0.0, 0.0],
            )
        })
        .collect()
}

fn retriever(index: Arc<dyn VectorIndex>) -> GuardedRetriever {
    GuardedRetriever::new(
        index,
        embedder(),
        RerankerAdapter::disabled(),
        Arc::new(TenantConfigStore::new()),
        RetrievalSettings::default(),
    )
}

fn user() -> UserContext {
    UserContext::new("u1", "t1", vec!["g_pub".into()])
}

// ---------------------------------------------------------------------------
// Scenarios

#[tokio::test]
async fn clear_hit_is_answerable_with_top_rank() {
    init_tracing();
    let retriever = retriever(Arc::new(MemoryIndex::new(corpus())));

    let result = retriever
        .retrieve("kb", RetrievalRequest::new("refund policy"), &user())
        .await
        .unwrap();

    assert!(result.is_answerable);
    assert!(result.idk_response.is_none());

    let results = result.results.unwrap();
    assert_eq!(results[0].id, "c1");
    assert_eq!(results[0].rank, 1);
    assert_eq!(results[0].search_type, SearchType::Hybrid);
    assert_eq!(
        result.decision.audit.decision_rationale,
        DecisionRationale::Answerable
    );
    assert!(result.metrics.vector_result_count >= 1);
    assert!(result.metrics.keyword_result_count >= 1);
    assert!(!result.metrics.reranking_enabled);
}

#[tokio::test]
async fn irrelevant_query_yields_low_confidence_idk() {
    let retriever = retriever(Arc::new(MemoryIndex::new(corpus())));

    let result = retriever
        .retrieve("kb", RetrievalRequest::new("quantum chromodynamics"), &user())
        .await
        .unwrap();

    assert!(!result.is_answerable);
    assert!(result.results.is_none());

    let idk = result.idk_response.unwrap();
    assert_eq!(idk.reason_code, ReasonCode::LowConfidence);
    // All surviving evidence is weak.
    assert!(result.decision.score.score_stats.max < 0.2);
    assert!(result.decision.score.score_stats.mean < 0.1);
}

#[tokio::test]
async fn cross_tenant_matches_stay_invisible() {
    let retriever = retriever(Arc::new(MemoryIndex::new(corpus())));

    let result = retriever
        .retrieve("kb", RetrievalRequest::new("quarterly budget"), &user())
        .await
        .unwrap();

    assert!(!result.is_answerable);
    assert_eq!(
        result.idk_response.unwrap().reason_code,
        ReasonCode::NoRelevantDocs
    );
    assert_eq!(result.metrics.final_result_count, 0);
    assert_eq!(result.decision.audit.results_count, 0);
}

#[tokio::test]
async fn keyword_failure_degrades_to_vector_only() {
    init_tracing();
    let retriever = retriever(Arc::new(MemoryIndex::with_failing_scroll(
        refund_heavy_corpus(),
    )));

    let result = retriever
        .retrieve("kb", RetrievalRequest::new("refund policy"), &user())
        .await
        .unwrap();

    assert!(result.is_answerable);
    let results = result.results.unwrap();
    assert_eq!(results.len(), 5);
    assert!(results
        .iter()
        .all(|r| r.search_type == SearchType::VectorOnly));
    assert_eq!(result.metrics.keyword_result_count, 0);
    assert!(result.metrics.vector_result_count >= 5);
}

#[tokio::test]
async fn reranker_timeout_passes_candidates_through() {
    let tenants = Arc::new(TenantConfigStore::new());
    let mut tenant = TenantConfig::default_for("t1");
    tenant.reranker_enabled = true;
    tenants.update(tenant).unwrap();

    let reranker = RerankerAdapter::new(
        Some(Arc::new(SlowRerankBackend)),
        RerankerConfig::default(),
    );
    let retriever = GuardedRetriever::new(
        Arc::new(MemoryIndex::new(refund_heavy_corpus())),
        embedder(),
        reranker,
        tenants,
        RetrievalSettings::default(),
    );

    let result = retriever
        .retrieve("kb", RetrievalRequest::new("refund policy"), &user())
        .await
        .unwrap();

    assert!(result.metrics.reranking_enabled);
    assert_eq!(result.metrics.documents_reranked, 0);
    // The hard 500ms budget elapsed before pass-through.
    assert!(result.metrics.reranker_duration_ms >= 500);
    assert!(result.metrics.reranker_duration_ms <= 650);

    // Pass-through: scores unchanged, order preserved, fusion ordering kept.
    let results = result.results.unwrap();
    assert!(results
        .windows(2)
        .all(|pair| pair[0].score >= pair[1].score));
    for r in &results {
        assert_eq!(r.reranker_score, Some(r.fusion_score.unwrap()));
    }
}

#[tokio::test]
async fn admin_bypass_short_circuits_guardrail() {
    let tenants = Arc::new(TenantConfigStore::new());
    let mut tenant = TenantConfig::default_for("t1");
    tenant.guardrail.bypass_enabled = true;
    tenants.update(tenant).unwrap();

    let retriever = GuardedRetriever::new(
        Arc::new(MemoryIndex::new(corpus())),
        embedder(),
        RerankerAdapter::disabled(),
        tenants,
        RetrievalSettings::default(),
    );

    let admin = UserContext::new("u1", "t1", vec!["admin".into()]);
    let result = retriever
        .retrieve("kb", RetrievalRequest::new("quantum chromodynamics"), &admin)
        .await
        .unwrap();

    assert!(result.is_answerable);
    assert_eq!(result.decision.score.confidence, 1.0);
    assert_eq!(
        result.decision.audit.decision_rationale,
        DecisionRationale::BypassEnabled
    );
}

// ---------------------------------------------------------------------------
// Invariants and edge cases

#[tokio::test]
async fn every_returned_result_passes_the_access_predicate() {
    let retriever = retriever(Arc::new(MemoryIndex::new(corpus())));

    // u1 is not in g_finance: c7 must never surface even though it is the
    // second-closest refund chunk.
    let result = retriever
        .retrieve("kb", RetrievalRequest::new("refund policy"), &user())
        .await
        .unwrap();

    let results = result.results.unwrap();
    assert!(!results.iter().any(|r| r.id == "c7"));
    for r in &results {
        assert!(r.payload.allows(&user()));
    }

    // A finance user sees it.
    let finance = UserContext::new("u2", "t1", vec!["g_finance".into()]);
    let result = retriever
        .retrieve("kb", RetrievalRequest::new("refund policy"), &finance)
        .await
        .unwrap();
    assert!(result.results.unwrap().iter().any(|r| r.id == "c7"));
}

#[tokio::test]
async fn tampered_payload_dropped_by_post_filter() {
    let planted = chunk(
        "evil",
        "t2",
        &["public"],
        "Refund policy stolen from another tenant.",
        [1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    );
    let index = TamperedIndex {
        inner: MemoryIndex::new(corpus()),
        planted,
    };

    let retriever = retriever(Arc::new(index));
    let result = retriever
        .retrieve("kb", RetrievalRequest::new("refund policy"), &user())
        .await
        .unwrap();

    let results = result.results.unwrap();
    assert!(!results.iter().any(|r| r.id == "evil"));
}

#[tokio::test]
async fn zero_limit_yields_idk() {
    let retriever = retriever(Arc::new(MemoryIndex::new(corpus())));

    let result = retriever
        .retrieve(
            "kb",
            RetrievalRequest::new("refund policy").with_limit(0),
            &user(),
        )
        .await
        .unwrap();

    assert!(!result.is_answerable);
    assert_eq!(
        result.idk_response.unwrap().reason_code,
        ReasonCode::NoRelevantDocs
    );
    assert_eq!(result.metrics.final_result_count, 0);
}

#[tokio::test]
async fn doc_id_pin_restricts_results() {
    let retriever = retriever(Arc::new(MemoryIndex::new(corpus())));

    let result = retriever
        .retrieve(
            "kb",
            RetrievalRequest::new("refund policy").with_doc_id("doc-c2"),
            &user(),
        )
        .await
        .unwrap();

    if let Some(results) = result.results {
        assert!(results.iter().all(|r| r.payload.doc_id == "doc-c2"));
    }
}

#[tokio::test]
async fn embedding_failure_is_fatal() {
    let retriever = GuardedRetriever::new(
        Arc::new(MemoryIndex::new(corpus())),
        Arc::new(BrokenEmbedder),
        RerankerAdapter::disabled(),
        Arc::new(TenantConfigStore::new()),
        RetrievalSettings::default(),
    );

    let err = retriever
        .retrieve("kb", RetrievalRequest::new("refund policy"), &user())
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::EmbeddingFailed(_)));
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let retriever = retriever(Arc::new(MemoryIndex::new(corpus())));

    let anonymous = UserContext::new("", "t1", vec![]);
    let err = retriever
        .retrieve("kb", RetrievalRequest::new("refund policy"), &anonymous)
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::Unauthorized(_)));
}

#[tokio::test]
async fn successful_rerank_reorders_and_truncates() {
    let tenants = Arc::new(TenantConfigStore::new());
    let mut tenant = TenantConfig::default_for("t1");
    tenant.reranker_enabled = true;
    tenants.update(tenant).unwrap();

    let calls = Arc::new(Mutex::new(0));
    let reranker = RerankerAdapter::new(
        Some(Arc::new(RecordingRerankBackend {
            calls: Arc::clone(&calls),
        })),
        RerankerConfig::default(),
    );

    let retriever = GuardedRetriever::new(
        Arc::new(MemoryIndex::new(refund_heavy_corpus())),
        embedder(),
        reranker,
        tenants,
        RetrievalSettings::default(),
    );

    let result = retriever
        .retrieve("kb", RetrievalRequest::new("refund policy"), &user())
        .await
        .unwrap();

    assert!(result.metrics.reranking_enabled);
    assert_eq!(result.metrics.documents_reranked, 5);
    assert!(*calls.lock().await >= 1);

    let results = result.results.unwrap();
    assert!(results.len() <= 8);
    for r in &results {
        assert!(r.reranker_score.is_some());
        assert!(r.fusion_score.is_some());
    }
}

#[tokio::test]
async fn language_preference_reweights_scores() {
    let mut chunks = vec![
        chunk(
            "en1",
            "t1",
            &["public"],
            "Refund policy stated in English.",
            [1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ),
        chunk(
            "de1",
            "t1",
            &["public"],
            "Refund policy auf Deutsch erklärt. refund policy",
            [0.99, 0.0, 0.0, 0.0, 0.0, 0.0],
        ),
    ];
    chunks[0].payload["lang"] = serde_json::json!("en");
    chunks[1].payload["lang"] = serde_json::json!("de");

    // A single in-language result must still clear the count gate.
    let tenants = Arc::new(TenantConfigStore::new());
    let mut tenant = TenantConfig::default_for("t1");
    tenant.guardrail.threshold.min_result_count = 1;
    tenants.update(tenant).unwrap();

    let retriever = GuardedRetriever::new(
        Arc::new(MemoryIndex::new(chunks.clone())),
        embedder(),
        RerankerAdapter::disabled(),
        tenants,
        RetrievalSettings::default(),
    );

    // No language preference: both surface.
    let result = retriever
        .retrieve("kb", RetrievalRequest::new("refund policy"), &user())
        .await
        .unwrap();
    assert_eq!(result.results.unwrap().len(), 2);

    // An English preference filters in-store (lang == en) per the access
    // filter contract.
    let english_user = user().with_language("en");
    let result = retriever
        .retrieve("kb", RetrievalRequest::new("refund policy"), &english_user)
        .await
        .unwrap();
    let results = result.results.unwrap();
    assert!(results.iter().all(|r| r.payload.lang.as_deref() == Some("en")));
}

#[tokio::test]
async fn performance_window_records_requests() {
    let retriever = retriever(Arc::new(MemoryIndex::new(corpus())));
    let window = retriever.performance_window();

    retriever
        .retrieve("kb", RetrievalRequest::new("refund policy"), &user())
        .await
        .unwrap();
    retriever
        .retrieve("kb", RetrievalRequest::new("quantum chromodynamics"), &user())
        .await
        .unwrap();

    let summary = window.summary("t1").unwrap();
    assert_eq!(summary.requests, 2);
}
