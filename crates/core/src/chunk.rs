//! Chunk payload and ranked-result types
//!
//! A chunk is the atomic retrievable unit stored in the vector store. The
//! payload is written by ingestion and read-only here. `RankedResult` is the
//! unit that flows between pipeline stages: created by the search adapters,
//! enriched by fusion and reranking (new score fields are added, existing
//! ones are never overwritten), filtered by the ACL post-check and finally
//! handed to the guardrail and synthesis.

use serde::{Deserialize, Serialize};

use crate::identity::UserContext;

/// Stored chunk payload. `tenant`, `acl` and `content` are required for any
/// chunk considered for retrieval; everything else is optional metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload {
    pub tenant: String,
    #[serde(default)]
    pub doc_id: String,
    pub acl: Vec<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

impl ChunkPayload {
    /// Access predicate `P(user, doc)`: same tenant and a non-empty
    /// intersection between the chunk ACL and the user's principals.
    pub fn allows(&self, user: &UserContext) -> bool {
        if self.tenant != user.tenant_id {
            return false;
        }
        let principals = user.principals();
        self.acl.iter().any(|entry| principals.iter().any(|p| p == entry))
    }
}

/// Which source lists a result appeared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    VectorOnly,
    KeywordOnly,
    Hybrid,
}

/// A retrieved chunk with its per-stage scores.
///
/// `score` always holds the current effective ranking score (native
/// similarity after search, RRF after fusion, reranker score after
/// reranking); the per-stage fields are kept for introspection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    pub id: String,
    pub payload: ChunkPayload,
    pub content: String,
    /// 1-based rank in the current list.
    pub rank: usize,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fusion_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reranker_score: Option<f64>,
    pub search_type: SearchType,
}

impl RankedResult {
    /// Build a fresh result from a single-source search hit.
    pub fn from_search(
        id: impl Into<String>,
        payload: ChunkPayload,
        rank: usize,
        score: f64,
        search_type: SearchType,
    ) -> Self {
        let content = payload.content.clone();
        let (vector_score, keyword_score) = match search_type {
            SearchType::VectorOnly => (Some(score), None),
            SearchType::KeywordOnly => (None, Some(score)),
            SearchType::Hybrid => (None, None),
        };
        Self {
            id: id.into(),
            payload,
            content,
            rank,
            score,
            vector_score,
            keyword_score,
            fusion_score: None,
            reranker_score: None,
            search_type,
        }
    }

    /// Strongest bounded relevance signal for confidence scoring.
    ///
    /// Reranker scores are already in [0,1] but are only trusted when a
    /// real rerank ran, since a pass-through copies the rank-scale fusion
    /// score into `reranker_score` and statistics must be unchanged in that
    /// case. Vector similarity is the bounded native score. Raw keyword
    /// scores are unbounded BM25-style values, squashed by s/(1+s). Raw
    /// fusion scores are rank-scale (1/(k+rank)) and deliberately not used
    /// as evidence.
    pub fn evidence_score(&self, include_reranker: bool) -> f64 {
        if include_reranker {
            if let Some(s) = self.reranker_score {
                return s.clamp(0.0, 1.0);
            }
        }
        if let Some(s) = self.vector_score {
            return s.clamp(0.0, 1.0);
        }
        if let Some(s) = self.keyword_score {
            let s = s.max(0.0);
            return s / (1.0 + s);
        }
        self.score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(tenant: &str, acl: &[&str]) -> ChunkPayload {
        ChunkPayload {
            tenant: tenant.to_string(),
            doc_id: "d1".to_string(),
            acl: acl.iter().map(|s| s.to_string()).collect(),
            content: "some content".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_access_predicate_tenant_isolation() {
        let user = UserContext::new("u1", "t1", vec![]);
        assert!(!payload("t2", &["public"]).allows(&user));
        assert!(payload("t1", &["public"]).allows(&user));
    }

    #[test]
    fn test_access_predicate_acl_overlap() {
        let user = UserContext::new("u1", "t1", vec!["g1".into()]);
        assert!(payload("t1", &["g1"]).allows(&user));
        assert!(payload("t1", &["u1"]).allows(&user));
        assert!(!payload("t1", &["g2", "u2"]).allows(&user));
    }

    #[test]
    fn test_payload_round_trip() {
        let json = serde_json::json!({
            "tenant": "t1",
            "docId": "doc-9",
            "acl": ["public"],
            "content": "Refund policy text",
            "lang": "en",
            "chunkIndex": 3
        });
        let payload: ChunkPayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.doc_id, "doc-9");
        assert_eq!(payload.chunk_index, Some(3));
        assert!(payload.modified_at.is_none());
    }

    #[test]
    fn test_evidence_score_preference() {
        let mut r = RankedResult::from_search(
            "c1",
            payload("t1", &["public"]),
            1,
            0.8,
            SearchType::VectorOnly,
        );
        assert!((r.evidence_score(true) - 0.8).abs() < 1e-12);

        r.reranker_score = Some(0.95);
        assert!((r.evidence_score(true) - 0.95).abs() < 1e-12);
        // Pass-through case: the copied score is not evidence.
        assert!((r.evidence_score(false) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_evidence_score_bounds_keyword() {
        let r = RankedResult::from_search(
            "c1",
            payload("t1", &["public"]),
            1,
            7.5,
            SearchType::KeywordOnly,
        );
        let e = r.evidence_score(true);
        assert!(e > 0.0 && e < 1.0);
    }
}
