//! Keyword search adapter
//!
//! Lexical signal without an owned inverted index: candidates come from a
//! filtered scroll whose filter adds a full-text `content` match to the
//! access filter, and are scored locally with a BM25-style function.
//!
//! Because document frequencies are unknown without an inverted index, the
//! IDF term is approximated by `ln(1 + 1/(tf+1))`, a monotone function of
//! term frequency that favors longer matches. Stores without a text-match
//! operator fall back to the `discover` path with the query text as target;
//! the fallback is explicit and logged.

use std::sync::Arc;

use unicode_segmentation::UnicodeSegmentation;

use rag_agent_config::constants::retrieval as rt;
use rag_agent_core::{
    Error, FilterCondition, PayloadFilter, RankedResult, ScoredPoint, ScrollRequest, SearchType,
    VectorIndex,
};

use crate::vector_search::decode_payload;
use crate::RetrievalError;

/// BM25-style score of `content` against the query terms.
///
/// `score = Σ_term (tf·(k1+1)) / (tf + k1·(1 − b + b·(|doc|/avgDocLen))) · ln(1 + 1/(tf+1))`
/// with k1=1.2, b=0.75 and an assumed average document length of 1000
/// tokens. Term counting is case-insensitive over unicode words.
pub fn bm25_score(query_terms: &[String], content: &str) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }

    let doc_tokens: Vec<String> = tokenize(content);
    let doc_len = doc_tokens.len() as f64;
    let length_norm = 1.0 - rt::BM25_B + rt::BM25_B * (doc_len / rt::BM25_AVG_DOC_LEN);

    let mut score = 0.0;
    for term in query_terms {
        let tf = doc_tokens.iter().filter(|t| *t == term).count() as f64;
        if tf == 0.0 {
            continue;
        }
        let tf_component = (tf * (rt::BM25_K1 + 1.0)) / (tf + rt::BM25_K1 * length_norm);
        let idf_approx = (1.0 + 1.0 / (tf + 1.0)).ln();
        score += tf_component * idf_approx;
    }
    score
}

/// Lowercased unicode-word tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

/// Adapter deriving the lexical candidate set from the vector store.
pub struct KeywordSearchAdapter {
    index: Arc<dyn VectorIndex>,
}

impl KeywordSearchAdapter {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    pub async fn search(
        &self,
        collection: &str,
        query_text: &str,
        limit: usize,
        access_filter: PayloadFilter,
    ) -> Result<Vec<RankedResult>, RetrievalError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let candidates = match self
            .scroll_candidates(collection, query_text, access_filter.clone())
            .await
        {
            Ok(points) => points,
            Err(Error::Unsupported(_)) => {
                tracing::warn!(
                    collection,
                    "Store lacks text match, falling back to discover for keyword candidates"
                );
                self.index
                    .discover(collection, query_text, rt::SCROLL_PAGE_SIZE, Some(access_filter))
                    .await
                    .map_err(|e| RetrievalError::KeywordSearchFailed(e.to_string()))?
            }
            Err(e) => return Err(RetrievalError::KeywordSearchFailed(e.to_string())),
        };

        let query_terms = tokenize(query_text);

        let mut scored: Vec<RankedResult> = candidates
            .iter()
            .filter_map(|point| {
                let payload = decode_payload(point)?;
                let score = bm25_score(&query_terms, &payload.content);
                if score <= 0.0 {
                    return None;
                }
                Some(RankedResult::from_search(
                    point.id.clone(),
                    payload,
                    0,
                    score,
                    SearchType::KeywordOnly,
                ))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(limit);
        for (idx, result) in scored.iter_mut().enumerate() {
            result.rank = idx + 1;
        }

        Ok(scored)
    }

    /// Collect candidates via filtered scroll, following continuation
    /// tokens up to one page budget.
    async fn scroll_candidates(
        &self,
        collection: &str,
        query_text: &str,
        access_filter: PayloadFilter,
    ) -> Result<Vec<ScoredPoint>, Error> {
        let filter = access_filter.must(FilterCondition::text("content", query_text));

        let mut points = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let page = self
                .index
                .scroll(
                    collection,
                    ScrollRequest {
                        filter: filter.clone(),
                        limit: rt::SCROLL_PAGE_SIZE,
                        offset: offset.clone(),
                    },
                )
                .await?;

            points.extend(page.points);

            match page.next_offset {
                Some(next) if points.len() < rt::SCROLL_PAGE_SIZE => offset = Some(next),
                _ => break,
            }
        }

        Ok(points)
    }
}
