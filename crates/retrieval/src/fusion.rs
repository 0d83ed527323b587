//! Reciprocal Rank Fusion
//!
//! Combines the vector and keyword candidate lists by rank alone; cosine
//! similarities and BM25-style scores are not comparable, and RRF needs no
//! score normalization. Each id contributes
//! `weight / (k + rank)` per source list it appears in (1-based ranks,
//! missing rank contributes 0).

use std::collections::HashMap;

use rag_agent_core::{RankedResult, SearchType};

/// Fusion parameters, normally the tenant's weights.
#[derive(Debug, Clone, Copy)]
pub struct FusionParams {
    pub k: f64,
    pub vector_weight: f64,
    pub keyword_weight: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        use rag_agent_config::constants::retrieval as rt;
        Self {
            k: rt::RRF_K,
            vector_weight: rt::VECTOR_WEIGHT,
            keyword_weight: rt::KEYWORD_WEIGHT,
        }
    }
}

struct Fused {
    result: RankedResult,
    rrf: f64,
    /// Original 1-based vector rank; `usize::MAX` when keyword-only, so
    /// ties sort vector-ranked entries first.
    vector_rank: usize,
}

/// Fuse the two candidate lists. The output holds exactly the id union of
/// the inputs, sorted by fused score descending with ties broken by
/// (original vector rank asc, id asc). `fusion_score` and `score` are both
/// set to the RRF value; per-source scores survive for introspection.
pub fn fuse(
    vector_list: Vec<RankedResult>,
    keyword_list: Vec<RankedResult>,
    params: FusionParams,
) -> Vec<RankedResult> {
    let mut by_id: HashMap<String, Fused> = HashMap::with_capacity(
        vector_list.len() + keyword_list.len(),
    );

    for (idx, result) in vector_list.into_iter().enumerate() {
        let rank = idx + 1;
        let contribution = params.vector_weight / (params.k + rank as f64);
        by_id.insert(
            result.id.clone(),
            Fused {
                result,
                rrf: contribution,
                vector_rank: rank,
            },
        );
    }

    for (idx, keyword_result) in keyword_list.into_iter().enumerate() {
        let rank = idx + 1;
        let contribution = params.keyword_weight / (params.k + rank as f64);
        match by_id.get_mut(&keyword_result.id) {
            Some(entry) => {
                entry.rrf += contribution;
                entry.result.keyword_score = keyword_result.keyword_score;
                entry.result.search_type = SearchType::Hybrid;
            }
            None => {
                by_id.insert(
                    keyword_result.id.clone(),
                    Fused {
                        result: keyword_result,
                        rrf: contribution,
                        vector_rank: usize::MAX,
                    },
                );
            }
        }
    }

    let mut fused: Vec<Fused> = by_id.into_values().collect();
    fused.sort_by(|a, b| {
        b.rrf
            .partial_cmp(&a.rrf)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.vector_rank.cmp(&b.vector_rank))
            .then_with(|| a.result.id.cmp(&b.result.id))
    });

    fused
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| {
            let mut result = entry.result;
            result.rank = idx + 1;
            result.score = entry.rrf;
            result.fusion_score = Some(entry.rrf);
            result
        })
        .collect()
}
