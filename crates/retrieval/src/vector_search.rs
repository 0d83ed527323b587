//! Vector search adapter
//!
//! k-NN query against the vector store with the access filter applied
//! inside the store. Returns native similarity scores in descending order;
//! transport errors are fatal for the request.

use std::sync::Arc;

use rag_agent_core::{
    ChunkPayload, PayloadFilter, RankedResult, ScoredPoint, SearchType, VectorIndex, VectorQuery,
};

use crate::RetrievalError;

/// Decode a store point's payload into a chunk payload. Points without a
/// usable payload (no content, missing tenant/acl) are dropped: ingestion
/// guarantees those fields, so a miss means a foreign writer and the chunk
/// must not surface.
pub(crate) fn decode_payload(point: &ScoredPoint) -> Option<ChunkPayload> {
    let payload: ChunkPayload = match serde_json::from_value(point.payload.clone()) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(id = %point.id, error = %e, "Dropping point with undecodable payload");
            return None;
        }
    };
    if payload.content.is_empty() || payload.tenant.is_empty() || payload.acl.is_empty() {
        tracing::warn!(id = %point.id, "Dropping point with incomplete payload");
        return None;
    }
    Some(payload)
}

/// Adapter over the store's k-NN search.
pub struct VectorSearchAdapter {
    index: Arc<dyn VectorIndex>,
}

impl VectorSearchAdapter {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    pub async fn search(
        &self,
        collection: &str,
        query_vector: Vec<f32>,
        limit: usize,
        filter: PayloadFilter,
    ) -> Result<Vec<RankedResult>, RetrievalError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let points = self
            .index
            .search(
                collection,
                VectorQuery {
                    vector: query_vector,
                    limit,
                    filter: Some(filter),
                },
            )
            .await
            .map_err(|e| RetrievalError::VectorSearchFailed(e.to_string()))?;

        let mut results = Vec::with_capacity(points.len());
        for point in &points {
            if let Some(payload) = decode_payload(point) {
                let rank = results.len() + 1;
                results.push(RankedResult::from_search(
                    point.id.clone(),
                    payload,
                    rank,
                    point.score,
                    SearchType::VectorOnly,
                ));
            }
        }

        Ok(results)
    }
}
