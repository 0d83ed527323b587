//! Stage metrics
//!
//! Per-request stage timings and counts, returned in-band with every
//! retrieval result, plus an optional rolling per-tenant window for
//! eventually-consistent performance reads.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Timings and counts collected across one retrieval.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageMetrics {
    pub vector_search_duration_ms: u64,
    pub keyword_search_duration_ms: u64,
    pub fusion_duration_ms: u64,
    pub reranker_duration_ms: u64,
    pub guardrail_duration_ms: u64,
    pub total_duration_ms: u64,
    pub vector_result_count: usize,
    pub keyword_result_count: usize,
    pub final_result_count: usize,
    pub documents_reranked: usize,
    pub reranking_enabled: bool,
}

/// Aggregate view over a tenant's recent requests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSummary {
    pub requests: usize,
    pub mean_total_ms: f64,
    pub p95_total_ms: u64,
}

const WINDOW_CAP: usize = 64;

/// Rolling per-tenant window of recent stage metrics. Writes take a short
/// lock; readers see eventually consistent values.
#[derive(Default)]
pub struct PerformanceWindow {
    inner: Mutex<HashMap<String, VecDeque<StageMetrics>>>,
}

impl PerformanceWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tenant_id: &str, metrics: StageMetrics) {
        let mut inner = self.inner.lock();
        let window = inner.entry(tenant_id.to_string()).or_default();
        if window.len() == WINDOW_CAP {
            window.pop_front();
        }
        window.push_back(metrics);
    }

    pub fn summary(&self, tenant_id: &str) -> Option<WindowSummary> {
        let inner = self.inner.lock();
        let window = inner.get(tenant_id)?;
        if window.is_empty() {
            return None;
        }

        let mut totals: Vec<u64> = window.iter().map(|m| m.total_duration_ms).collect();
        totals.sort_unstable();
        let mean = totals.iter().sum::<u64>() as f64 / totals.len() as f64;
        let p95_idx = ((totals.len() as f64) * 0.95).ceil() as usize - 1;

        Some(WindowSummary {
            requests: totals.len(),
            mean_total_ms: mean,
            p95_total_ms: totals[p95_idx.min(totals.len() - 1)],
        })
    }
}
