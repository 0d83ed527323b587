//! Answerability guardrail
//!
//! Decides whether the retrieved evidence justifies attempting an answer.
//! An ensemble of sub-scores over the final list's bounded relevance
//! signals is weighted into one confidence, gated by the tenant's
//! thresholds; failures produce a structured IDK response instead of an
//! answer. Every decision emits an audit record.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rag_agent_config::{GuardrailConfig, GuardrailThreshold, IdkTemplate, ReasonCode};
use rag_agent_core::{RankedResult, ScoreStats, UserContext};

/// Generic suggestion used when no result clears the suggestion threshold.
const GENERIC_SUGGESTION: &str = "Try rephrasing your question with more specific terms.";

/// Ids of the two source lists in their original rank order, used for the
/// vector/keyword rank-correlation feature.
#[derive(Debug, Clone, Default)]
pub struct SourceRanks {
    pub vector_ids: Vec<String>,
    pub keyword_ids: Vec<String>,
}

/// Per-algorithm sub-scores, each in [0,1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmScores {
    pub statistical: f64,
    pub threshold: f64,
    pub ml_features: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker_confidence: Option<f64>,
}

/// The ensemble confidence with its inputs, attached to each decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerabilityScore {
    pub confidence: f64,
    pub score_stats: ScoreStats,
    pub algorithm_scores: AlgorithmScores,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionRationale {
    Answerable,
    NotAnswerable,
    GuardrailDisabled,
    BypassEnabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPerformance {
    pub scoring_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Audit record emitted for every decision. The query text is retained
/// here; redaction, if required, is the HTTP layer's responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    pub ts: DateTime<Utc>,
    pub query: String,
    pub tenant_id: String,
    pub user: String,
    pub results_count: usize,
    pub score_stats_summary: String,
    pub decision_rationale: DecisionRationale,
    pub performance: AuditPerformance,
}

/// Structured "I don't know" payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdkResponse {
    pub message: String,
    pub reason_code: ReasonCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    pub confidence_level: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailDecision {
    pub is_answerable: bool,
    pub score: AnswerabilityScore,
    pub threshold: GuardrailThreshold,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idk_response: Option<IdkResponse>,
    pub audit: AuditRecord,
}

/// Stateless evaluator; all policy comes from the tenant's
/// `GuardrailConfig`.
pub struct Guardrail;

impl Guardrail {
    /// Evaluate answerability for one query's final result list.
    ///
    /// `reranker_ran` is true only when a real rerank happened. A
    /// pass-through copies the fusion score into `reranker_score` and must
    /// not change the statistics.
    pub fn evaluate(
        query: &str,
        results: &[RankedResult],
        user: &UserContext,
        config: &GuardrailConfig,
        source_ranks: &SourceRanks,
        reranker_ran: bool,
    ) -> GuardrailDecision {
        let started = Instant::now();

        if !config.enabled {
            return Self::passthrough_decision(
                query,
                results,
                user,
                config,
                DecisionRationale::GuardrailDisabled,
                started,
            );
        }

        if config.bypass_enabled && user.is_admin() {
            return Self::passthrough_decision(
                query,
                results,
                user,
                config,
                DecisionRationale::BypassEnabled,
                started,
            );
        }

        let scoring_started = Instant::now();
        let evidence: Vec<f64> = results
            .iter()
            .map(|r| r.evidence_score(reranker_ran))
            .collect();
        let stats = ScoreStats::compute(&evidence);

        if results.is_empty() {
            let score = AnswerabilityScore {
                confidence: 0.0,
                score_stats: stats,
                algorithm_scores: AlgorithmScores {
                    statistical: 0.0,
                    threshold: 0.0,
                    ml_features: 0.0,
                    reranker_confidence: None,
                },
                reasoning: "no results survived retrieval".to_string(),
            };
            let idk = Self::idk_response(config, ReasonCode::NoRelevantDocs, results, 0.0, false);
            let audit = Self::audit(
                query,
                user,
                results.len(),
                &stats,
                DecisionRationale::NotAnswerable,
                scoring_started,
                started,
            );
            return GuardrailDecision {
                is_answerable: false,
                score,
                threshold: config.threshold,
                idk_response: Some(idk),
                audit,
            };
        }

        let statistical = 0.4 * stats.mean.min(1.0)
            + 0.3 * stats.max.min(1.0)
            + 0.3 * (1.0 - stats.std_dev / 0.5).max(0.0);

        let strong = evidence.iter().filter(|s| **s > 0.5).count() as f64;
        let threshold_score = (stats.max * 0.7 + (strong / stats.count as f64) * 0.3).min(1.0);

        let range = (stats.max - stats.min).clamp(0.0, 1.0);
        let inverse_variance = 1.0 - stats.std_dev.min(1.0);
        let top_to_mean = (stats.max / (stats.mean + 1e-3) / 2.0).min(1.0);
        let correlation = rank_correlation(&source_ranks.vector_ids, &source_ranks.keyword_ids);
        let density = (stats.count as f64 / 10.0).min(1.0);
        let ml_features = 0.2 * range
            + 0.3 * inverse_variance
            + 0.3 * top_to_mean
            + 0.1 * correlation
            + 0.1 * density;

        let reranker_confidence = if reranker_ran {
            let scores: Vec<f64> = results.iter().filter_map(|r| r.reranker_score).collect();
            if scores.is_empty() {
                None
            } else {
                let max = scores.iter().cloned().fold(f64::MIN, f64::max);
                let mean = scores.iter().sum::<f64>() / scores.len() as f64;
                Some(0.6 * max + 0.4 * mean)
            }
        } else {
            None
        };

        let w = &config.algorithm_weights;
        let (weighted_sum, weight_total) = match reranker_confidence {
            Some(rc) => (
                w.statistical * statistical
                    + w.threshold * threshold_score
                    + w.ml_features * ml_features
                    + w.reranker_confidence * rc,
                w.statistical + w.threshold + w.ml_features + w.reranker_confidence,
            ),
            None => (
                w.statistical * statistical
                    + w.threshold * threshold_score
                    + w.ml_features * ml_features,
                w.statistical + w.threshold + w.ml_features,
            ),
        };
        let confidence = if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            0.0
        };

        let t = &config.threshold;
        let mut failed_gates: Vec<String> = Vec::new();
        if confidence < t.min_confidence {
            failed_gates.push(format!("confidence {confidence:.3} < {:.3}", t.min_confidence));
        }
        if stats.max < t.min_top_score {
            failed_gates.push(format!("top {:.3} < {:.3}", stats.max, t.min_top_score));
        }
        if stats.mean < t.min_mean_score {
            failed_gates.push(format!("mean {:.3} < {:.3}", stats.mean, t.min_mean_score));
        }
        if stats.std_dev > t.max_std_dev {
            failed_gates.push(format!("stdDev {:.3} > {:.3}", stats.std_dev, t.max_std_dev));
        }
        if stats.count < t.min_result_count {
            failed_gates.push(format!("count {} < {}", stats.count, t.min_result_count));
        }
        let is_answerable = failed_gates.is_empty();

        let reasoning = if is_answerable {
            format!(
                "confidence {confidence:.3} over {} results ({})",
                stats.count,
                stats.summary()
            )
        } else {
            format!("failed gates: {}", failed_gates.join("; "))
        };

        let score = AnswerabilityScore {
            confidence,
            score_stats: stats,
            algorithm_scores: AlgorithmScores {
                statistical,
                threshold: threshold_score,
                ml_features,
                reranker_confidence,
            },
            reasoning,
        };

        let rationale = if is_answerable {
            DecisionRationale::Answerable
        } else {
            DecisionRationale::NotAnswerable
        };

        let idk_response = if is_answerable {
            None
        } else {
            let reason = if confidence < 0.3 {
                ReasonCode::LowConfidence
            } else if stats.std_dev > 0.4 {
                ReasonCode::AmbiguousQuery
            } else {
                ReasonCode::LowConfidence
            };
            Some(Self::idk_response(
                config,
                reason,
                results,
                confidence,
                reranker_ran,
            ))
        };

        let audit = Self::audit(
            query,
            user,
            results.len(),
            &stats,
            rationale,
            scoring_started,
            started,
        );

        GuardrailDecision {
            is_answerable,
            score,
            threshold: config.threshold,
            idk_response,
            audit,
        }
    }

    fn passthrough_decision(
        query: &str,
        results: &[RankedResult],
        user: &UserContext,
        config: &GuardrailConfig,
        rationale: DecisionRationale,
        started: Instant,
    ) -> GuardrailDecision {
        let evidence: Vec<f64> = results.iter().map(|r| r.evidence_score(false)).collect();
        let stats = ScoreStats::compute(&evidence);
        let reason = match rationale {
            DecisionRationale::GuardrailDisabled => "guardrail disabled for tenant",
            DecisionRationale::BypassEnabled => "admin bypass enabled",
            _ => "passthrough",
        };

        GuardrailDecision {
            is_answerable: true,
            score: AnswerabilityScore {
                confidence: 1.0,
                score_stats: stats,
                algorithm_scores: AlgorithmScores {
                    statistical: 1.0,
                    threshold: 1.0,
                    ml_features: 1.0,
                    reranker_confidence: None,
                },
                reasoning: reason.to_string(),
            },
            threshold: config.threshold,
            idk_response: None,
            audit: Self::audit(
                query,
                user,
                results.len(),
                &stats,
                rationale,
                started,
                started,
            ),
        }
    }

    fn idk_response(
        config: &GuardrailConfig,
        reason: ReasonCode,
        results: &[RankedResult],
        confidence: f64,
        reranker_ran: bool,
    ) -> IdkResponse {
        let template = config
            .idk_templates
            .iter()
            .find(|t| t.reason_code == reason)
            .cloned()
            .unwrap_or_else(|| fallback_template(reason));

        let suggestions = if config.fallback.enabled && template.include_suggestions {
            Some(Self::suggestions(config, results, reranker_ran))
        } else {
            None
        };

        IdkResponse {
            message: template.template,
            reason_code: reason,
            suggestions,
            confidence_level: confidence,
        }
    }

    /// Derive suggestions from the first sentence of each result clearing
    /// the suggestion threshold, de-duplicated, capped at
    /// `max_suggestions`; a generic suggestion covers the empty case.
    fn suggestions(
        config: &GuardrailConfig,
        results: &[RankedResult],
        reranker_ran: bool,
    ) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for result in results {
            if seen.len() >= config.fallback.max_suggestions {
                break;
            }
            if result.evidence_score(reranker_ran) < config.fallback.suggestion_threshold {
                continue;
            }
            let sentence = first_sentence(&result.content);
            if sentence.is_empty() || seen.iter().any(|s| s == &sentence) {
                continue;
            }
            seen.push(sentence);
        }

        if seen.is_empty() {
            seen.push(GENERIC_SUGGESTION.to_string());
        }
        seen
    }

    #[allow(clippy::too_many_arguments)]
    fn audit(
        query: &str,
        user: &UserContext,
        results_count: usize,
        stats: &ScoreStats,
        rationale: DecisionRationale,
        scoring_started: Instant,
        started: Instant,
    ) -> AuditRecord {
        AuditRecord {
            id: Uuid::new_v4(),
            ts: Utc::now(),
            query: query.to_string(),
            tenant_id: user.tenant_id.clone(),
            user: user.summary(),
            results_count,
            score_stats_summary: stats.summary(),
            decision_rationale: rationale,
            performance: AuditPerformance {
                scoring_duration_ms: scoring_started.elapsed().as_millis() as u64,
                total_duration_ms: started.elapsed().as_millis() as u64,
            },
        }
    }
}

fn fallback_template(reason: ReasonCode) -> IdkTemplate {
    rag_agent_config::tenant::default_idk_templates()
        .into_iter()
        .find(|t| t.reason_code == reason)
        .unwrap_or_else(|| IdkTemplate {
            id: "idk-generic".to_string(),
            reason_code: reason,
            template: "I don't know the answer to that based on the available documents."
                .to_string(),
            include_suggestions: false,
        })
}

/// First sentence of a chunk, trimmed and capped.
fn first_sentence(content: &str) -> String {
    let trimmed = content.trim();
    let end = trimmed
        .char_indices()
        .find(|(_, c)| matches!(c, '.' | '?' | '!' | '\n'))
        .map(|(idx, _)| idx)
        .unwrap_or(trimmed.len());
    let sentence = trimmed[..end].trim();
    sentence.chars().take(120).collect()
}

/// Spearman rank correlation between the two source lists over their common
/// ids, mapped from [-1,1] to [0,1]. Neutral 0.5 when either list is empty
/// or fewer than two ids overlap.
fn rank_correlation(vector_ids: &[String], keyword_ids: &[String]) -> f64 {
    if vector_ids.is_empty() || keyword_ids.is_empty() {
        return 0.5;
    }

    let keyword_pos: HashMap<&str, usize> = keyword_ids
        .iter()
        .enumerate()
        .map(|(idx, id)| (id.as_str(), idx))
        .collect();

    // Pairs of (vector position, keyword position) for common ids, in
    // vector order.
    let common: Vec<usize> = vector_ids
        .iter()
        .filter_map(|id| keyword_pos.get(id.as_str()).copied())
        .collect();

    let n = common.len();
    if n < 2 {
        return 0.5;
    }

    // Vector-side ranks are 0..n by construction; keyword-side ranks are
    // the order of the collected positions.
    let mut keyword_sorted: Vec<usize> = common.clone();
    keyword_sorted.sort_unstable();
    let keyword_rank: HashMap<usize, usize> = keyword_sorted
        .into_iter()
        .enumerate()
        .map(|(rank, pos)| (pos, rank))
        .collect();

    let sum_d2: f64 = common
        .iter()
        .enumerate()
        .map(|(vector_rank, pos)| {
            let d = vector_rank as f64 - keyword_rank[pos] as f64;
            d * d
        })
        .sum();

    let n = n as f64;
    let rho = 1.0 - (6.0 * sum_d2) / (n * (n * n - 1.0));
    ((rho + 1.0) / 2.0).clamp(0.0, 1.0)
}
