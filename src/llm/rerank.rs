//! Cross-encoder re-ranking via an OpenAI-compatible `/v1/rerank` endpoint.
//!
//! One batch request scores all query-candidate pairs. Candidates beyond the
//! re-ranking budget, and any the endpoint fails to score, fall back to
//! their RRF score so the final sort stays total.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::RerankerConfig;
use crate::models::SearchCandidate;

/// Only the head of the fused list is worth paying cross-encoder latency for.
const RERANK_MAX_CANDIDATES: usize = 30;

/// Characters of chunk text sent per candidate.
const RERANK_DOC_CHARS: usize = 500;

/// Re-rank fused candidates in place and truncate to `top_k`.
///
/// Returns Err when the endpoint is unconfigured or unreachable; the caller
/// decides whether to keep the RRF order instead.
pub async fn rerank_candidates(
    client: &reqwest::Client,
    config: &RerankerConfig,
    query: &str,
    candidates: &mut Vec<SearchCandidate>,
    top_k: usize,
) -> Result<()> {
    if candidates.is_empty() {
        return Ok(());
    }

    let base_url = config
        .base_url
        .as_deref()
        .context("Reranker base_url not configured")?;
    let model = config.model.as_deref().unwrap_or("default");

    let url = format!("{}/v1/rerank", base_url.trim_end_matches('/'));

    let budget = candidates.len().min(RERANK_MAX_CANDIDATES);
    let documents: Vec<String> = candidates[..budget]
        .iter()
        .map(|c| truncate_chars(&c.text, RERANK_DOC_CHARS).to_string())
        .collect();

    let req_body = RerankRequest {
        model: model.to_string(),
        query: query.to_string(),
        documents,
        top_n: budget,
    };

    let timeout = std::time::Duration::from_secs(config.timeout_secs.min(30));

    let resp = client
        .post(&url)
        .timeout(timeout)
        .json(&req_body)
        .send()
        .await
        .context("Failed to reach reranker endpoint")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Reranker returned {status}: {body}");
    }

    let body: RerankResponse = resp
        .json()
        .await
        .context("Failed to parse reranker response")?;

    let scores: HashMap<usize, f32> = body
        .results
        .into_iter()
        .map(|r| (r.index, sigmoid(r.relevance_score)))
        .collect();

    apply_scores(candidates, &scores, top_k);
    Ok(())
}

/// Attach rerank scores and re-sort. Unscored candidates (tail beyond the
/// budget, or indexes the endpoint dropped) keep their RRF score so they
/// stay comparable.
fn apply_scores(
    candidates: &mut Vec<SearchCandidate>,
    scores: &HashMap<usize, f32>,
    top_k: usize,
) {
    for (i, candidate) in candidates.iter_mut().enumerate() {
        candidate.rerank_score =
            Some(scores.get(&i).copied().unwrap_or(candidate.rrf_score));
    }

    candidates.sort_by(|a, b| {
        let sa = a.rerank_score.unwrap_or(a.rrf_score);
        let sb = b.rerank_score.unwrap_or(b.rrf_score);
        sb.partial_cmp(&sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    candidates.truncate(top_k);
}

/// Sigmoid normalization: maps raw logits to 0-1 range.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut end = max_chars;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ─── Request/Response types ────────────────────────────

#[derive(Serialize)]
struct RerankRequest {
    model: String,
    query: String,
    documents: Vec<String>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResultRaw>,
}

#[derive(Deserialize)]
struct RerankResultRaw {
    index: usize,
    relevance_score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn candidate(rrf_score: f32) -> SearchCandidate {
        SearchCandidate {
            chunk_id: Uuid::new_v4(),
            recording_id: 1,
            text: "transcript text".to_string(),
            speaker_name: None,
            timestamp: Utc::now(),
            call_title: "Call".to_string(),
            call_category: None,
            topics: None,
            sentiment: None,
            embedding: None,
            fts_rank: None,
            similarity_score: 0.0,
            rrf_score,
            rerank_score: None,
        }
    }

    #[test]
    fn test_sigmoid_zero() {
        let s = sigmoid(0.0);
        assert!((s - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sigmoid_large_positive() {
        let s = sigmoid(10.0);
        assert!(s > 0.999);
    }

    #[test]
    fn test_sigmoid_symmetry() {
        // sigmoid(x) + sigmoid(-x) = 1
        let x = 2.5f32;
        let sum = sigmoid(x) + sigmoid(-x);
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_apply_scores_reorders_by_rerank() {
        let mut candidates = vec![candidate(0.9), candidate(0.8), candidate(0.7)];
        let last = candidates[2].chunk_id;

        // The reranker prefers the candidate RRF ranked last.
        let scores = HashMap::from([(0usize, 0.2f32), (1, 0.3), (2, 0.95)]);
        apply_scores(&mut candidates, &scores, 10);

        assert_eq!(candidates[0].chunk_id, last);
        assert_eq!(candidates[0].rerank_score, Some(0.95));
    }

    #[test]
    fn test_unscored_candidates_fall_back_to_rrf() {
        let mut candidates = vec![candidate(0.9), candidate(0.4)];
        let scores = HashMap::from([(0usize, 0.6f32)]); // index 1 missing
        apply_scores(&mut candidates, &scores, 10);

        let tail = candidates.iter().find(|c| c.rrf_score == 0.4).unwrap();
        assert_eq!(tail.rerank_score, Some(0.4));
    }

    #[test]
    fn test_apply_scores_truncates_to_top_k() {
        let mut candidates = (0..10).map(|i| candidate(i as f32 / 10.0)).collect::<Vec<_>>();
        apply_scores(&mut candidates, &HashMap::new(), 3);
        assert_eq!(candidates.len(), 3);
    }
}
