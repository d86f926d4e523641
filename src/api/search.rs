use axum::extract::State;
use axum::Json;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{SearchRequest, SearchResponse};
use crate::search::diversity::{self, DEFAULT_MAX_PER_SOURCE, DEFAULT_MIN_SEMANTIC_DISTANCE};
use crate::search::hybrid::{rrf_fuse, SearchFilters};
use crate::search::vector::rank_by_similarity;
use crate::state::AppState;

/// Ceiling on the caller-supplied result count; bounds the fetch fan-out
/// (`match_count * 3`) handed to tantivy and the fusion.
const MAX_MATCH_COUNT: usize = 100;

/// POST /api/search - Full hybrid search pipeline:
///   1. Conjunctive filtering to the caller's candidate set
///   2. Full-text (tantivy) + semantic (cosine) ranked lists
///   3. Weighted RRF fusion, deterministic tie-break
///   4. Optional cross-encoder re-ranking (degrades to RRF order)
///   5. Diversity filter (per-recording cap + near-duplicate suppression)
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err(AppError::validation("query is required"));
    }
    let Some(user_id) = req.user_id else {
        return Err(AppError::validation("user_id is required"));
    };
    if req.match_count == 0 {
        return Err(AppError::validation("match_count must be at least 1"));
    }
    let match_count = req.match_count.min(MAX_MATCH_COUNT);

    let expected_dim = state.llm_config.read().embedding_dim;
    if let Some(embedding) = &req.query_embedding {
        if embedding.len() != expected_dim {
            return Err(AppError::validation(format!(
                "query_embedding has dimension {}, expected {expected_dim}",
                embedding.len()
            )));
        }
    }

    let filters = SearchFilters {
        user_id,
        date_start: req.date_start,
        date_end: req.date_end,
        speakers: req.speakers.clone(),
        categories: req.categories.clone(),
        recording_ids: req.recording_ids.clone(),
        workspace_id: req.workspace_id,
    };

    // ── Step 1: candidate set ────────────────────────────────
    let candidates = state.chunks.filtered(&filters);
    if candidates.is_empty() {
        return Ok(Json(SearchResponse {
            query,
            results: Vec::new(),
            total_found: 0,
            reranked: 0,
            returned: 0,
        }));
    }

    let fetch_limit = match_count * 3; // Fetch more than needed for fusion

    // ── Step 2: ranked lists ─────────────────────────────────
    let candidate_ids: HashSet<Uuid> = candidates.iter().map(|c| c.id).collect();
    let fulltext_ranked = {
        let fulltext = state.fulltext.clone();
        let q = query.clone();
        let ids = candidate_ids.clone();
        tokio::task::spawn_blocking(move || fulltext.search(&q, fetch_limit, &ids))
            .await
            .map_err(|e| AppError::Internal(e.into()))?
            .map_err(AppError::Internal)?
    };

    let query_embedding = match req.query_embedding {
        Some(embedding) => Some(embedding),
        None => {
            let llm_config = state.llm_config.read().clone();
            match crate::llm::embeddings::embed_single(&state.http_client, &llm_config, &query)
                .await
            {
                Ok(embedding) => Some(embedding),
                Err(e) => {
                    // Full-text alone still answers the query.
                    tracing::warn!("Semantic search skipped: {e:#}");
                    None
                }
            }
        }
    };

    let semantic_ranked = match &query_embedding {
        Some(embedding) => rank_by_similarity(&candidates, embedding, fetch_limit),
        None => Vec::new(),
    };

    // ── Step 3: RRF fusion ───────────────────────────────────
    let mut results = rrf_fuse(
        &candidates,
        &fulltext_ranked,
        &semantic_ranked,
        req.full_text_weight,
        req.semantic_weight,
        req.rrf_k,
        fetch_limit,
    );
    let total_found = results.len();

    // ── Step 4: cross-encoder re-ranking ─────────────────────
    let mut reranked = 0;
    if req.use_rerank && !results.is_empty() {
        match crate::llm::rerank::rerank_candidates(
            &state.http_client,
            &state.config.reranker,
            &query,
            &mut results,
            fetch_limit,
        )
        .await
        {
            Ok(()) => {
                reranked = results.len();
                tracing::info!("Re-ranking applied to {reranked} results");
            }
            Err(e) => {
                tracing::warn!("Re-ranking failed, keeping fused order: {e:#}");
            }
        }
    }

    // ── Step 5: diversity filter ─────────────────────────────
    let results = diversity::filter_for_diversity(
        &results,
        DEFAULT_MAX_PER_SOURCE,
        DEFAULT_MIN_SEMANTIC_DISTANCE,
        match_count,
    );

    Ok(Json(SearchResponse {
        query,
        returned: results.len(),
        results,
        total_found,
        reranked,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::config::Config;
    use crate::models::Chunk;

    fn test_state(dir: &std::path::Path) -> AppState {
        let mut config = Config::default();
        config.data_dir = dir.to_path_buf();
        // Unreachable LLM: query embedding fails fast and the pipeline
        // degrades to full-text only.
        config.llm.base_url = "http://127.0.0.1:1".to_string();
        AppState::new(config).unwrap()
    }

    fn request(user_id: Uuid, match_count: usize) -> SearchRequest {
        SearchRequest {
            query: "renewal".to_string(),
            query_embedding: None,
            match_count,
            full_text_weight: 1.0,
            semantic_weight: 1.0,
            rrf_k: 60.0,
            user_id: Some(user_id),
            date_start: None,
            date_end: None,
            speakers: None,
            categories: None,
            recording_ids: None,
            workspace_id: None,
            use_rerank: false,
        }
    }

    #[tokio::test]
    async fn test_absurd_match_count_is_clamped_not_overflowed() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let user_id = Uuid::new_v4();

        // One matching chunk so the handler runs past the empty-candidate
        // early return and actually computes the fetch fan-out.
        state
            .chunks
            .insert_chunks(vec![Chunk {
                id: Uuid::new_v4(),
                recording_id: 1,
                user_id,
                text: "renewal pricing discussion".to_string(),
                speaker_name: None,
                speaker_email: None,
                timestamp: Utc::now(),
                call_title: "Call".to_string(),
                call_category: None,
                workspace_id: None,
                embedding: None,
                topics: None,
                sentiment: None,
            }])
            .unwrap();

        let resp = search(
            axum::extract::State(state),
            Json(request(user_id, usize::MAX)),
        )
        .await
        .unwrap();

        assert!(resp.0.returned <= MAX_MATCH_COUNT);
    }

    #[tokio::test]
    async fn test_zero_match_count_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let err = search(
            axum::extract::State(state),
            Json(request(Uuid::new_v4(), 0)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
