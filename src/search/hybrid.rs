use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{Chunk, SearchCandidate};

/// Conjunctive filter set for a search call. Every field except `user_id`
/// is optional; an absent filter leaves that dimension unfiltered.
#[derive(Debug, Clone)]
pub struct SearchFilters {
    /// Mandatory: every call is scoped to exactly one caller's data.
    pub user_id: Uuid,
    /// Inclusive start of the date range on the chunk timestamp.
    pub date_start: Option<DateTime<Utc>>,
    /// Inclusive end of the date range.
    pub date_end: Option<DateTime<Utc>>,
    pub speakers: Option<Vec<String>>,
    pub categories: Option<Vec<String>>,
    pub recording_ids: Option<Vec<i64>>,
    /// Workspace scope for multi-tenant deployments.
    pub workspace_id: Option<Uuid>,
}

impl SearchFilters {
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if chunk.user_id != self.user_id {
            return false;
        }
        if let Some(start) = self.date_start {
            if chunk.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.date_end {
            if chunk.timestamp > end {
                return false;
            }
        }
        if let Some(speakers) = &self.speakers {
            match &chunk.speaker_name {
                Some(name) if speakers.contains(name) => {}
                _ => return false,
            }
        }
        if let Some(categories) = &self.categories {
            match &chunk.call_category {
                Some(cat) if categories.contains(cat) => {}
                _ => return false,
            }
        }
        if let Some(ids) = &self.recording_ids {
            if !ids.contains(&chunk.recording_id) {
                return false;
            }
        }
        if let Some(ws) = self.workspace_id {
            if chunk.workspace_id != Some(ws) {
                return false;
            }
        }
        true
    }
}

/// Weighted Reciprocal Rank Fusion of the full-text and semantic ranked
/// lists over one candidate set.
///
/// Each chunk's fused score is
/// `full_text_weight * 1/(rrf_k + rank_ft) + semantic_weight * 1/(rrf_k + rank_sem)`
/// where a chunk missing from one list contributes nothing for that term
/// (absence is not a penalty rank). Ties break by newer timestamp, then by
/// chunk id, so the output order is fully deterministic.
pub fn rrf_fuse(
    candidates: &[Chunk],
    fulltext_ranked: &[(Uuid, f32)],
    semantic_ranked: &[(Uuid, f32)],
    full_text_weight: f32,
    semantic_weight: f32,
    rrf_k: f32,
    match_count: usize,
) -> Vec<SearchCandidate> {
    let by_id: HashMap<Uuid, &Chunk> = candidates.iter().map(|c| (c.id, c)).collect();
    let mut score_map: HashMap<Uuid, SearchCandidate> = HashMap::new();

    for (rank, (chunk_id, _score)) in fulltext_ranked.iter().enumerate() {
        let Some(chunk) = by_id.get(chunk_id) else {
            continue;
        };
        let rrf_score = full_text_weight * (1.0 / (rrf_k + rank as f32 + 1.0));

        let entry = score_map
            .entry(*chunk_id)
            .or_insert_with(|| candidate_from_chunk(chunk));
        entry.fts_rank = Some(rank);
        entry.rrf_score += rrf_score;
    }

    for (rank, (chunk_id, similarity)) in semantic_ranked.iter().enumerate() {
        let Some(chunk) = by_id.get(chunk_id) else {
            continue;
        };
        let rrf_score = semantic_weight * (1.0 / (rrf_k + rank as f32 + 1.0));

        let entry = score_map
            .entry(*chunk_id)
            .or_insert_with(|| candidate_from_chunk(chunk));
        entry.similarity_score = entry.similarity_score.max(*similarity);
        entry.rrf_score += rrf_score;
    }

    let mut results: Vec<SearchCandidate> = score_map.into_values().collect();
    results.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    results.truncate(match_count);
    results
}

fn candidate_from_chunk(chunk: &Chunk) -> SearchCandidate {
    SearchCandidate {
        chunk_id: chunk.id,
        recording_id: chunk.recording_id,
        text: chunk.text.clone(),
        speaker_name: chunk.speaker_name.clone(),
        timestamp: chunk.timestamp,
        call_title: chunk.call_title.clone(),
        call_category: chunk.call_category.clone(),
        topics: chunk.topics.clone(),
        sentiment: chunk.sentiment.clone(),
        embedding: chunk.embedding.clone(),
        fts_rank: None,
        similarity_score: 0.0,
        rrf_score: 0.0,
        rerank_score: None,
    }
}
