use std::collections::HashMap;

use crate::models::SearchCandidate;
use crate::search::vector::cosine_similarity;

/// Reference defaults, matching the downstream LLM context budget.
pub const DEFAULT_MAX_PER_SOURCE: usize = 2;
pub const DEFAULT_MIN_SEMANTIC_DISTANCE: f32 = 0.3;
pub const DEFAULT_TARGET_COUNT: usize = 5;

/// Re-rank a relevance-ordered candidate list for diversity.
///
/// Input order is priority order: callers must pre-sort by relevance.
/// Single pass; a candidate is skipped when its recording already
/// contributed `max_per_source` results, or when it and every accepted
/// candidate carry embeddings and its cosine similarity to any accepted
/// one exceeds `1 - min_semantic_distance`. Stops at `target_count`.
///
/// Pure function: no I/O, inputs untouched.
pub fn filter_for_diversity(
    candidates: &[SearchCandidate],
    max_per_source: usize,
    min_semantic_distance: f32,
    target_count: usize,
) -> Vec<SearchCandidate> {
    let similarity_ceiling = 1.0 - min_semantic_distance;
    let mut accepted: Vec<SearchCandidate> = Vec::new();
    let mut source_counts: HashMap<i64, usize> = HashMap::new();

    for candidate in candidates {
        if accepted.len() >= target_count {
            break;
        }

        let count = source_counts.get(&candidate.recording_id).copied().unwrap_or(0);
        if count >= max_per_source {
            continue;
        }

        // Near-duplicate suppression only applies when the comparison is
        // well-defined on both sides.
        let embeddings_complete = candidate.embedding.is_some()
            && accepted.iter().all(|a| a.embedding.is_some());
        if embeddings_complete {
            let candidate_embedding = candidate.embedding.as_ref().unwrap();
            let near_duplicate = accepted.iter().any(|a| {
                let accepted_embedding = a.embedding.as_ref().unwrap();
                cosine_similarity(candidate_embedding, accepted_embedding) > similarity_ceiling
            });
            if near_duplicate {
                continue;
            }
        }

        accepted.push(candidate.clone());
        *source_counts.entry(candidate.recording_id).or_insert(0) += 1;
    }

    accepted
}

/// Degraded variant: per-source cap only, no near-duplicate suppression.
///
/// Used when candidates carry no embeddings (e.g. the cheaper re-ranking
/// path). An explicit entry point, never an implicit mid-run fallback.
pub fn simple_diversity_filter(
    candidates: &[SearchCandidate],
    max_per_source: usize,
    target_count: usize,
) -> Vec<SearchCandidate> {
    let mut accepted: Vec<SearchCandidate> = Vec::new();
    let mut source_counts: HashMap<i64, usize> = HashMap::new();

    for candidate in candidates {
        if accepted.len() >= target_count {
            break;
        }

        let count = source_counts.get(&candidate.recording_id).copied().unwrap_or(0);
        if count >= max_per_source {
            continue;
        }

        accepted.push(candidate.clone());
        *source_counts.entry(candidate.recording_id).or_insert(0) += 1;
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn make_candidate(recording_id: i64, embedding: Option<Vec<f32>>) -> SearchCandidate {
        SearchCandidate {
            chunk_id: Uuid::new_v4(),
            recording_id,
            text: format!("chunk from recording {recording_id}"),
            speaker_name: None,
            timestamp: Utc::now(),
            call_title: "Call".to_string(),
            call_category: None,
            topics: None,
            sentiment: None,
            embedding,
            fts_rank: None,
            similarity_score: 0.0,
            rrf_score: 0.5,
            rerank_score: None,
        }
    }

    #[test]
    fn test_empty_input() {
        let out = filter_for_diversity(&[], 2, 0.3, 5);
        assert!(out.is_empty());
    }

    #[test]
    fn test_single_source_capped_not_target_limited() {
        // 10 candidates all from the same recording, cap 2, target 5:
        // output length 2, capped by source.
        let candidates: Vec<_> = (0..10).map(|_| make_candidate(42, None)).collect();
        let out = filter_for_diversity(&candidates, 2, 0.3, 5);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|c| c.recording_id == 42));
    }

    #[test]
    fn test_per_source_cap_holds_across_many_sources() {
        let mut candidates = Vec::new();
        for recording in 0..4i64 {
            for _ in 0..5 {
                candidates.push(make_candidate(recording, None));
            }
        }

        let out = filter_for_diversity(&candidates, 2, 0.3, 100);
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for c in &out {
            *counts.entry(c.recording_id).or_insert(0) += 1;
        }
        assert!(counts.values().all(|&n| n <= 2));
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn test_stops_at_target_count() {
        let candidates: Vec<_> = (0..20).map(|i| make_candidate(i, None)).collect();
        let out = filter_for_diversity(&candidates, 2, 0.3, 5);
        assert_eq!(out.len(), 5);
        // Priority order preserved: first five sources win.
        let ids: Vec<i64> = out.iter().map(|c| c.recording_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_near_duplicates_suppressed() {
        let base = vec![1.0, 0.0, 0.0];
        let near = vec![0.99, 0.14, 0.0]; // cosine ~0.99 with base
        let far = vec![0.0, 1.0, 0.0];

        let candidates = vec![
            make_candidate(1, Some(base)),
            make_candidate(2, Some(near)),
            make_candidate(3, Some(far)),
        ];

        let out = filter_for_diversity(&candidates, 2, 0.3, 5);
        let ids: Vec<i64> = out.iter().map(|c| c.recording_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_accepted_pairs_respect_distance_floor() {
        let candidates = vec![
            make_candidate(1, Some(vec![1.0, 0.0, 0.0])),
            make_candidate(2, Some(vec![0.9, 0.44, 0.0])),
            make_candidate(3, Some(vec![0.7, 0.71, 0.0])),
            make_candidate(4, Some(vec![0.0, 0.0, 1.0])),
        ];

        let min_distance = 0.3;
        let out = filter_for_diversity(&candidates, 2, min_distance, 5);

        for i in 0..out.len() {
            for j in (i + 1)..out.len() {
                let a = out[i].embedding.as_ref().unwrap();
                let b = out[j].embedding.as_ref().unwrap();
                assert!(cosine_similarity(a, b) <= 1.0 - min_distance + 1e-6);
            }
        }
    }

    #[test]
    fn test_missing_embedding_skips_similarity_check_not_candidate() {
        let candidates = vec![
            make_candidate(1, Some(vec![1.0, 0.0])),
            make_candidate(2, None), // no embedding: cap still applies, dedup does not
            make_candidate(3, Some(vec![1.0, 0.0])),
        ];

        let out = filter_for_diversity(&candidates, 2, 0.3, 5);
        let ids: Vec<i64> = out.iter().map(|c| c.recording_id).collect();
        // Recording 2 is accepted; recording 3 would be a near-duplicate of 1
        // but the accepted set no longer has complete embeddings, so the
        // check is undefined and skipped.
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_simple_variant_ignores_embeddings() {
        let duplicate = vec![1.0, 0.0];
        let candidates = vec![
            make_candidate(1, Some(duplicate.clone())),
            make_candidate(2, Some(duplicate)),
        ];

        let out = simple_diversity_filter(&candidates, 2, 5);
        assert_eq!(out.len(), 2); // identical embeddings, both kept
    }

    #[test]
    fn test_simple_variant_enforces_source_cap() {
        let candidates: Vec<_> = (0..6).map(|_| make_candidate(9, None)).collect();
        let out = simple_diversity_filter(&candidates, 2, 5);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_inputs_not_mutated() {
        let candidates = vec![make_candidate(1, None), make_candidate(1, None)];
        let before: Vec<Uuid> = candidates.iter().map(|c| c.chunk_id).collect();
        let _ = filter_for_diversity(&candidates, 1, 0.3, 5);
        let after: Vec<Uuid> = candidates.iter().map(|c| c.chunk_id).collect();
        assert_eq!(before, after);
    }
}
