use uuid::Uuid;

use crate::models::Chunk;

/// Rank candidate chunks by cosine similarity against a query embedding.
///
/// Chunks without an embedding are absent from the returned list (they
/// simply contribute nothing to the semantic side of the fusion).
pub fn rank_by_similarity(
    candidates: &[Chunk],
    query_embedding: &[f32],
    limit: usize,
) -> Vec<(Uuid, f32)> {
    let mut scored: Vec<(Uuid, f32)> = candidates
        .iter()
        .filter_map(|c| {
            c.embedding
                .as_ref()
                .map(|e| (c.id, cosine_similarity(query_embedding, e)))
        })
        .collect();

    // Sort descending by score; equal scores break by chunk id for
    // deterministic output.
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(limit);
    scored
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chunk_with_embedding(embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            recording_id: 1,
            user_id: Uuid::new_v4(),
            text: "hello".to_string(),
            speaker_name: None,
            speaker_email: None,
            timestamp: Utc::now(),
            call_title: "Call".to_string(),
            call_category: None,
            workspace_id: None,
            embedding,
            topics: None,
            sentiment: None,
        }
    }

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![0.3, 0.5, 0.2];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_vectors() {
        let s = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(s.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_rank_skips_unembedded_chunks() {
        let embedded = chunk_with_embedding(Some(vec![1.0, 0.0]));
        let bare = chunk_with_embedding(None);
        let ranked = rank_by_similarity(&[embedded.clone(), bare], &[1.0, 0.0], 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0, embedded.id);
    }

    #[test]
    fn test_rank_orders_by_similarity() {
        let close = chunk_with_embedding(Some(vec![0.9, 0.1]));
        let far = chunk_with_embedding(Some(vec![0.1, 0.9]));
        let ranked = rank_by_similarity(&[far.clone(), close.clone()], &[1.0, 0.0], 10);
        assert_eq!(ranked[0].0, close.id);
        assert_eq!(ranked[1].0, far.id);
    }
}
