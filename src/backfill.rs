use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::llm::enrichment;
use crate::models::{BackfillRequest, BackfillReport, BatchOutcome};
use crate::state::AppState;

/// Bounds for batch_size and max_batches.
const BATCH_PARAM_MIN: usize = 1;
const BATCH_PARAM_MAX: usize = 100;

/// Backfill semantic metadata onto chunks that still lack it.
///
/// There is no queue here: selection is the "topics is null" predicate
/// itself, so a re-run after partial failure only ever sees the chunks
/// that are still unenriched. Batches run strictly sequentially with a
/// fixed delay to bound the external call rate; a failed batch is recorded
/// and the run moves on. Cancellation is honored between batches, returning
/// the partial report with already-applied batches intact.
pub async fn run_backfill(
    state: &AppState,
    req: &BackfillRequest,
    cancel: &CancellationToken,
) -> Result<BackfillReport, AppError> {
    if !(BATCH_PARAM_MIN..=BATCH_PARAM_MAX).contains(&req.batch_size) {
        return Err(AppError::validation(format!(
            "batch_size must be between {BATCH_PARAM_MIN} and {BATCH_PARAM_MAX}"
        )));
    }
    if !(BATCH_PARAM_MIN..=BATCH_PARAM_MAX).contains(&req.max_batches) {
        return Err(AppError::validation(format!(
            "max_batches must be between {BATCH_PARAM_MIN} and {BATCH_PARAM_MAX}"
        )));
    }

    let unprocessed = state
        .chunks
        .unenriched_ids(req.user_id, req.batch_size * req.max_batches);
    let total_unprocessed = unprocessed.len();
    let estimated_batches = total_unprocessed.div_ceil(req.batch_size);
    // ~1s per batch + 1s inter-batch wait
    let estimated_time_seconds = estimated_batches * 2;

    if req.dry_run {
        return Ok(BackfillReport {
            dry_run: true,
            total_unprocessed,
            processed: 0,
            failed: 0,
            batches_executed: 0,
            estimated_batches,
            estimated_time_seconds,
            batches: Vec::new(),
            resume_instructions: String::new(),
        });
    }

    let llm_config = state.llm_config.read().clone();
    let delay = std::time::Duration::from_millis(state.config.backfill.batch_delay_ms);
    let actual_batches = req.max_batches.min(estimated_batches);

    let mut processed = 0usize;
    let mut failed = 0usize;
    let mut batches = Vec::new();

    for (batch_index, batch_ids) in unprocessed
        .chunks(req.batch_size)
        .take(actual_batches)
        .enumerate()
    {
        if cancel.is_cancelled() {
            tracing::info!(
                "Backfill cancelled after {} of {actual_batches} batches",
                batch_index
            );
            break;
        }

        tracing::info!(
            "Enriching batch {}/{actual_batches} ({} chunks)",
            batch_index + 1,
            batch_ids.len()
        );

        match enrich_batch(state, &llm_config, batch_ids).await {
            Ok(applied) => {
                processed += applied;
                batches.push(BatchOutcome {
                    batch: batch_index + 1,
                    success: true,
                    processed: applied,
                    error: None,
                    chunk_ids: batch_ids.to_vec(),
                });
            }
            Err(e) => {
                tracing::warn!("Batch {} failed: {e:#}", batch_index + 1);
                failed += batch_ids.len();
                batches.push(BatchOutcome {
                    batch: batch_index + 1,
                    success: false,
                    processed: 0,
                    error: Some(format!("{e:#}")),
                    chunk_ids: batch_ids.to_vec(),
                });
            }
        }

        // Rate limiting between batches, not after the last one.
        if batch_index + 1 < actual_batches && !cancel.is_cancelled() {
            tokio::time::sleep(delay).await;
        }
    }

    let batches_executed = batches.len();
    let resume_instructions = if failed > 0 {
        "Some batches failed. Re-run this operation to retry failed chunks \
         (they still have null topics)."
            .to_string()
    } else {
        "All chunks processed successfully.".to_string()
    };

    Ok(BackfillReport {
        dry_run: false,
        total_unprocessed,
        processed,
        failed,
        batches_executed,
        estimated_batches,
        estimated_time_seconds,
        batches,
        resume_instructions,
    })
}

/// Run one enrichment batch and apply the results to the store. Returns the
/// number of chunks actually enriched.
async fn enrich_batch(
    state: &AppState,
    llm_config: &crate::config::LlmConfig,
    batch_ids: &[Uuid],
) -> anyhow::Result<usize> {
    let chunks = state.chunks.get_many(batch_ids);
    let inputs: Vec<(Uuid, String)> = chunks.iter().map(|c| (c.id, c.text.clone())).collect();

    let results = enrichment::enrich_chunks(&state.http_client, llm_config, &inputs).await?;

    let mut applied = 0usize;
    for result in results {
        match state
            .chunks
            .set_metadata(result.chunk_id, result.topics, result.sentiment)
        {
            Ok(()) => applied += 1,
            Err(e) => tracing::warn!("Failed to store metadata for {}: {e:#}", result.chunk_id),
        }
    }
    Ok(applied)
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
        // Nothing listens here, so every enrichment call fails fast.
        config.llm.base_url = "http://127.0.0.1:1".to_string();
        config.backfill.batch_delay_ms = 0;
        AppState::new(config).unwrap()
    }

    fn insert_unenriched(state: &AppState, user_id: Uuid, n: usize) {
        let chunks: Vec<Chunk> = (0..n)
            .map(|i| Chunk {
                id: Uuid::new_v4(),
                recording_id: i as i64,
                user_id,
                text: format!("notes from call {i}"),
                speaker_name: None,
                speaker_email: None,
                timestamp: Utc::now(),
                call_title: "Call".to_string(),
                call_category: None,
                workspace_id: None,
                embedding: None,
                topics: None,
                sentiment: None,
            })
            .collect();
        state.chunks.insert_chunks(chunks).unwrap();
    }

    fn request(user_id: Uuid, batch_size: usize, max_batches: usize, dry_run: bool) -> BackfillRequest {
        BackfillRequest {
            user_id,
            batch_size,
            max_batches,
            dry_run,
        }
    }

    #[tokio::test]
    async fn test_dry_run_reports_estimates_without_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let user_id = Uuid::new_v4();
        insert_unenriched(&state, user_id, 45);

        let report = run_backfill(&state, &request(user_id, 20, 10, true), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.total_unprocessed, 45);
        assert_eq!(report.estimated_batches, 3); // ceil(45 / 20)
        assert_eq!(report.estimated_time_seconds, 6);
        assert_eq!(report.processed, 0);
        assert_eq!(report.batches_executed, 0);
        assert!(report.batches.is_empty());

        // No mutation: everything is still unenriched.
        assert_eq!(state.chunks.unenriched_ids(user_id, 100).len(), 45);
    }

    #[tokio::test]
    async fn test_out_of_range_batch_params_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let user_id = Uuid::new_v4();

        for (batch_size, max_batches) in [(0, 10), (101, 10), (20, 0), (20, 101)] {
            let err = run_backfill(
                &state,
                &request(user_id, batch_size, max_batches, true),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_failed_batches_contained_in_report() {
        // The LLM endpoint is unreachable: every batch fails, but the run
        // itself succeeds and accounts for every chunk.
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let user_id = Uuid::new_v4();
        insert_unenriched(&state, user_id, 5);

        let report = run_backfill(&state, &request(user_id, 2, 10, false), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.total_unprocessed, 5);
        assert_eq!(report.processed, 0);
        assert_eq!(report.failed, 5);
        assert_eq!(report.batches_executed, 3);
        assert!(report.batches.iter().all(|b| !b.success && b.error.is_some()));
        assert!(report.resume_instructions.contains("Re-run"));

        // Nothing was marked enriched, so a re-run sees the same chunks.
        assert_eq!(state.chunks.unenriched_ids(user_id, 100).len(), 5);
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_the_next_batch() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let user_id = Uuid::new_v4();
        insert_unenriched(&state, user_id, 5);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run_backfill(&state, &request(user_id, 2, 10, false), &cancel)
            .await
            .unwrap();

        // Cancelled before the first batch: partial report, zero work done.
        assert_eq!(report.batches_executed, 0);
        assert_eq!(report.processed, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.total_unprocessed, 5);
    }
}
