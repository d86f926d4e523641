use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::llm::embeddings;
use crate::models::QueueTask;
use crate::state::AppState;

/// Spawn the embedding worker for a freshly submitted job.
pub fn spawn_worker(state: AppState, job_id: Uuid) {
    tokio::spawn(async move {
        let worker_id = format!("worker-{}", Uuid::new_v4());
        if let Err(e) = run_worker(&state, &worker_id, job_id).await {
            tracing::error!("Embedding worker {worker_id} for job {job_id} died: {e:#}");
        }
    });
}

/// Drive a job's tasks to completion.
///
/// Claims a batch, embeds each claimed chunk, and reports every outcome back
/// to the queue so the job's counters stay conserved. Each iteration runs
/// under a wall-clock budget; claims the budget expires on are released
/// unstarted rather than left to age into stale leases. The loop ends when
/// the queue has nothing claimable for this job.
pub async fn run_worker(state: &AppState, worker_id: &str, job_id: Uuid) -> anyhow::Result<()> {
    let batch_size = state.config.queue.worker_batch_size;
    let budget = Duration::from_secs(state.config.queue.worker_budget_secs);

    loop {
        let claimed = state.queue.claim_tasks(worker_id, batch_size, Some(job_id))?;
        if claimed.is_empty() {
            if state.queue.claimable_count(Some(job_id)) == 0 {
                break;
            }
            continue;
        }

        tracing::info!(
            "Worker {worker_id} claimed {} tasks for job {job_id}",
            claimed.len()
        );

        let started = Instant::now();
        let mut released = 0usize;

        for (i, task) in claimed.iter().enumerate() {
            if started.elapsed() >= budget {
                // Out of time: hand the rest back untouched.
                for unstarted in &claimed[i..] {
                    state.queue.release_task(unstarted.id)?;
                    released += 1;
                }
                break;
            }
            process_task(state, task).await?;
        }

        if released > 0 {
            tracing::info!(
                "Worker {worker_id} released {released} unstarted tasks after {}s budget",
                budget.as_secs()
            );
        }
    }

    if let Some(job) = state.queue.job(job_id) {
        tracing::info!(
            "Worker {worker_id} done: job {job_id} at {}/{} ({} failed)",
            job.queue_completed,
            job.queue_total,
            job.queue_failed
        );
    }
    Ok(())
}

/// Embed one claimed chunk and report the outcome.
///
/// Only queue bookkeeping errors propagate; an embedding failure is the
/// task's failure, not the worker's.
async fn process_task(state: &AppState, task: &QueueTask) -> anyhow::Result<()> {
    let Some(chunk) = state.chunks.get(task.chunk_id) else {
        state.queue.complete_task(
            task.id,
            false,
            0,
            Some(format!("chunk {} no longer exists", task.chunk_id)),
        )?;
        return Ok(());
    };

    let llm_config = state.llm_config.read().clone();
    let expected_dim = llm_config.embedding_dim;

    let outcome = match embeddings::embed_single(&state.http_client, &llm_config, &chunk.text).await
    {
        Ok(embedding) => state
            .chunks
            .set_embedding(chunk.id, embedding, expected_dim)
            .map(|_| ()),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => {
            state.queue.complete_task(task.id, true, 1, None)?;
        }
        Err(e) => {
            tracing::warn!("Embedding task {} failed: {e:#}", task.id);
            state
                .queue
                .complete_task(task.id, false, 0, Some(format!("{e:#}")))?;
        }
    }
    Ok(())
}
