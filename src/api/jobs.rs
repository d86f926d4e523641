use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    Chunk, ClaimRequest, ClaimedTask, CompleteRequest, IngestRequest, IngestResponse, Job,
    SubmitJobRequest,
};
use crate::state::AppState;
use crate::worker;

/// POST /api/chunks - Ingest transcript chunks from the external chunker.
/// Inserted chunks carry no embedding or metadata yet; submitting an
/// embedding job for them is a separate call.
pub async fn ingest_chunks(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    if req.chunks.is_empty() {
        return Err(AppError::validation("chunks must not be empty"));
    }
    if req.chunks.iter().any(|c| c.text.trim().is_empty()) {
        return Err(AppError::validation("chunk text must not be empty"));
    }

    let chunks: Vec<Chunk> = req
        .chunks
        .into_iter()
        .map(|c| Chunk {
            id: Uuid::new_v4(),
            recording_id: c.recording_id,
            user_id: c.user_id,
            text: c.text,
            speaker_name: c.speaker_name,
            speaker_email: c.speaker_email,
            timestamp: c.timestamp,
            call_title: c.call_title,
            call_category: c.call_category,
            workspace_id: c.workspace_id,
            embedding: None,
            topics: None,
            sentiment: None,
        })
        .collect();

    let chunk_ids: Vec<Uuid> = chunks.iter().map(|c| c.id).collect();

    state
        .chunks
        .insert_chunks(chunks.clone())
        .map_err(AppError::Internal)?;

    // Tantivy commit is blocking I/O
    let fulltext = state.fulltext.clone();
    tokio::task::spawn_blocking(move || fulltext.index_chunks(&chunks))
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .map_err(AppError::Internal)?;

    tracing::info!("Ingested {} chunks", chunk_ids.len());

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            inserted: chunk_ids.len(),
            chunk_ids,
        }),
    ))
}

/// POST /api/jobs - Create an embedding job over existing chunks and start a
/// worker for it. The job and all of its queue tasks appear atomically.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<Job>), AppError> {
    if !state.chunks.contains_all(&req.chunk_ids) {
        return Err(AppError::validation(
            "chunk_ids refers to chunks that do not exist",
        ));
    }

    let job = state.queue.submit_job(
        req.user_id,
        &req.chunk_ids,
        state.config.queue.max_job_chunks,
    )?;

    tracing::info!(
        "Job {} submitted: {} chunks for user {}",
        job.id,
        job.queue_total,
        job.user_id
    );

    worker::spawn_worker(state.clone(), job.id);

    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/jobs/{id} - Job progress snapshot.
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Job>, AppError> {
    state
        .queue
        .job(job_id)
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Job {job_id} not found")))
}

/// POST /api/jobs/{id}/retry - Requeue a job's permanently failed tasks
/// with a fresh retry budget and restart a worker for them.
pub async fn retry_failed(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Job>, AppError> {
    let requeued = state.queue.requeue_failed(job_id)?;
    if requeued > 0 {
        worker::spawn_worker(state.clone(), job_id);
    }

    state
        .queue
        .job(job_id)
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Job {job_id} not found")))
}

/// POST /api/queue/claim - Claim a batch of tasks for an external worker.
/// `batch_size: 0` is a valid health-check that claims nothing.
pub async fn claim_tasks(
    State(state): State<AppState>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<Vec<ClaimedTask>>, AppError> {
    if req.worker_id.trim().is_empty() {
        return Err(AppError::validation("worker_id must not be empty"));
    }

    let claimed = state
        .queue
        .claim_tasks(&req.worker_id, req.batch_size, req.job_id)?;

    Ok(Json(
        claimed
            .into_iter()
            .map(|t| ClaimedTask {
                id: t.id,
                chunk_id: t.chunk_id,
                attempts: t.attempts,
            })
            .collect(),
    ))
}

/// POST /api/queue/complete - Report a claimed task's outcome.
pub async fn complete_task(
    State(state): State<AppState>,
    Json(req): Json<CompleteRequest>,
) -> Result<StatusCode, AppError> {
    let error = (!req.success).then(|| {
        req.error
            .clone()
            .unwrap_or_else(|| format!("task failed at {}", Utc::now()))
    });

    state
        .queue
        .complete_task(req.task_id, req.success, req.chunks_created, error)?;

    Ok(StatusCode::NO_CONTENT)
}
