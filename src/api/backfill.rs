use axum::extract::State;
use axum::Json;
use tokio_util::sync::CancellationToken;

use crate::backfill::run_backfill;
use crate::error::AppError;
use crate::models::{BackfillReport, BackfillRequest};
use crate::state::AppState;

/// POST /api/backfill - Enrich chunks that still lack semantic metadata.
///
/// Runs on a spawned task so a client disconnect cancels it cleanly between
/// batches instead of tearing it down mid-write. Only one backfill runs at a
/// time; concurrent requests queue on the semaphore.
pub async fn backfill(
    State(state): State<AppState>,
    Json(req): Json<BackfillRequest>,
) -> Result<Json<BackfillReport>, AppError> {
    let permit = state
        .enrichment_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    let cancel = CancellationToken::new();
    // Dropped when the client goes away, cancelling the spawned run.
    let _guard = cancel.clone().drop_guard();

    let task = tokio::spawn(async move {
        let _permit = permit;
        run_backfill(&state, &req, &cancel).await
    });

    let report = task
        .await
        .map_err(|e| AppError::Internal(e.into()))??;

    Ok(Json(report))
}
