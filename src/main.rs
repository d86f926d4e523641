use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use transcript_search::api;
use transcript_search::config::Config;
use transcript_search::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);

    let state = AppState::new(config.clone())?;
    tracing::info!("Loaded {} chunks", state.chunks.chunk_count());

    let app = Router::new()
        .route("/api/chunks", post(api::jobs::ingest_chunks))
        .route("/api/jobs", post(api::jobs::submit_job))
        .route("/api/jobs/{id}", get(api::jobs::job_status))
        .route("/api/jobs/{id}/retry", post(api::jobs::retry_failed))
        .route("/api/queue/claim", post(api::jobs::claim_tasks))
        .route("/api/queue/complete", post(api::jobs::complete_task))
        .route("/api/search", post(api::search::search))
        .route("/api/backfill", post(api::backfill::backfill))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
