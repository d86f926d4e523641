use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::{Config, LlmConfig};
use crate::queue::JobQueue;
use crate::search::fulltext::FullTextIndex;
use crate::store::ChunkStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub chunks: Arc<ChunkStore>,
    pub fulltext: Arc<FullTextIndex>,
    pub queue: Arc<JobQueue>,
    pub http_client: reqwest::Client,
    pub llm_config: Arc<RwLock<LlmConfig>>,
    pub enrichment_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        // Ensure data directories exist
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(config.index_dir())?;

        let chunks = ChunkStore::open_or_create(&config.chunks_path())?;
        let fulltext = FullTextIndex::open_or_create(&config.index_dir())?;
        let queue = JobQueue::open_or_create(&config.queue_path(), &config.queue)?;

        let llm_config = config.llm.clone();

        Ok(Self {
            config,
            chunks: Arc::new(chunks),
            fulltext: Arc::new(fulltext),
            queue: Arc::new(queue),
            http_client: reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
            llm_config: Arc::new(RwLock::new(llm_config)),
            // One backfill run at a time; a second request queues behind it.
            enrichment_semaphore: Arc::new(tokio::sync::Semaphore::new(1)),
        })
    }
}
