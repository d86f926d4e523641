use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where chunk data, queue state, and index data are stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// LLM provider configuration (embeddings + enrichment)
    pub llm: LlmConfig,
    /// Cross-encoder reranker configuration
    pub reranker: RerankerConfig,
    /// Embedding queue configuration
    pub queue: QueueConfig,
    /// Metadata backfill configuration
    pub backfill: BackfillConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for metadata enrichment
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub embedding_dim: usize,
}

/// Configuration for the cross-encoder reranker sidecar (e.g. llama-server
/// with a reranker model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Base URL for the reranker API. If None, reranking falls back to
    /// RRF-only ordering.
    pub base_url: Option<String>,
    /// Model name to send in the rerank request.
    pub model: Option<String>,
    /// Request timeout in seconds (capped at 30).
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Retry budget per task. A task that has failed this many claimed
    /// attempts becomes permanently failed.
    pub max_attempts: u32,
    /// Lease on a processing claim. A task still processing after this many
    /// seconds is treated as abandoned and becomes claimable again.
    pub lease_secs: u64,
    /// Ceiling on chunk ids per submitted job.
    pub max_job_chunks: usize,
    /// Tasks a worker claims per iteration.
    pub worker_batch_size: usize,
    /// Wall-clock budget for a single worker iteration; unstarted claims
    /// are released back to pending when it expires.
    pub worker_budget_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// Delay between enrichment batches, to bound external call rate.
    pub batch_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:9100".to_string(),
            llm: LlmConfig::default(),
            reranker: RerankerConfig::default(),
            queue: QueueConfig::default(),
            backfill: BackfillConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
            embedding_dim: 768,
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: None,
            timeout_secs: 10,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            lease_secs: 600,
            max_job_chunks: 5_000,
            worker_batch_size: 10,
            worker_budget_secs: 90,
        }
    }
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_delay_ms: 1_000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("TRANSCRIPT_SEARCH_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("TRANSCRIPT_SEARCH_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(dim) = std::env::var("LLM_EMBEDDING_DIM") {
            if let Ok(d) = dim.parse() {
                config.llm.embedding_dim = d;
            }
        }
        if let Ok(val) = std::env::var("QUEUE_MAX_ATTEMPTS") {
            if let Ok(v) = val.parse() {
                config.queue.max_attempts = v;
            }
        }
        if let Ok(val) = std::env::var("QUEUE_LEASE_SECS") {
            if let Ok(v) = val.parse() {
                config.queue.lease_secs = v;
            }
        }
        if let Ok(val) = std::env::var("QUEUE_MAX_JOB_CHUNKS") {
            if let Ok(v) = val.parse() {
                config.queue.max_job_chunks = v;
            }
        }
        if let Ok(val) = std::env::var("QUEUE_WORKER_BATCH_SIZE") {
            if let Ok(v) = val.parse() {
                config.queue.worker_batch_size = v;
            }
        }
        if let Ok(val) = std::env::var("QUEUE_WORKER_BUDGET_SECS") {
            if let Ok(v) = val.parse() {
                config.queue.worker_budget_secs = v;
            }
        }
        if let Ok(val) = std::env::var("BACKFILL_BATCH_DELAY_MS") {
            if let Ok(v) = val.parse() {
                config.backfill.batch_delay_ms = v;
            }
        }

        // Reranker config
        if let Ok(url) = std::env::var("RERANKER_BASE_URL") {
            config.reranker.base_url = Some(url);
        }
        if let Ok(model) = std::env::var("RERANKER_MODEL") {
            config.reranker.model = Some(model);
        }
        if let Ok(val) = std::env::var("RERANKER_TIMEOUT_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.reranker.timeout_secs = v.min(30); // Cap at 30s
            }
        }

        config
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    pub fn chunks_path(&self) -> PathBuf {
        self.data_dir.join("chunks.json")
    }

    pub fn queue_path(&self) -> PathBuf {
        self.data_dir.join("queue.json")
    }
}
