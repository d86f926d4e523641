use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of transcript text: the thing that gets embedded and retrieved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub recording_id: i64,
    pub user_id: Uuid,
    pub text: String,
    pub speaker_name: Option<String>,
    pub speaker_email: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub call_title: String,
    pub call_category: Option<String>,
    /// Workspace scope for multi-tenant deployments; None = personal data.
    pub workspace_id: Option<Uuid>,
    /// Absent until the embedding worker has processed this chunk.
    /// When present, exactly `embedding_dim` long.
    pub embedding: Option<Vec<f32>>,
    /// Enrichment completion marker: either fully populated or None,
    /// never partially filled.
    pub topics: Option<Vec<String>>,
    pub sentiment: Option<String>,
}

impl Chunk {
    /// True once the enrichment batcher has filled in semantic metadata.
    pub fn is_enriched(&self) -> bool {
        self.topics.is_some()
    }
}

/// Queue task status. Transitions are centralized in [`crate::queue`];
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// One chunk awaiting embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTask {
    pub id: Uuid,
    pub chunk_id: Uuid,
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub status: TaskStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    CompletedWithErrors,
}

/// An aggregate of queue tasks submitted together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: JobState,
    pub queue_total: u64,
    pub queue_completed: u64,
    pub queue_failed: u64,
    pub chunks_created: u64,
    pub progress_current: u64,
    pub progress_total: u64,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn is_done(&self) -> bool {
        self.queue_completed + self.queue_failed == self.queue_total
    }
}

/// A chunk plus its ranking signals. Query-time only, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SearchCandidate {
    pub chunk_id: Uuid,
    pub recording_id: i64,
    pub text: String,
    pub speaker_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub call_title: String,
    pub call_category: Option<String>,
    pub topics: Option<Vec<String>>,
    pub sentiment: Option<String>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// Rank in the full-text list (0-based), when present in it.
    pub fts_rank: Option<usize>,
    pub similarity_score: f32,
    pub rrf_score: f32,
    pub rerank_score: Option<f32>,
}

// ─── Request / response types ────────────────────────────

/// Chunk ingest request: the boundary with the external transcript chunker.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub chunks: Vec<IngestChunk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestChunk {
    pub recording_id: i64,
    pub user_id: Uuid,
    pub text: String,
    pub speaker_name: Option<String>,
    pub speaker_email: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub call_title: String,
    pub call_category: Option<String>,
    pub workspace_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub inserted: usize,
    pub chunk_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitJobRequest {
    pub user_id: Uuid,
    pub chunk_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimRequest {
    pub worker_id: String,
    pub batch_size: usize,
    pub job_id: Option<Uuid>,
}

/// Task record returned by the claim RPC.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimedTask {
    pub id: Uuid,
    pub chunk_id: Uuid,
    pub attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteRequest {
    pub task_id: Uuid,
    pub success: bool,
    #[serde(default)]
    pub chunks_created: u64,
    pub error: Option<String>,
}

/// Hybrid search request.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Precomputed query embedding; generated from `query` when absent.
    pub query_embedding: Option<Vec<f32>>,
    #[serde(default = "default_match_count")]
    pub match_count: usize,
    #[serde(default = "default_weight")]
    pub full_text_weight: f32,
    #[serde(default = "default_weight")]
    pub semantic_weight: f32,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
    /// Mandatory: every call is scoped to exactly one caller's data.
    pub user_id: Option<Uuid>,
    pub date_start: Option<DateTime<Utc>>,
    pub date_end: Option<DateTime<Utc>>,
    pub speakers: Option<Vec<String>>,
    pub categories: Option<Vec<String>>,
    pub recording_ids: Option<Vec<i64>>,
    pub workspace_id: Option<Uuid>,
    #[serde(default)]
    pub use_rerank: bool,
}

fn default_match_count() -> usize {
    10
}

fn default_weight() -> f32 {
    1.0
}

fn default_rrf_k() -> f32 {
    60.0
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchCandidate>,
    pub total_found: usize,
    pub reranked: usize,
    pub returned: usize,
}

/// POST /api/backfill request.
#[derive(Debug, Clone, Deserialize)]
pub struct BackfillRequest {
    pub user_id: Uuid,
    #[serde(default = "default_backfill_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_backfill_max_batches")]
    pub max_batches: usize,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_backfill_batch_size() -> usize {
    20
}

fn default_backfill_max_batches() -> usize {
    10
}

/// Outcome of one enrichment batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub batch: usize,
    pub success: bool,
    pub processed: usize,
    pub error: Option<String>,
    pub chunk_ids: Vec<Uuid>,
}

/// Summary returned by a backfill run. Per-batch failures are contained
/// here, never thrown.
#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub dry_run: bool,
    pub total_unprocessed: usize,
    pub processed: usize,
    pub failed: usize,
    pub batches_executed: usize,
    pub estimated_batches: usize,
    pub estimated_time_seconds: usize,
    pub batches: Vec<BatchOutcome>,
    pub resume_instructions: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_serializes_to_snake_case() {
        let json = serde_json::to_value(TaskStatus::Processing).unwrap();
        assert_eq!(json, "processing");
    }

    #[test]
    fn test_task_status_round_trips() {
        let status = TaskStatus::Failed;
        let json = serde_json::to_string(&status).unwrap();
        let back: TaskStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TaskStatus::Failed);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_job_state_serializes_to_snake_case() {
        let json = serde_json::to_value(JobState::CompletedWithErrors).unwrap();
        assert_eq!(json, "completed_with_errors");
    }
}
