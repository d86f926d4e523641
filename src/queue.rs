use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::AppError;
use crate::models::{Job, JobState, QueueTask, TaskStatus};

/// Durable work queue for embedding tasks, grouped into jobs.
///
/// Every mutation of task status goes through `claim_tasks`,
/// `complete_task`, or `release_task`; there is no raw setter. All three
/// run inside a single mutex section, which is the one place in the system
/// where correctness depends on true atomicity: no two concurrent claims
/// can ever hand out the same task.
pub struct JobQueue {
    inner: Mutex<QueueState>,
    persist_path: PathBuf,
    max_attempts: u32,
    lease: Duration,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueState {
    jobs: Vec<Job>,
    tasks: Vec<QueueTask>,
}

impl JobQueue {
    pub fn open_or_create(persist_path: &Path, config: &QueueConfig) -> Result<Self> {
        if let Some(parent) = persist_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let state = if persist_path.exists() {
            let data = std::fs::read_to_string(persist_path)
                .context("Failed to read queue state")?;
            serde_json::from_str(&data).unwrap_or_default()
        } else {
            QueueState::default()
        };

        Ok(Self {
            inner: Mutex::new(state),
            persist_path: persist_path.to_path_buf(),
            max_attempts: config.max_attempts,
            lease: Duration::seconds(config.lease_secs as i64),
        })
    }

    /// Create a job and one pending task per chunk, atomically.
    pub fn submit_job(
        &self,
        user_id: Uuid,
        chunk_ids: &[Uuid],
        max_job_chunks: usize,
    ) -> Result<Job, AppError> {
        if chunk_ids.is_empty() {
            return Err(AppError::validation("chunk_ids must not be empty"));
        }
        if chunk_ids.len() > max_job_chunks {
            return Err(AppError::validation(format!(
                "chunk_ids exceeds the batch ceiling of {max_job_chunks}"
            )));
        }

        let job = Job {
            id: Uuid::new_v4(),
            user_id,
            status: JobState::Running,
            queue_total: chunk_ids.len() as u64,
            queue_completed: 0,
            queue_failed: 0,
            chunks_created: 0,
            progress_current: 0,
            progress_total: chunk_ids.len() as u64,
            created_at: Utc::now(),
        };

        let mut state = self.inner.lock();
        for chunk_id in chunk_ids {
            state.tasks.push(QueueTask {
                id: Uuid::new_v4(),
                chunk_id: *chunk_id,
                job_id: job.id,
                user_id,
                status: TaskStatus::Pending,
                attempts: 0,
                max_attempts: self.max_attempts,
                last_error: None,
                claimed_by: None,
                claimed_at: None,
            });
        }
        state.jobs.push(job.clone());
        self.persist(&state)?;

        Ok(job)
    }

    /// Atomically claim up to `batch_size` tasks for a worker.
    ///
    /// Pending tasks are claimable, and so are processing tasks whose claim
    /// lease has expired (the worker that held them is presumed dead). A
    /// stale task that has already used its retry budget is failed here
    /// instead of being handed out again. `batch_size == 0` is a valid
    /// health-check no-op.
    pub fn claim_tasks(
        &self,
        worker_id: &str,
        batch_size: usize,
        job_id: Option<Uuid>,
    ) -> Result<Vec<QueueTask>, AppError> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let lease_cutoff = now - self.lease;
        let mut claimed = Vec::new();
        let mut finalize_jobs = Vec::new();

        let mut state = self.inner.lock();
        for task in state.tasks.iter_mut() {
            if claimed.len() >= batch_size {
                break;
            }
            if let Some(scope) = job_id {
                if task.job_id != scope {
                    continue;
                }
            }

            let stale = task.status == TaskStatus::Processing
                && task.claimed_at.is_some_and(|at| at < lease_cutoff);
            let claimable = task.status == TaskStatus::Pending || stale;
            if !claimable {
                continue;
            }

            if stale {
                tracing::warn!(
                    "Reclaiming stale task {} (claimed by {:?} at {:?})",
                    task.id,
                    task.claimed_by,
                    task.claimed_at
                );
            }

            if task.attempts >= task.max_attempts {
                // Only reachable via a stale claim that already exhausted
                // its budget: retire it rather than looping forever.
                task.status = TaskStatus::Failed;
                task.last_error
                    .get_or_insert_with(|| "claim lease expired".to_string());
                task.claimed_by = None;
                task.claimed_at = None;
                finalize_jobs.push(task.job_id);
                continue;
            }

            task.status = TaskStatus::Processing;
            task.claimed_by = Some(worker_id.to_string());
            task.claimed_at = Some(now);
            task.attempts += 1;
            claimed.push(task.clone());
        }

        let mutated = !claimed.is_empty() || !finalize_jobs.is_empty();
        for job_id in finalize_jobs {
            Self::record_failure(&mut state, job_id);
        }

        if mutated {
            self.persist(&state)?;
        }

        Ok(claimed)
    }

    /// Report the outcome of a claimed task.
    ///
    /// On success the owning job's counters advance. On failure the task
    /// returns to pending while retry budget remains, and becomes
    /// permanently failed once attempts reach max_attempts. Terminal tasks
    /// are left untouched, so a double completion after a lease reclaim
    /// cannot advance a job twice.
    pub fn complete_task(
        &self,
        task_id: Uuid,
        success: bool,
        chunks_created: u64,
        error: Option<String>,
    ) -> Result<(), AppError> {
        let mut state = self.inner.lock();

        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| AppError::not_found(format!("Task {task_id} not found")))?;

        if task.status.is_terminal() {
            tracing::warn!(
                "Ignoring completion for terminal task {task_id} (status {:?})",
                task.status
            );
            return Ok(());
        }

        let job_id = task.job_id;

        if success {
            task.status = TaskStatus::Completed;
            task.claimed_at = None;

            let job = Self::job_mut(&mut state, job_id)?;
            job.queue_completed += 1;
            job.progress_current += 1;
            job.chunks_created += chunks_created;
            Self::finalize_if_done(job);
        } else if task.attempts < task.max_attempts {
            // Retry budget remains: back to pending for the next claim.
            task.status = TaskStatus::Pending;
            task.last_error = error;
            task.claimed_by = None;
            task.claimed_at = None;
        } else {
            task.status = TaskStatus::Failed;
            task.last_error = error;
            task.claimed_by = None;
            task.claimed_at = None;
            Self::record_failure(&mut state, job_id);
        }

        self.persist(&state)?;
        Ok(())
    }

    /// Return a claimed task to pending without recording a failure, for
    /// workers that ran out of budget before starting it. The claim's
    /// attempt increment is undone: the attempt never ran.
    pub fn release_task(&self, task_id: Uuid) -> Result<(), AppError> {
        let mut state = self.inner.lock();

        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| AppError::not_found(format!("Task {task_id} not found")))?;

        if task.status != TaskStatus::Processing {
            return Ok(());
        }

        task.status = TaskStatus::Pending;
        task.claimed_by = None;
        task.claimed_at = None;
        task.attempts = task.attempts.saturating_sub(1);

        self.persist(&state)?;
        Ok(())
    }

    /// Re-drive a job's permanently failed tasks.
    ///
    /// Each Failed task returns to Pending with a fresh retry budget; the
    /// last_error is kept as history. The job's failure counters roll back
    /// by the same amount and the job reopens to Running, so progress
    /// conservation holds across the retry. Returns how many tasks were
    /// requeued; zero is not an error.
    pub fn requeue_failed(&self, job_id: Uuid) -> Result<usize, AppError> {
        let mut state = self.inner.lock();

        if !state.jobs.iter().any(|j| j.id == job_id) {
            return Err(AppError::not_found(format!("Job {job_id} not found")));
        }

        let mut requeued = 0u64;
        for task in state
            .tasks
            .iter_mut()
            .filter(|t| t.job_id == job_id && t.status == TaskStatus::Failed)
        {
            task.status = TaskStatus::Pending;
            task.attempts = 0;
            task.claimed_by = None;
            task.claimed_at = None;
            requeued += 1;
        }

        if requeued > 0 {
            let job = Self::job_mut(&mut state, job_id)?;
            job.queue_failed -= requeued;
            job.progress_current -= requeued;
            job.status = JobState::Running;
            tracing::info!("Requeued {requeued} failed tasks for job {job_id}");
            self.persist(&state)?;
        }

        Ok(requeued as usize)
    }

    /// Read-only job snapshot.
    pub fn job(&self, job_id: Uuid) -> Option<Job> {
        self.inner.lock().jobs.iter().find(|j| j.id == job_id).cloned()
    }

    /// Number of tasks a claim could currently hand out, optionally scoped
    /// to one job. Used by workers to decide whether to keep looping.
    pub fn claimable_count(&self, job_id: Option<Uuid>) -> usize {
        let lease_cutoff = Utc::now() - self.lease;
        let state = self.inner.lock();
        state
            .tasks
            .iter()
            .filter(|t| job_id.is_none_or(|scope| t.job_id == scope))
            .filter(|t| {
                t.status == TaskStatus::Pending
                    || (t.status == TaskStatus::Processing
                        && t.claimed_at.is_some_and(|at| at < lease_cutoff))
            })
            .count()
    }

    fn job_mut(state: &mut QueueState, job_id: Uuid) -> Result<&mut Job, AppError> {
        state
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| AppError::not_found(format!("Job {job_id} not found")))
    }

    fn record_failure(state: &mut QueueState, job_id: Uuid) {
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == job_id) {
            job.queue_failed += 1;
            job.progress_current += 1;
            Self::finalize_if_done(job);
        }
    }

    fn finalize_if_done(job: &mut Job) {
        if job.is_done() && job.status == JobState::Running {
            job.status = if job.queue_failed > 0 {
                JobState::CompletedWithErrors
            } else {
                JobState::Completed
            };
            tracing::info!(
                "Job {} finished: {} completed, {} failed, {} chunks",
                job.id,
                job.queue_completed,
                job.queue_failed,
                job.chunks_created
            );
        }
    }

    /// Atomic write via temp file + rename.
    fn persist(&self, state: &QueueState) -> Result<(), AppError> {
        let data = serde_json::to_string(state).map_err(anyhow::Error::from)?;
        let tmp_path = self.persist_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &data)
            .and_then(|_| std::fs::rename(&tmp_path, &self.persist_path))
            .context("Failed to persist queue state")?;
        Ok(())
    }
}
