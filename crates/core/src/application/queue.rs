// Queue manager - validating facade over the job store.

use crate::domain::{
    Job, JobState, MetricsSummary, StateCounts, WorkerHealth, PRIORITY_DEFAULT, PRIORITY_MAX,
    PRIORITY_MIN,
};
use crate::error::{QueueError, Result};
use crate::port::{JobStore, TimeProvider};
use std::sync::Arc;

const MAX_ID_LEN: usize = 256;

/// Enqueue input before defaults are applied.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub id: String,
    pub command: String,
    pub priority: Option<i64>,
    pub max_retries: Option<i64>,
    /// Earliest eligibility, UTC epoch millis; absent runs immediately.
    pub run_at: Option<i64>,
}

/// Thin facade over the store: fills in defaults, validates caller
/// input, and delegates. Every state change it triggers is a single
/// commit inside the store, which also appends the matching metric
/// event - nothing else writes events.
pub struct QueueManager {
    store: Arc<dyn JobStore>,
    time: Arc<dyn TimeProvider>,
    default_max_retries: i64,
}

impl QueueManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        time: Arc<dyn TimeProvider>,
        default_max_retries: i64,
    ) -> Self {
        Self {
            store,
            time,
            default_max_retries,
        }
    }

    /// Validate, apply defaults and persist a new pending job.
    pub async fn enqueue(&self, req: EnqueueRequest) -> Result<Job> {
        validate_request(&req)?;

        let priority = req.priority.unwrap_or(PRIORITY_DEFAULT);
        let max_retries = req.max_retries.unwrap_or(self.default_max_retries);

        let job = Job::new(
            req.id,
            req.command,
            max_retries,
            priority,
            req.run_at,
            self.time.now_millis(),
        );
        self.store.insert(&job).await?;
        Ok(job)
    }

    /// Atomically claim the next eligible pending job, if any.
    pub async fn claim(&self) -> Result<Option<Job>> {
        self.store.claim().await
    }

    pub async fn mark_completed(&self, id: &str, duration_ms: i64) -> Result<()> {
        self.store.mark_completed(id, duration_ms).await
    }

    pub async fn mark_pending(
        &self,
        id: &str,
        attempts: i64,
        error: &str,
        duration_ms: Option<i64>,
    ) -> Result<()> {
        self.store.mark_pending(id, attempts, error, duration_ms).await
    }

    pub async fn mark_dead(
        &self,
        id: &str,
        attempts: i64,
        error: &str,
        duration_ms: Option<i64>,
    ) -> Result<()> {
        self.store.mark_dead(id, attempts, error, duration_ms).await
    }

    /// Reset a dead-letter job to pending with a clean slate.
    pub async fn retry_dead(&self, id: &str) -> Result<()> {
        self.store.retry_dead(id).await
    }

    pub async fn job(&self, id: &str) -> Result<Job> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| QueueError::NotFound(format!("job '{id}' not found")))
    }

    pub async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        self.store.list(state).await
    }

    pub async fn stats(&self) -> Result<StateCounts> {
        self.store.counts().await
    }

    pub async fn metrics(&self, recent: i64) -> Result<MetricsSummary> {
        self.store.metrics_summary(recent).await
    }

    pub async fn record_heartbeat(&self, health: &WorkerHealth) -> Result<()> {
        self.store.upsert_worker_health(health).await
    }

    pub async fn worker_health(&self) -> Result<Vec<WorkerHealth>> {
        self.store.list_worker_health().await
    }

    pub async fn clear_worker_health(&self) -> Result<()> {
        self.store.clear_worker_health().await
    }

    pub fn now_millis(&self) -> i64 {
        self.time.now_millis()
    }
}

fn validate_request(req: &EnqueueRequest) -> Result<()> {
    if req.id.trim().is_empty() {
        return Err(QueueError::Validation("job id cannot be empty".to_string()));
    }
    if req.id.len() > MAX_ID_LEN {
        return Err(QueueError::Validation(format!(
            "job id too long (max {MAX_ID_LEN} chars, got {})",
            req.id.len()
        )));
    }
    if req.command.trim().is_empty() {
        return Err(QueueError::Validation("command cannot be empty".to_string()));
    }
    if let Some(priority) = req.priority {
        if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) {
            return Err(QueueError::Validation(format!(
                "priority out of range (must be between {PRIORITY_MIN} and {PRIORITY_MAX}, got {priority})"
            )));
        }
    }
    if let Some(max_retries) = req.max_retries {
        if max_retries < 1 {
            return Err(QueueError::Validation(format!(
                "max_retries must be positive, got {max_retries}"
            )));
        }
    }
    Ok(())
}
