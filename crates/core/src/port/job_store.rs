// Job Store Port (Interface)

use crate::domain::{Job, JobState, MetricsSummary, StateCounts, WorkerHealth};
use crate::error::Result;
use async_trait::async_trait;

/// Durable storage for jobs, the metrics log and worker heartbeats.
///
/// Every mutating operation is a single transaction that also appends
/// the metric event(s) recording the transition. Implementations must
/// guarantee that `claim` never hands the same job to two concurrent
/// callers.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job and record `enqueued`.
    ///
    /// Fails with `Validation` if the id is already taken.
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Atomically claim the next eligible pending job.
    ///
    /// Eligible means `state = pending` and `run_at` absent or due.
    /// Ordering is `priority DESC, created_at ASC` with insertion-order
    /// tie-break. On a hit the row moves to `processing`,
    /// `last_executed_at`/`updated_at` are stamped and `started` is
    /// recorded, all in one commit.
    async fn claim(&self) -> Result<Option<Job>>;

    /// processing -> completed; counts the finished attempt and records
    /// `completed` with its duration.
    async fn mark_completed(&self, id: &str, duration_ms: i64) -> Result<()>;

    /// processing -> pending for retry, storing the new attempt count and
    /// the failure reason; records `failed`.
    async fn mark_pending(
        &self,
        id: &str,
        attempts: i64,
        error: &str,
        duration_ms: Option<i64>,
    ) -> Result<()>;

    /// processing -> dead (DLQ); records `failed` then `dlq`.
    async fn mark_dead(
        &self,
        id: &str,
        attempts: i64,
        error: &str,
        duration_ms: Option<i64>,
    ) -> Result<()>;

    /// dead -> pending with attempts reset and error cleared; records
    /// `enqueued`. Priority and max_retries are preserved.
    async fn retry_dead(&self, id: &str) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>>;

    /// Snapshot of jobs, newest first, optionally filtered by state.
    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>>;

    /// Job counts grouped by state.
    async fn counts(&self) -> Result<StateCounts>;

    /// Event totals, mean completed duration and the last `recent` events.
    async fn metrics_summary(&self, recent: i64) -> Result<MetricsSummary>;

    async fn upsert_worker_health(&self, health: &WorkerHealth) -> Result<()>;

    async fn list_worker_health(&self) -> Result<Vec<WorkerHealth>>;

    /// Drop stale heartbeat rows; called when a pool starts.
    async fn clear_worker_health(&self) -> Result<()>;
}
