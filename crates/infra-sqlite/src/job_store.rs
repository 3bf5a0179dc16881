// SQLite JobStore implementation.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use taskbelt_core::domain::{
    EventType, Job, JobState, MetricEvent, MetricsSummary, StateCounts, WorkerHealth,
};
use taskbelt_core::error::{QueueError, Result};
use taskbelt_core::port::{JobStore, TimeProvider};

/// Durable job store over a single SQLite file.
///
/// Every transition commits the row update together with its metric
/// event(s); a reader never observes a transition without its event.
pub struct SqliteJobStore {
    pool: SqlitePool,
    time: Arc<dyn TimeProvider>,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool, time: Arc<dyn TimeProvider>) -> Self {
        Self { pool, time }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, command, state, attempts, max_retries, priority, run_at,
                              created_at, updated_at, error_message, last_executed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.command)
        .bind(job.state.as_str())
        .bind(job.attempts)
        .bind(job.max_retries)
        .bind(job.priority)
        .bind(job.run_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(&job.error_message)
        .bind(job.last_executed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                QueueError::Validation(format!("job '{}' already exists", job.id))
            } else {
                map_sqlx_error(e)
            }
        })?;

        record_event(
            &mut tx,
            &job.id,
            EventType::Enqueued,
            self.time.now_millis(),
            None,
            None,
        )
        .await?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn claim(&self) -> Result<Option<Job>> {
        let now = self.time.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // The UPDATE is the first write of the transaction, so SQLite
        // takes the writer lock before the inner SELECT decides the
        // winner: two concurrent claims can never pick the same row.
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET state = 'processing', last_executed_at = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE state = 'pending'
                  AND (run_at IS NULL OR run_at <= ?)
                ORDER BY priority DESC, created_at ASC, rowid ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => {
                let job = row.into_job()?;
                record_event(&mut tx, &job.id, EventType::Started, now, None, None).await?;
                tx.commit().await.map_err(map_sqlx_error)?;
                Ok(Some(job))
            }
            None => {
                tx.rollback().await.map_err(map_sqlx_error)?;
                Ok(None)
            }
        }
    }

    async fn mark_completed(&self, id: &str, duration_ms: i64) -> Result<()> {
        let now = self.time.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // attempts counts finished execution attempts, so the successful
        // one is counted here too.
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'completed', attempts = attempts + 1, updated_at = ?
            WHERE id = ? AND state = 'processing'
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(diagnose_failed_update(&mut tx, id, "completed").await);
        }

        record_event(&mut tx, id, EventType::Completed, now, Some(duration_ms), None).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn mark_pending(
        &self,
        id: &str,
        attempts: i64,
        error: &str,
        duration_ms: Option<i64>,
    ) -> Result<()> {
        let now = self.time.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending', attempts = ?, error_message = ?, updated_at = ?
            WHERE id = ? AND state = 'processing' AND ? <= max_retries
            "#,
        )
        .bind(attempts)
        .bind(error)
        .bind(now)
        .bind(id)
        .bind(attempts)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            let err = diagnose_failed_update(&mut tx, id, "pending").await;
            // A processing row that refused the update hit the attempt cap.
            if let QueueError::InvalidTransition { from, .. } = &err {
                if from == "processing" {
                    return Err(QueueError::InvalidTransition {
                        from: from.clone(),
                        to: format!("pending with attempts {attempts} exceeding max_retries"),
                    });
                }
            }
            return Err(err);
        }

        record_event(&mut tx, id, EventType::Failed, now, duration_ms, Some(error)).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn mark_dead(
        &self,
        id: &str,
        attempts: i64,
        error: &str,
        duration_ms: Option<i64>,
    ) -> Result<()> {
        let now = self.time.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'dead', attempts = ?, error_message = ?, updated_at = ?
            WHERE id = ? AND state = 'processing'
            "#,
        )
        .bind(attempts)
        .bind(error)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(diagnose_failed_update(&mut tx, id, "dead").await);
        }

        // The final unsuccessful attempt plus the DLQ transition itself.
        record_event(&mut tx, id, EventType::Failed, now, duration_ms, Some(error)).await?;
        record_event(&mut tx, id, EventType::Dlq, now, None, Some(error)).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn retry_dead(&self, id: &str) -> Result<()> {
        let now = self.time.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Priority and max_retries are preserved; only the failure slate
        // is wiped.
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending', attempts = 0, error_message = NULL, updated_at = ?
            WHERE id = ? AND state = 'dead'
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(diagnose_failed_update(&mut tx, id, "pending").await);
        }

        record_event(&mut tx, id, EventType::Enqueued, now, None, None).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = match state {
            Some(state) => {
                sqlx::query_as(
                    "SELECT * FROM jobs WHERE state = ? ORDER BY created_at DESC, rowid DESC",
                )
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as("SELECT * FROM jobs ORDER BY created_at DESC, rowid DESC")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn counts(&self) -> Result<StateCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        let mut counts = StateCounts::default();
        for (state, n) in rows {
            match state.as_str() {
                "pending" => counts.pending = n,
                "processing" => counts.processing = n,
                "completed" => counts.completed = n,
                "failed" => counts.failed = n,
                "dead" => counts.dead = n,
                _ => {}
            }
        }
        Ok(counts)
    }

    async fn metrics_summary(&self, recent: i64) -> Result<MetricsSummary> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT event_type, COUNT(*) FROM job_events GROUP BY event_type")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        let mut summary = MetricsSummary::default();
        for (event_type, n) in rows {
            match event_type.as_str() {
                "enqueued" => summary.counts.enqueued = n,
                "started" => summary.counts.started = n,
                "completed" => summary.counts.completed = n,
                "failed" => summary.counts.failed = n,
                "dlq" => summary.counts.dlq = n,
                _ => {}
            }
        }

        summary.avg_duration_ms = sqlx::query_scalar::<_, Option<f64>>(
            "SELECT AVG(duration_ms) FROM job_events \
             WHERE event_type = 'completed' AND duration_ms IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let events: Vec<EventRow> = sqlx::query_as(
            "SELECT seq, job_id, event_type, timestamp, duration_ms, error_message \
             FROM job_events ORDER BY seq DESC LIMIT ?",
        )
        .bind(recent)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        summary.recent = events
            .into_iter()
            .map(EventRow::into_event)
            .collect::<Result<_>>()?;
        Ok(summary)
    }

    async fn upsert_worker_health(&self, health: &WorkerHealth) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO worker_health (worker_id, pid, last_heartbeat, jobs_processed)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(worker_id) DO UPDATE SET
                pid = excluded.pid,
                last_heartbeat = excluded.last_heartbeat,
                jobs_processed = excluded.jobs_processed
            "#,
        )
        .bind(health.worker_id)
        .bind(health.pid)
        .bind(health.last_heartbeat)
        .bind(health.jobs_processed)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_worker_health(&self) -> Result<Vec<WorkerHealth>> {
        let rows: Vec<(i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT worker_id, pid, last_heartbeat, jobs_processed \
             FROM worker_health ORDER BY worker_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|(worker_id, pid, last_heartbeat, jobs_processed)| WorkerHealth {
                worker_id,
                pid,
                last_heartbeat,
                jobs_processed,
            })
            .collect())
    }

    async fn clear_worker_health(&self) -> Result<()> {
        sqlx::query("DELETE FROM worker_health")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

/// Append one metric event inside the caller's transaction.
async fn record_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    job_id: &str,
    event_type: EventType,
    timestamp: i64,
    duration_ms: Option<i64>,
    error_message: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO job_events (job_id, event_type, timestamp, duration_ms, error_message) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(job_id)
    .bind(event_type.as_str())
    .bind(timestamp)
    .bind(duration_ms)
    .bind(error_message)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

/// A guarded UPDATE touched zero rows: work out which precondition broke.
async fn diagnose_failed_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: &str,
    to: &str,
) -> QueueError {
    let state: std::result::Result<Option<String>, sqlx::Error> =
        sqlx::query_scalar("SELECT state FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await;

    match state {
        Ok(None) => QueueError::NotFound(format!("job '{id}' not found")),
        Ok(Some(from)) => QueueError::InvalidTransition {
            from,
            to: to.to_string(),
        },
        Err(e) => map_sqlx_error(e),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        // SQLITE_CONSTRAINT_PRIMARYKEY / SQLITE_CONSTRAINT_UNIQUE
        .map(|code| code == "1555" || code == "2067")
        .unwrap_or(false)
}

fn map_sqlx_error(err: sqlx::Error) -> QueueError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let code = db_err
                .code()
                .map(|c| c.as_ref().to_string())
                .unwrap_or_default();
            match code.as_str() {
                // https://www.sqlite.org/rescode.html
                "5" => QueueError::Storage(format!(
                    "database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                "13" => QueueError::Storage(format!("database full: {}", db_err.message())),
                _ => QueueError::Storage(format!("database error [{code}]: {}", db_err.message())),
            }
        }
        _ => QueueError::Storage(err.to_string()),
    }
}

/// SQLite row shape for jobs
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    command: String,
    state: String,
    attempts: i64,
    max_retries: i64,
    priority: i64,
    run_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
    error_message: Option<String>,
    last_executed_at: Option<i64>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let state: JobState = self.state.parse().map_err(QueueError::Storage)?;
        Ok(Job {
            id: self.id,
            command: self.command,
            state,
            attempts: self.attempts,
            max_retries: self.max_retries,
            priority: self.priority,
            run_at: self.run_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            error_message: self.error_message,
            last_executed_at: self.last_executed_at,
        })
    }
}

/// SQLite row shape for metric events
#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    seq: i64,
    job_id: String,
    event_type: String,
    timestamp: i64,
    duration_ms: Option<i64>,
    error_message: Option<String>,
}

impl EventRow {
    fn into_event(self) -> Result<MetricEvent> {
        let event_type: EventType = self.event_type.parse().map_err(QueueError::Storage)?;
        Ok(MetricEvent {
            seq: self.seq,
            job_id: self.job_id,
            event_type,
            timestamp: self.timestamp,
            duration_ms: self.duration_ms,
            error_message: self.error_message,
        })
    }
}
