//! Request/response bodies for the dashboard API.

use serde::{Deserialize, Serialize};
use taskbelt_core::domain::timestamp::to_rfc3339;
use taskbelt_core::domain::Job;

/// POST /api/enqueue - same shape as the CLI's enqueue JSON.
#[derive(Debug, Deserialize)]
pub struct EnqueueBody {
    pub id: String,
    pub command: String,
    pub priority: Option<i64>,
    pub max_retries: Option<i64>,
    /// ISO-8601 UTC; naive timestamps are taken as UTC.
    pub run_at: Option<String>,
}

/// A job as the dashboard renders it: instants in RFC 3339.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: String,
    pub command: String,
    pub state: String,
    pub attempts: i64,
    pub max_retries: i64,
    pub priority: i64,
    pub run_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub error_message: Option<String>,
    pub last_executed_at: Option<String>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            command: job.command,
            state: job.state.to_string(),
            attempts: job.attempts,
            max_retries: job.max_retries,
            priority: job.priority,
            run_at: job.run_at.map(to_rfc3339),
            created_at: to_rfc3339(job.created_at),
            updated_at: to_rfc3339(job.updated_at),
            error_message: job.error_message,
            last_executed_at: job.last_executed_at.map(to_rfc3339),
        }
    }
}
