// Job entity and state machine.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Job ID (caller-supplied, unique)
pub type JobId = String;

pub const PRIORITY_MIN: i64 = 1;
pub const PRIORITY_MAX: i64 = 10;
pub const PRIORITY_DEFAULT: i64 = 5;

/// Persisted job state.
///
/// `Completed` and `Dead` are terminal. `Failed` never survives a commit:
/// a failed attempt lands back in `Pending` (retry) or in `Dead` (DLQ).
/// It exists so that state counts and the wire format cover the full
/// vocabulary the event log uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Dead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Dead)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "dead" => Ok(JobState::Dead),
            other => Err(format!("unknown job state: {other}")),
        }
    }
}

/// A background job: an opaque shell command plus its queue bookkeeping.
///
/// Instants are UTC epoch milliseconds. `attempts` counts finished
/// execution attempts; `run_at = None` means eligible immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub state: JobState,
    pub attempts: i64,
    pub max_retries: i64,
    pub priority: i64,
    pub run_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub error_message: Option<String>,
    pub last_executed_at: Option<i64>,
}

impl Job {
    /// Create a pending job with the given timestamp.
    ///
    /// Timestamps are injected (never read from the system clock here) so
    /// tests stay deterministic.
    pub fn new(
        id: impl Into<String>,
        command: impl Into<String>,
        max_retries: i64,
        priority: i64,
        run_at: Option<i64>,
        now_millis: i64,
    ) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            state: JobState::Pending,
            attempts: 0,
            max_retries,
            priority,
            run_at,
            created_at: now_millis,
            updated_at: now_millis,
            error_message: None,
            last_executed_at: None,
        }
    }

    /// Whether another execution attempt is allowed after a failure.
    pub fn should_retry(&self) -> bool {
        self.attempts < self.max_retries
    }

    /// Exponential backoff delay before the next attempt: `base ^ attempts`
    /// seconds. No jitter; the single-node queue has no thundering herd.
    pub fn backoff_delay(&self, base: f64) -> Duration {
        let secs = base.powi(self.attempts as i32);
        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        }
    }

    /// Whether a scheduled job is eligible at `now_millis`.
    pub fn is_ready(&self, now_millis: i64) -> bool {
        match self.run_at {
            None => true,
            Some(at) => at <= now_millis,
        }
    }
}
