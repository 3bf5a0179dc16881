// Metric events and observability value types.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How long a worker may go silent before it is reported dead.
pub const HEARTBEAT_ALIVE_WINDOW_MS: i64 = 60_000;

/// Append-only event vocabulary.
///
/// Every committed state transition writes exactly one event of the
/// matching type; the one exception is the DLQ transition which writes
/// `failed` followed by `dlq` in the same commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Enqueued,
    Started,
    Completed,
    Failed,
    Dlq,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Enqueued => "enqueued",
            EventType::Started => "started",
            EventType::Completed => "completed",
            EventType::Failed => "failed",
            EventType::Dlq => "dlq",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enqueued" => Ok(EventType::Enqueued),
            "started" => Ok(EventType::Started),
            "completed" => Ok(EventType::Completed),
            "failed" => Ok(EventType::Failed),
            "dlq" => Ok(EventType::Dlq),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// One row of the append-only metrics log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvent {
    pub seq: i64,
    pub job_id: String,
    pub event_type: EventType,
    pub timestamp: i64,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
}

/// Job counts grouped by state. States with no jobs report zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub dead: i64,
}

impl StateCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.completed + self.failed + self.dead
    }
}

/// Event totals per type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub enqueued: i64,
    pub started: i64,
    pub completed: i64,
    pub failed: i64,
    pub dlq: i64,
}

/// Aggregate view over the metrics log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub counts: EventCounts,
    /// Mean duration over completed events; None until something completed.
    pub avg_duration_ms: Option<f64>,
    /// Most recent events, newest first.
    pub recent: Vec<MetricEvent>,
}

/// A worker's liveness publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub worker_id: i64,
    pub pid: i64,
    pub last_heartbeat: i64,
    pub jobs_processed: i64,
}

impl WorkerHealth {
    pub fn alive(&self, now_millis: i64) -> bool {
        now_millis - self.last_heartbeat < HEARTBEAT_ALIVE_WINDOW_MS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trip() {
        for raw in ["enqueued", "started", "completed", "failed", "dlq"] {
            let parsed: EventType = raw.parse().unwrap();
            assert_eq!(parsed.as_str(), raw);
        }
        assert!("retried".parse::<EventType>().is_err());
    }

    #[test]
    fn test_worker_alive_window() {
        let health = WorkerHealth {
            worker_id: 0,
            pid: 42,
            last_heartbeat: 100_000,
            jobs_processed: 3,
        };
        assert!(health.alive(100_000));
        assert!(health.alive(100_000 + HEARTBEAT_ALIVE_WINDOW_MS - 1));
        assert!(!health.alive(100_000 + HEARTBEAT_ALIVE_WINDOW_MS));
    }
}
