// Worker constants (no magic values in the loop)
use std::time::Duration;

/// Sleep after an unexpected worker error before the loop resumes (1s)
pub const ERROR_RECOVERY_SLEEP: Duration = Duration::from_secs(1);

/// How long the pool waits for workers to return voluntarily after a
/// shutdown signal before force-terminating them (30s)
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// How often a transition record is retried before the worker gives up
pub const TRANSITION_RETRY_ATTEMPTS: u32 = 5;

/// Base delay between transition record retries (doubles each attempt)
pub const TRANSITION_RETRY_BASE: Duration = Duration::from_millis(100);
