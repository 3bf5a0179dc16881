// Command Runner Port
// Abstraction over running a job's shell command in a child process.

use async_trait::async_trait;
use std::time::Duration;

/// Outcome of one execution attempt.
///
/// Execution never raises: a spawn failure, a non-zero exit and a
/// timeout are all just unsuccessful outcomes. `error` holds the
/// trimmed stderr (or a synthesized reason when stderr is empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: bool,
    pub error: String,
    pub duration_ms: i64,
}

impl RunOutcome {
    pub fn success(duration_ms: i64) -> Self {
        Self {
            success: true,
            error: String::new(),
            duration_ms,
        }
    }

    pub fn failure(error: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            success: false,
            error: error.into(),
            duration_ms,
        }
    }
}

/// Runs a shell command with a wall-clock timeout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Execute `command` in a fresh subprocess, waiting at most `timeout`.
    /// On timeout the whole subprocess tree is terminated before this
    /// returns.
    async fn run(&self, command: &str, timeout: Duration) -> RunOutcome;
}

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scriptable runner for worker and scenario tests.
    ///
    /// Plays back the queued outcomes in order, then repeats the default
    /// outcome. Records every command it was asked to run.
    pub struct MockRunner {
        script: Mutex<VecDeque<RunOutcome>>,
        default: RunOutcome,
        delay: Option<Duration>,
        commands: Mutex<Vec<String>>,
    }

    impl MockRunner {
        pub fn always_succeeding() -> Self {
            Self::new(RunOutcome::success(1))
        }

        pub fn always_failing(error: impl Into<String>) -> Self {
            Self::new(RunOutcome::failure(error, 1))
        }

        /// Fail `failures` times with `error`, then succeed forever.
        pub fn failing_then_succeeding(failures: usize, error: impl Into<String>) -> Self {
            let runner = Self::new(RunOutcome::success(1));
            let error = error.into();
            let mut script = runner.script.lock().unwrap();
            for _ in 0..failures {
                script.push_back(RunOutcome::failure(error.clone(), 1));
            }
            drop(script);
            runner
        }

        fn new(default: RunOutcome) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                default,
                delay: None,
                commands: Mutex::new(Vec::new()),
            }
        }

        /// Make every run take `delay` of real time (stress tests).
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn call_count(&self) -> usize {
            self.commands.lock().unwrap().len()
        }

        pub fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for MockRunner {
        async fn run(&self, command: &str, _timeout: Duration) -> RunOutcome {
            self.commands.lock().unwrap().push(command.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.default.clone())
        }
    }
}
