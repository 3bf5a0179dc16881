// Shell command runner.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use taskbelt_core::port::{CommandRunner, RunOutcome, TimeProvider};
use tokio::process::Command;
use tracing::{info, warn};

/// Runs job commands via `sh -c` in a fresh child process.
///
/// The child gets its own session (`setsid`), so on timeout the whole
/// process group can be killed, not just the shell.
pub struct ShellRunner {
    time: Arc<dyn TimeProvider>,
}

impl ShellRunner {
    pub fn new(time: Arc<dyn TimeProvider>) -> Self {
        Self { time }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, timeout: Duration) -> RunOutcome {
        let started = self.time.now_millis();

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| nix::unistd::setsid().map(|_| ()).map_err(std::io::Error::from));
        }

        info!(command = %command, timeout_secs = timeout.as_secs_f64(), "spawning job command");

        let child = match cmd.spawn() {
            Ok(child) => child,
            // Failure to spawn is an unsuccessful outcome, never a panic.
            Err(e) => return RunOutcome::failure(format!("failed to spawn: {e}"), 0),
        };
        let pid = child.id();

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let elapsed = self.time.now_millis() - started;
                if output.status.success() {
                    RunOutcome::success(elapsed)
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    let error = if stderr.is_empty() {
                        describe_exit(&output.status)
                    } else {
                        stderr
                    };
                    RunOutcome::failure(error, elapsed)
                }
            }
            Ok(Err(e)) => {
                let elapsed = self.time.now_millis() - started;
                RunOutcome::failure(format!("io error waiting for command: {e}"), elapsed)
            }
            Err(_) => {
                let elapsed = self.time.now_millis() - started;
                kill_process_group(pid);
                RunOutcome::failure(
                    format!("Command timed out after {}s", format_secs(timeout)),
                    elapsed,
                )
            }
        }
    }
}

fn describe_exit(status: &std::process::ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn format_secs(timeout: Duration) -> String {
    if timeout.subsec_nanos() == 0 {
        timeout.as_secs().to_string()
    } else {
        format!("{}", timeout.as_secs_f64())
    }
}

/// SIGKILL the child's whole process group. The child is its group
/// leader thanks to setsid, so its own spawned processes die with it.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            warn!(pid, error = %e, "failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {
    // kill_on_drop reaps the direct child when the wait future is dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskbelt_core::port::time_provider::SystemTimeProvider;

    fn runner() -> ShellRunner {
        ShellRunner::new(Arc::new(SystemTimeProvider))
    }

    #[tokio::test]
    async fn test_zero_exit_is_success() {
        let outcome = runner().run("true", Duration::from_secs(5)).await;
        assert!(outcome.success);
        assert!(outcome.error.is_empty());
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_code_when_stderr_empty() {
        let outcome = runner().run("exit 3", Duration::from_secs(5)).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error, "exit code 3");
    }

    #[tokio::test]
    async fn test_stderr_becomes_the_error() {
        let outcome = runner()
            .run("echo boom >&2; exit 1", Duration::from_secs(5))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error, "boom");
    }

    #[tokio::test]
    async fn test_missing_command_fails() {
        let outcome = runner()
            .run("definitely-not-a-command-xyz", Duration::from_secs(5))
            .await;
        assert!(!outcome.success);
        assert!(!outcome.error.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_kills_and_reports() {
        let start = std::time::Instant::now();
        let outcome = runner().run("sleep 30", Duration::from_millis(200)).await;
        assert!(!outcome.success);
        assert!(outcome.error.contains("timed out"), "got: {}", outcome.error);
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "timeout must not wait for the command"
        );
    }

    #[tokio::test]
    async fn test_duration_is_measured() {
        let outcome = runner().run("sleep 0.1", Duration::from_secs(5)).await;
        assert!(outcome.success);
        assert!(outcome.duration_ms >= 50, "got {}ms", outcome.duration_ms);
    }
}
