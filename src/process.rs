//! Single run-with-deadline primitive used by every component that
//! shells out to a PostgreSQL client binary, replacing the ad hoc
//! `Command::output()` calls scattered through the teacher's
//! `sync/logic.rs` and `restore/db_restore.rs` with one place that
//! enforces a timeout and never returns before the child is reaped.

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::errors::SyncError;

pub struct RunOutcome {
    pub stdout: String,
    pub stderr: String,
}

/// Runs `cmd`, killing it if it hasn't exited by `deadline`. Waits on
/// the child directly (rather than `wait_with_output`) so a timeout can
/// `start_kill()` the still-running process and then await its exit
/// status — the function never returns while the child is still alive.
pub async fn run_with_deadline(mut cmd: Command, deadline: Duration) -> Result<RunOutcome, SyncError> {
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let mut child = cmd.spawn()?;
    let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr was piped");

    let status = match tokio::time::timeout(deadline, child.wait()).await {
        Ok(result) => result?,
        Err(_) => {
            child.start_kill()?;
            child.wait().await?;
            return Err(SyncError::ProcessTimeout(deadline));
        }
    };

    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    stdout_pipe.read_to_end(&mut stdout_buf).await?;
    stderr_pipe.read_to_end(&mut stderr_buf).await?;

    let stdout = String::from_utf8_lossy(&stdout_buf).into_owned();
    let stderr = String::from_utf8_lossy(&stderr_buf).into_owned();

    if !status.success() {
        return Err(SyncError::ProcessFailed {
            code: status.code(),
            stderr,
        });
    }

    Ok(RunOutcome { stdout, stderr })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_returns_stdout() {
        let cmd = Command::new("true");
        let out = run_with_deadline(cmd, Duration::from_secs(5)).await;
        assert!(out.is_ok());
    }

    #[tokio::test]
    async fn nonzero_exit_is_process_failed() {
        let cmd = Command::new("false");
        let err = run_with_deadline(cmd, Duration::from_secs(5)).await;
        assert!(matches!(err, Err(SyncError::ProcessFailed { .. })));
    }

    #[tokio::test]
    async fn deadline_exceeded_is_process_timeout_and_child_is_reaped() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = run_with_deadline(cmd, Duration::from_millis(50)).await;
        assert!(matches!(err, Err(SyncError::ProcessTimeout(_))));
    }
}
