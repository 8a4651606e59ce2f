//! Worker process handle.
//!
//! A [`WorkerProcess`] owns one child process and its stdin/stdout pipes.
//! The child is killed when the handle is dropped, so a slot that loses its
//! handle never leaks a process.

// ============================================================================
// Imports
// ============================================================================

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

use crate::config::WorkerCommand;
use crate::error::{Error, Result};
use crate::identifiers::WorkerId;
use crate::protocol::{WorkerReply, WorkerRequest};
use crate::solver::SolveOutcome;

// ============================================================================
// WorkerProcess
// ============================================================================

/// A running worker process.
pub struct WorkerProcess {
    worker_id: WorkerId,
    /// `None` once killed.
    child: Option<Child>,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    pid: u32,
    /// Reused read buffer.
    line: String,
}

impl std::fmt::Debug for WorkerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerProcess")
            .field("worker_id", &self.worker_id)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl WorkerProcess {
    /// Launches a worker process.
    ///
    /// stdin and stdout are piped for the protocol; stderr is inherited so
    /// the worker's logs reach the server's log stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerSpawn`] if the process cannot be started.
    pub fn spawn(worker_id: WorkerId, command: &WorkerCommand) -> Result<Self> {
        let mut cmd = Command::new(command.program());
        cmd.args(command.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::worker_spawn(format!("{}: {e}", command.program().display()))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::worker_spawn("worker stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::worker_spawn("worker stdout was not captured"))?;
        let pid = child.id().unwrap_or(0);

        debug!(%worker_id, pid, "Worker process spawned");

        Ok(Self {
            worker_id,
            child: Some(child),
            stdin,
            stdout: BufReader::new(stdout),
            pid,
            line: String::new(),
        })
    }

    /// Sends one request and waits for its reply.
    ///
    /// Not cancel-safe: if the future is dropped mid-exchange the process
    /// must be killed, since a late reply would desynchronize the pipe.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerExited`] if the pipes close (process died)
    /// - [`Error::WorkerProtocol`] if the reply is unreadable or mismatched
    pub async fn solve(&mut self, request: &WorkerRequest) -> Result<SolveOutcome> {
        let line = request.to_line()?;

        if let Err(e) = self.write(line.as_bytes()).await {
            debug!(worker_id = %self.worker_id, error = %e, "Worker stdin closed");
            return Err(Error::worker_exited(self.worker_id));
        }

        self.line.clear();
        match self.stdout.read_line(&mut self.line).await {
            Ok(0) => return Err(Error::worker_exited(self.worker_id)),
            Ok(_) => {}
            Err(e) => {
                debug!(worker_id = %self.worker_id, error = %e, "Worker stdout failed");
                return Err(Error::worker_exited(self.worker_id));
            }
        }

        WorkerReply::parse_for(&self.line, request.id).map(|reply| reply.outcome)
    }

    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stdin.write_all(bytes).await?;
        self.stdin.flush().await
    }

    /// Returns `true` if the process has already exited.
    pub fn has_exited(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => !matches!(child.try_wait(), Ok(None)),
            None => true,
        }
    }

    /// Kills the process and waits for it to exit.
    pub async fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            debug!(worker_id = %self.worker_id, pid = self.pid, "Killing worker process");
            if let Err(e) = child.kill().await {
                debug!(pid = self.pid, error = %e, "Failed to kill worker process");
            }
            info!(worker_id = %self.worker_id, pid = self.pid, "Worker process terminated");
        }
    }

    /// Returns the OS process ID.
    #[inline]
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns the slot this process serves.
    #[inline]
    #[must_use]
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take()
            && let Err(e) = child.start_kill()
        {
            debug!(pid = self.pid, error = %e, "Failed to send kill signal in Drop");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use crate::identifiers::JobId;

    /// Replies `invalid` to every request, echoing its id.
    const ECHO_INVALID: &str = r#"while IFS= read -r line; do id=$(echo "$line" | sed 's/^{"id":\([0-9]*\).*/\1/'); printf '{"id":%s,"outcome":{"status":"invalid","reason":"scripted"}}\n' "$id"; done"#;

    fn sh(script: &str) -> WorkerCommand {
        WorkerCommand::new("/bin/sh").arg("-c").arg(script)
    }

    fn request(id: u64) -> WorkerRequest {
        WorkerRequest {
            id: JobId::from_u64(id),
            scramble: "R U".to_string(),
            max_depth: 20,
        }
    }

    #[tokio::test]
    async fn test_exchange_with_scripted_worker() {
        let mut worker = WorkerProcess::spawn(WorkerId::new(0), &sh(ECHO_INVALID)).unwrap();
        assert!(worker.pid() > 0);

        for id in 1..=3 {
            let outcome = worker.solve(&request(id)).await.unwrap();
            assert!(outcome.is_invalid());
        }

        worker.kill().await;
        assert!(worker.has_exited());
    }

    #[tokio::test]
    async fn test_exit_mid_item_is_reported() {
        let mut worker = WorkerProcess::spawn(WorkerId::new(1), &sh("read -r line; exit 3")).unwrap();
        let err = worker.solve(&request(1)).await.unwrap_err();
        assert!(matches!(err, Error::WorkerExited { .. }));
    }

    #[tokio::test]
    async fn test_garbage_reply_is_protocol_error() {
        let mut worker =
            WorkerProcess::spawn(WorkerId::new(2), &sh("read -r line; echo oops; sleep 5")).unwrap();
        let err = worker.solve(&request(1)).await.unwrap_err();
        assert!(matches!(err, Error::WorkerProtocol { .. }));
    }

    #[test]
    fn test_spawn_missing_program() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _guard = runtime.enter();

        let err = WorkerProcess::spawn(
            WorkerId::new(0),
            &WorkerCommand::new("/nonexistent/rubiks-worker"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::WorkerSpawn { .. }));
    }
}
