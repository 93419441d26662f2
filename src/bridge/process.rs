//! Lifecycle of one external agent process.
//!
//! One `AgentProcess` is one run: spawn, pull stdout lines lazily, write
//! tool responses back over stdin, join the stderr drain, dispose. The
//! stderr stream is drained by a background task from the moment of spawn
//! so diagnostic text is never lost to a race with process exit.

use crate::error::RunError;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Everything needed to launch one agent invocation.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    /// Ordered argument list; ends with the prompt flag and prompt text.
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Explicit environment overrides; the inherited environment is kept
    /// and these win on conflict.
    pub env: Vec<(String, String)>,
    /// Piped stdin, kept open for tool responses. False launches the
    /// agent one-shot with stdin closed from the start.
    pub keep_stdin_open: bool,
}

pub struct AgentProcess {
    child: Child,
    pid: Option<u32>,
    stdout: Lines<BufReader<ChildStdout>>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<String>>,
    cancel_rx: watch::Receiver<bool>,
    cancel_closed: bool,
    disposed: bool,
}

impl AgentProcess {
    /// Spawns the agent process. The cancellation receiver is observed at
    /// every read; when it flips to true the pending read resolves to
    /// `RunError::Cancelled` and the caller is expected to `dispose`.
    pub fn spawn(
        spec: &ProcessSpec,
        cancel_rx: watch::Receiver<bool>,
    ) -> Result<Self, RunError> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args).current_dir(&spec.working_dir);
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        command.stdin(if spec.keep_stdin_open {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        command.kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|source| RunError::ProcessStartFailed { source })?;
        let pid = child.id();

        let stdout = child.stdout.take().ok_or_else(|| RunError::ProcessStartFailed {
            source: std::io::Error::other("stdout was not captured"),
        })?;
        let stderr = child.stderr.take();
        let stdin = child.stdin.take();

        let stderr_drain = stderr.map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut buffer = String::new();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !buffer.is_empty() {
                        buffer.push('\n');
                    }
                    buffer.push_str(&line);
                }
                buffer
            })
        });

        Ok(Self {
            child,
            pid,
            stdout: BufReader::new(stdout).lines(),
            stdin,
            stderr_drain,
            cancel_rx,
            cancel_closed: false,
            disposed: false,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Pulls the next non-blank stdout line. Returns `Ok(None)` when the
    /// stream closes. Suspends the caller between lines; never buffers the
    /// full output.
    pub async fn next_line(&mut self) -> Result<Option<String>, RunError> {
        loop {
            if *self.cancel_rx.borrow() {
                return Err(RunError::Cancelled);
            }

            tokio::select! {
                changed = self.cancel_rx.changed(), if !self.cancel_closed => {
                    match changed {
                        Ok(()) if *self.cancel_rx.borrow() => return Err(RunError::Cancelled),
                        Ok(()) => {}
                        // Sender dropped without cancelling: stop watching.
                        Err(_) => self.cancel_closed = true,
                    }
                }
                line = self.stdout.next_line() => {
                    match line? {
                        Some(line) if line.trim().is_empty() => continue,
                        Some(line) => return Ok(Some(line)),
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    /// Writes one line to the process's stdin and flushes immediately.
    pub async fn write_line(&mut self, payload: &str) -> Result<(), RunError> {
        let stdin = self.stdin.as_mut().ok_or(RunError::StdinClosed)?;
        stdin.write_all(payload.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Closes the input stream to signal that no more tool responses will
    /// be sent. Idempotent.
    pub fn close_stdin(&mut self) {
        self.stdin.take();
    }

    /// Blocks until process exit. The stderr drain is joined before
    /// returning so diagnostic text is fully captured; a non-zero exit
    /// carries it in the error.
    pub async fn wait(&mut self) -> Result<String, RunError> {
        let status = self.child.wait().await?;
        let stderr = match self.stderr_drain.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        if status.success() {
            Ok(stderr)
        } else {
            Err(RunError::ProcessFailed {
                code: status.code(),
                stderr,
            })
        }
    }

    /// Force-kills the process group if it has not exited, then reaps it.
    /// Safe to call more than once.
    pub async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if matches!(self.child.try_wait(), Ok(None)) {
            self.kill_tree();
            let _ = self.child.wait().await;
        }
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.await;
        }
    }

    #[cfg(unix)]
    fn kill_tree(&mut self) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        // The process was spawned as its own group leader, so the pid is
        // the pgid and this reaches the whole tree.
        if let Some(pid) = self.pid {
            let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }
        let _ = self.child.start_kill();
    }

    #[cfg(not(unix))]
    fn kill_tree(&mut self) {
        let _ = self.child.start_kill();
    }
}

#[cfg(test)]
#[path = "tests/process_tests.rs"]
mod tests;
