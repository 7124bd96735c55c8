// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Events produced by a running agent process, surfaced to the session
/// manager as they occur.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A line of stdout that parsed as JSON.
    Line(Value),
    /// A line of stdout that did not parse as JSON, kept for diagnostics.
    MalformedLine(String),
    /// A line written to stderr, forwarded for logging rather than parsing.
    Stderr(String),
    /// The process exited; `code` is `None` if it was killed by a signal.
    Exited { code: Option<i32> },
}

#[derive(Debug)]
pub enum AgentProcessError {
    Spawn(std::io::Error),
    NoPid,
    StdinClosed,
    Write(std::io::Error),
    Signal(nix::Error),
}

impl std::fmt::Display for AgentProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "failed to spawn agent process: {e}"),
            Self::NoPid => write!(f, "agent process exited before its pid could be read"),
            Self::StdinClosed => write!(f, "agent stdin is not writable"),
            Self::Write(e) => write!(f, "failed to write to agent stdin: {e}"),
            Self::Signal(e) => write!(f, "failed to signal agent process: {e}"),
        }
    }
}

impl std::error::Error for AgentProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(e) => Some(e),
            Self::NoPid | Self::StdinClosed => None,
            Self::Write(e) => Some(e),
            Self::Signal(e) => Some(e),
        }
    }
}

/// A live handle to a spawned agent subprocess.
///
/// Stdout is line-buffered and each line is attempted as JSON; stderr lines
/// are forwarded as-is for logging. Both are fanned into a single event
/// channel so the session manager only has to poll one stream per session.
pub struct AgentHandle {
    child: Child,
    pid: Pid,
    events: mpsc::Receiver<AgentEvent>,
}

impl AgentHandle {
    /// Spawn `bin` with `args` in `cwd`, wiring stdin/stdout/stderr as pipes.
    pub async fn spawn(
        bin: &PathBuf,
        args: &[String],
        cwd: &PathBuf,
    ) -> Result<Self, AgentProcessError> {
        let mut child = Command::new(bin)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(AgentProcessError::Spawn)?;

        let pid = Pid::from_raw(child.id().ok_or(AgentProcessError::NoPid)? as i32);

        let stdout = child.stdout.take().ok_or(AgentProcessError::NoPid)?;
        let stderr = child.stderr.take().ok_or(AgentProcessError::NoPid)?;

        let (tx, rx) = mpsc::channel(256);

        let stdout_tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let event = match serde_json::from_str::<Value>(&line) {
                    Ok(value) => AgentEvent::Line(value),
                    Err(_) => AgentEvent::MalformedLine(line),
                };
                if stdout_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        let stderr_tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if stderr_tx.send(AgentEvent::Stderr(line)).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self { child, pid, events: rx })
    }

    /// Receive the next event from the process, or `None` once both stdout
    /// and stderr readers have finished and all handles have been dropped.
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        self.events.recv().await
    }

    /// Write `line` to the process's stdin followed by a newline.
    pub async fn send_line(&mut self, line: &str) -> Result<(), AgentProcessError> {
        let stdin = self.child.stdin.as_mut().ok_or(AgentProcessError::StdinClosed)?;
        stdin.write_all(line.as_bytes()).await.map_err(AgentProcessError::Write)?;
        stdin.write_all(b"\n").await.map_err(AgentProcessError::Write)?;
        Ok(())
    }

    /// Whether the process is still alive, checked via a zero-signal probe.
    pub fn is_alive(&self) -> bool {
        signal::kill(self.pid, None).is_ok()
    }

    /// Wait for exit, returning its status code if available.
    pub async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    /// Request graceful termination with `SIGTERM`, then escalate to
    /// `SIGKILL` if the process has not exited within `grace`.
    pub async fn shutdown(&mut self, grace: Duration) -> Result<(), AgentProcessError> {
        if !self.is_alive() {
            return Ok(());
        }
        signal::kill(self.pid, Signal::SIGTERM).map_err(AgentProcessError::Signal)?;

        let waited = tokio::time::timeout(grace, self.child.wait()).await;
        if waited.is_err() && self.is_alive() {
            signal::kill(self.pid, Signal::SIGKILL).map_err(AgentProcessError::Signal)?;
            let _ = self.child.wait().await;
        }
        Ok(())
    }

    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
