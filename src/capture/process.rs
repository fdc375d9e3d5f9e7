//! Capture process handle
//!
//! Owns one external encoder process for the lifetime of a session
//! track: spawn with piped stdin, the interactive quit request, signal
//! fallback, and the unconditional kill used when nothing else works.

use super::ffmpeg::TrackSpec;
use super::CaptureError;
use crate::recorder::session::TrackKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};

/// Lifecycle of one capture process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Spawned, not yet confirmed by the supervisor
    Starting,
    /// Recording
    Running,
    /// Quit requested, waiting for exit
    Stopping,
    /// Exited after the graceful quit request
    Stopped,
    /// Went down under SIGKILL
    Killed,
}

/// One external encoder bound to one track
///
/// The handle is owned exclusively by the process supervisor; nothing
/// else reads or writes the child.
#[derive(Debug)]
pub struct CaptureProcess {
    track: TrackKind,
    child: Child,
    stdin: Option<ChildStdin>,
    state: ProcessState,
}

impl CaptureProcess {
    /// Launch the track's encoder with stdin piped for the quit request
    pub fn spawn(spec: &TrackSpec) -> Result<Self, CaptureError> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CaptureError::Spawn {
                track: spec.kind,
                source: e,
            })?;

        let stdin = child.stdin.take();
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(spec.kind, stderr));
        }

        tracing::info!(
            track = %spec.kind,
            pid = ?child.id(),
            output = %spec.output.display(),
            "capture process started"
        );

        Ok(Self {
            track: spec.kind,
            child,
            stdin,
            state: ProcessState::Starting,
        })
    }

    pub fn track(&self) -> TrackKind {
        self.track
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Whether the process has not yet reached a terminal state
    pub fn is_live(&self) -> bool {
        !matches!(self.state, ProcessState::Stopped | ProcessState::Killed)
    }

    /// Called by the supervisor once the track is accounted for
    pub fn mark_running(&mut self) {
        if self.state == ProcessState::Starting {
            self.state = ProcessState::Running;
        }
    }

    /// Two-phase stop: quit request, bounded wait, then kill
    ///
    /// Writes `q` to the encoder's stdin; if the pipe is unwritable the
    /// fallback is a termination signal. Either way the process gets
    /// `timeout` to exit on its own before it is killed outright.
    pub async fn stop(&mut self, timeout: Duration) -> ProcessState {
        if !self.is_live() {
            return self.state;
        }
        self.state = ProcessState::Stopping;

        if let Err(e) = self.write_input(b"q").await {
            tracing::debug!(
                track = %self.track,
                "quit request failed ({}), falling back to SIGTERM",
                e
            );
            self.terminate();
        }

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.state = ProcessState::Stopped;
                tracing::info!(track = %self.track, "capture process exited: {}", status);
            }
            Ok(Err(e)) => {
                self.state = ProcessState::Stopped;
                tracing::warn!(track = %self.track, "wait on capture process failed: {}", e);
            }
            Err(_) => {
                tracing::warn!(
                    track = %self.track,
                    "capture process ignored quit for {:?}, force-killing",
                    timeout
                );
                self.force_kill().await;
            }
        }
        self.state
    }

    /// Unconditional kill; idempotent against already-dead processes
    pub async fn force_kill(&mut self) -> ProcessState {
        if !self.is_live() {
            return self.state;
        }

        if let Err(e) = self.child.start_kill() {
            // Raced with the process's own exit
            tracing::debug!(track = %self.track, "kill signal not delivered: {}", e);
        }
        match self.child.wait().await {
            Ok(status) => {
                tracing::info!(track = %self.track, "capture process killed: {}", status)
            }
            Err(e) => tracing::warn!(track = %self.track, "wait after kill failed: {}", e),
        }
        self.state = ProcessState::Killed;
        self.state
    }

    /// Write to the encoder's stdin
    async fn write_input(&mut self, input: &[u8]) -> std::io::Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => {
                stdin.write_all(input).await?;
                stdin.flush().await
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stdin not captured",
            )),
        }
    }

    /// Termination signal, used when the quit request cannot be written
    fn terminate(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
                if ret != 0 {
                    let err = std::io::Error::last_os_error();
                    // ESRCH means the process already exited
                    if err.raw_os_error() != Some(libc::ESRCH) {
                        tracing::warn!(track = %self.track, "SIGTERM failed: {}", err);
                    }
                }
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = self.child.start_kill() {
                tracing::debug!(track = %self.track, "terminate failed: {}", e);
            }
        }
    }
}

async fn drain_stderr(track: TrackKind, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(track = %track, "{}", line);
    }
}
