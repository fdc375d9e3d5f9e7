//! Capture process supervision
//!
//! Owns every capture process of the active session and applies the
//! two-phase shutdown protocol across them: concurrent quit requests,
//! per-process force-kill timers, and a barrier that resolves only when
//! every process has reached a terminal state.

use super::ffmpeg::TrackSpec;
use super::process::{CaptureProcess, ProcessState};
use super::CaptureError;
use crate::recorder::session::TrackKind;
use std::time::Duration;
use tokio::task::JoinSet;

/// Supervises the capture processes of the active session
#[derive(Default)]
pub struct ProcessSupervisor {
    procs: Vec<CaptureProcess>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of supervised processes still tracked
    pub fn tracked(&self) -> usize {
        self.procs.len()
    }

    /// Spawn one capture process per track spec
    ///
    /// A track that fails to spawn is reported in the returned list; the
    /// remaining tracks keep recording.
    pub fn start(&mut self, specs: &[TrackSpec]) -> Vec<CaptureError> {
        let mut failures = Vec::new();
        for spec in specs {
            match CaptureProcess::spawn(spec) {
                Ok(mut proc) => {
                    proc.mark_running();
                    self.procs.push(proc);
                }
                Err(e) => failures.push(e),
            }
        }
        tracing::info!(
            "started {} of {} capture tracks",
            self.procs.len(),
            specs.len()
        );
        failures
    }

    /// Graceful fan-out/fan-in stop of every supervised process
    ///
    /// Resolves only once every process is STOPPED or KILLED; a process
    /// that ignores the quit request holds the barrier for at most
    /// `timeout` before it is killed.
    pub async fn stop_all(&mut self, timeout: Duration) -> Vec<(TrackKind, ProcessState)> {
        if self.procs.is_empty() {
            return Vec::new();
        }
        tracing::info!("stopping {} capture processes", self.procs.len());

        let mut stopping = JoinSet::new();
        for mut proc in self.procs.drain(..) {
            stopping.spawn(async move {
                let state = proc.stop(timeout).await;
                (proc.track(), state)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = stopping.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("stop task failed: {}", e),
            }
        }
        tracing::info!("all capture processes reached a terminal state");
        outcomes
    }

    /// Unconditional kill of everything still tracked
    ///
    /// Used only on abnormal shutdown; idempotent, and tolerant of
    /// processes that already exited on their own.
    pub async fn kill_all(&mut self) {
        if self.procs.is_empty() {
            return;
        }
        tracing::warn!("force-killing {} capture processes", self.procs.len());

        let mut killing = JoinSet::new();
        for mut proc in self.procs.drain(..) {
            killing.spawn(async move {
                proc.force_kill().await;
            });
        }
        while killing.join_next().await.is_some() {}
    }
}
