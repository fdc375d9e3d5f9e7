//! Voice activity monitoring
//!
//! Classifies incoming sample blocks against the loudness threshold and
//! turns the raw level stream into discrete voice events, applying the
//! silence grace timer so brief pauses do not end a session.

use super::level::block_level_db;
use super::SampleBlock;
use crate::config::Tuning;
use crate::utils::time::deadline_elapsed;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

/// Discrete events produced by the level monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceEvent {
    /// Level crossed the threshold while no session was active
    Started,
    /// Level dropped below the threshold mid-session; grace timer armed
    SilenceDetected,
    /// Level came back above the threshold inside the grace period
    Resumed,
    /// The grace period elapsed without the voice returning
    SilenceConfirmed,
}

/// Shared view of the monitor's latest classification
///
/// The monitor writes the level and above/below flag per block; the
/// controller flips the session-active flag at session boundaries and
/// reads the classification when deciding whether a rotated segment
/// should continue.
#[derive(Debug, Default)]
pub struct VoiceActivity {
    above_threshold: AtomicBool,
    session_active: AtomicBool,
    level_db: Mutex<f64>,
}

impl VoiceActivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest block's classification
    pub fn is_above_threshold(&self) -> bool {
        self.above_threshold.load(Ordering::SeqCst)
    }

    /// Latest block's loudness in dB
    pub fn level_db(&self) -> f64 {
        *self.level_db.lock()
    }

    /// Whether a recording session currently owns the capture pipeline
    pub fn session_active(&self) -> bool {
        self.session_active.load(Ordering::SeqCst)
    }

    /// Flip the session-active flag; called only by the controller
    pub fn set_session_active(&self, active: bool) {
        self.session_active.store(active, Ordering::SeqCst);
    }

    /// Publish the latest block's level and classification
    pub fn record(&self, level_db: f64, above: bool) {
        *self.level_db.lock() = level_db;
        self.above_threshold.store(above, Ordering::SeqCst);
    }
}

/// Consumes the sample-block stream and emits [`VoiceEvent`]s
///
/// Runs until the block channel closes (audio source stopped) or the
/// event receiver is dropped (controller shut down). Owns the silence
/// grace deadline; cancelling it on resume is a plain `Option::take`.
pub struct LevelMonitor {
    threshold_db: f64,
    grace: Duration,
    blocks: mpsc::Receiver<SampleBlock>,
    events: mpsc::Sender<VoiceEvent>,
    activity: Arc<VoiceActivity>,
    grace_deadline: Option<Instant>,
}

impl LevelMonitor {
    pub fn new(
        tuning: &Tuning,
        blocks: mpsc::Receiver<SampleBlock>,
        events: mpsc::Sender<VoiceEvent>,
        activity: Arc<VoiceActivity>,
    ) -> Self {
        Self {
            threshold_db: tuning.threshold_db,
            grace: tuning.silence_grace,
            blocks,
            events,
            activity,
            grace_deadline: None,
        }
    }

    /// Drive the monitor until its channels close
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                block = self.blocks.recv() => {
                    let Some(block) = block else { break };
                    if let Some(event) = self.observe(&block) {
                        if self.events.send(event).await.is_err() {
                            break;
                        }
                    }
                }
                _ = deadline_elapsed(self.grace_deadline) => {
                    self.grace_deadline = None;
                    tracing::info!("silence held for the full grace period");
                    if self.events.send(VoiceEvent::SilenceConfirmed).await.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("level monitor stopped");
    }

    /// Classify one block, returning the event it triggers (if any)
    fn observe(&mut self, samples: &[i16]) -> Option<VoiceEvent> {
        let level = block_level_db(samples);
        let above = level > self.threshold_db;
        self.activity.record(level, above);
        tracing::trace!(level_db = level, above, "audio block");

        if above {
            if !self.activity.session_active() {
                self.grace_deadline = None;
                Some(VoiceEvent::Started)
            } else if self.grace_deadline.take().is_some() {
                tracing::debug!(level_db = level, "voice resumed inside grace period");
                Some(VoiceEvent::Resumed)
            } else {
                None
            }
        } else if self.activity.session_active() && self.grace_deadline.is_none() {
            self.grace_deadline = Some(Instant::now() + self.grace);
            tracing::debug!(level_db = level, "silence detected, grace timer armed");
            Some(VoiceEvent::SilenceDetected)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn loud() -> SampleBlock {
        vec![2000; 256]
    }

    fn quiet() -> SampleBlock {
        vec![10; 256]
    }

    fn spawn_monitor(
        grace: Duration,
    ) -> (
        mpsc::Sender<SampleBlock>,
        mpsc::Receiver<VoiceEvent>,
        Arc<VoiceActivity>,
    ) {
        let tuning = Tuning {
            silence_grace: grace,
            ..Tuning::default()
        };
        let activity = Arc::new(VoiceActivity::new());
        let (block_tx, block_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(8);
        let monitor = LevelMonitor::new(&tuning, block_rx, event_tx, activity.clone());
        tokio::spawn(monitor.run());
        (block_tx, event_rx, activity)
    }

    async fn next_event(rx: &mut mpsc::Receiver<VoiceEvent>) -> VoiceEvent {
        timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_quiet_blocks_while_idle_emit_nothing() {
        let (block_tx, mut event_rx, _) = spawn_monitor(Duration::from_millis(50));

        for _ in 0..5 {
            block_tx.send(quiet()).await.unwrap();
        }

        let got = timeout(Duration::from_millis(100), event_rx.recv()).await;
        assert!(got.is_err(), "expected no event, got {:?}", got);
    }

    #[tokio::test]
    async fn test_loud_block_while_idle_starts_voice() {
        let (block_tx, mut event_rx, activity) = spawn_monitor(Duration::from_millis(50));

        block_tx.send(loud()).await.unwrap();

        assert_eq!(next_event(&mut event_rx).await, VoiceEvent::Started);
        assert!(activity.is_above_threshold());
    }

    #[tokio::test]
    async fn test_sustained_silence_confirms_after_grace() {
        let (block_tx, mut event_rx, activity) = spawn_monitor(Duration::from_millis(50));
        activity.set_session_active(true);

        block_tx.send(quiet()).await.unwrap();
        assert_eq!(next_event(&mut event_rx).await, VoiceEvent::SilenceDetected);

        assert_eq!(next_event(&mut event_rx).await, VoiceEvent::SilenceConfirmed);
    }

    #[tokio::test]
    async fn test_resume_inside_grace_cancels_pending_stop() {
        let (block_tx, mut event_rx, activity) = spawn_monitor(Duration::from_millis(100));
        activity.set_session_active(true);

        block_tx.send(quiet()).await.unwrap();
        assert_eq!(next_event(&mut event_rx).await, VoiceEvent::SilenceDetected);

        tokio::time::sleep(Duration::from_millis(30)).await;
        block_tx.send(loud()).await.unwrap();
        assert_eq!(next_event(&mut event_rx).await, VoiceEvent::Resumed);

        // Well past the original deadline: the cancelled timer must not fire.
        let got = timeout(Duration::from_millis(200), event_rx.recv()).await;
        assert!(got.is_err(), "expected no event, got {:?}", got);
    }

    #[tokio::test]
    async fn test_loud_block_mid_session_emits_nothing() {
        let (block_tx, mut event_rx, activity) = spawn_monitor(Duration::from_millis(50));
        activity.set_session_active(true);

        block_tx.send(loud()).await.unwrap();

        let got = timeout(Duration::from_millis(100), event_rx.recv()).await;
        assert!(got.is_err(), "expected no event, got {:?}", got);
    }

    #[tokio::test]
    async fn test_monitor_ends_when_source_closes() {
        let tuning = Tuning::default();
        let activity = Arc::new(VoiceActivity::new());
        let (block_tx, block_rx) = mpsc::channel::<SampleBlock>(8);
        let (event_tx, _event_rx) = mpsc::channel(8);
        let monitor = LevelMonitor::new(&tuning, block_rx, event_tx, activity);
        let handle = tokio::spawn(monitor.run());

        drop(block_tx);

        timeout(Duration::from_millis(500), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }
}
