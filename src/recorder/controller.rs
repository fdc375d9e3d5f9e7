//! Recording controller
//!
//! The session state machine at the core of the recorder. Voice events,
//! rotation timer expiry and shutdown requests all funnel into one
//! select loop, so session transitions are serialized and a single
//! session owns the capture pipeline at any time.

use crate::audio::{VoiceActivity, VoiceEvent};
use crate::capture::{ProcessSupervisor, TrackPlanner};
use crate::config::Tuning;
use crate::recorder::session::{RecordingSession, SessionStatus};
use crate::upload::UploadPipeline;
use crate::utils::time::deadline_elapsed;
use crate::utils::AppResult;
use chrono::{SecondsFormat, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Controller lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Listening for voice, no session
    Idle,
    /// A session's capture tracks are recording
    Active,
    /// Stopping an over-long segment; recording may continue afterwards
    Rotating,
    /// Stopping after confirmed silence
    Stopping,
    /// Terminal; entered only on an external termination request
    Shutdown,
}

/// Why an active session is being stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopCause {
    /// Silence outlasted the grace period
    Silence,
    /// The segment hit the maximum length
    Rotation,
}

/// Owns the session lifecycle and everything a session touches
pub struct RecordingController {
    tuning: Tuning,
    temp_root: PathBuf,
    planner: Box<dyn TrackPlanner>,
    uploader: UploadPipeline,
    activity: Arc<VoiceActivity>,
    events: mpsc::Receiver<VoiceEvent>,
    shutdown: mpsc::Receiver<()>,
    supervisor: ProcessSupervisor,
    state: ControllerState,
    session: Option<RecordingSession>,
    max_deadline: Option<Instant>,
}

impl RecordingController {
    pub fn new(
        tuning: Tuning,
        temp_root: PathBuf,
        planner: Box<dyn TrackPlanner>,
        uploader: UploadPipeline,
        activity: Arc<VoiceActivity>,
        events: mpsc::Receiver<VoiceEvent>,
        shutdown: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            tuning,
            temp_root,
            planner,
            uploader,
            activity,
            events,
            shutdown,
            supervisor: ProcessSupervisor::new(),
            state: ControllerState::Idle,
            session: None,
            max_deadline: None,
        }
    }

    /// Drive the state machine until a shutdown request arrives
    pub async fn run(mut self) -> AppResult<()> {
        info!("recorder ready, waiting for voice activity");
        loop {
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await?,
                        None => {
                            warn!("voice event stream ended");
                            self.shutdown_now().await;
                            break;
                        }
                    }
                }
                _ = deadline_elapsed(self.max_deadline) => {
                    self.max_deadline = None;
                    self.rotate_session().await?;
                }
                _ = self.shutdown.recv() => {
                    self.shutdown_now().await;
                    break;
                }
            }
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: VoiceEvent) -> AppResult<()> {
        match event {
            VoiceEvent::Started => self.begin_session()?,
            VoiceEvent::SilenceConfirmed => self.stop_session(StopCause::Silence).await?,
            VoiceEvent::SilenceDetected | VoiceEvent::Resumed => {
                debug!(?event, "voice activity");
            }
        }
        Ok(())
    }

    /// Idle → Active: create the session record and launch its tracks
    fn begin_session(&mut self) -> AppResult<()> {
        if self.state != ControllerState::Idle || self.session.is_some() {
            debug!(state = ?self.state, "voice start ignored, recorder not idle");
            return Ok(());
        }

        let mut session = RecordingSession::create(&self.temp_root)?;
        let specs = self.planner.plan(&session);
        session.tracks = specs.iter().map(|spec| spec.kind).collect();
        info!(
            session_id = session.id,
            level_db = self.activity.level_db(),
            directory = %session.directory.display(),
            "voice detected, starting recording session"
        );

        let failures = self.supervisor.start(&specs);
        for failure in &failures {
            warn!("capture track failed to start: {failure}");
        }
        if self.supervisor.tracked() == 0 {
            error!("no capture track started, abandoning session");
            session.status = SessionStatus::Failed;
            session.remove_dir();
            return match failures.into_iter().next() {
                Some(first) => Err(first.into()),
                None => Ok(()),
            };
        }

        self.activity.set_session_active(true);
        self.max_deadline = Some(Instant::now() + self.tuning.max_session);
        self.state = ControllerState::Active;
        self.session = Some(session);
        Ok(())
    }

    /// Stop/evaluate sequence shared by silence stops and rotation
    async fn stop_session(&mut self, cause: StopCause) -> AppResult<()> {
        let Some(mut session) = self.session.take() else {
            debug!("stop requested with no active session");
            return Ok(());
        };
        self.state = match cause {
            StopCause::Silence => ControllerState::Stopping,
            StopCause::Rotation => ControllerState::Rotating,
        };
        self.max_deadline = None;
        self.activity.set_session_active(false);

        let elapsed = session.elapsed();
        if cause == StopCause::Silence && elapsed < self.tuning.min_session {
            info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "session shorter than the minimum, discarding"
            );
            session.status = SessionStatus::Discarded;
            self.supervisor.kill_all().await;
            session.remove_dir();
            self.state = ControllerState::Idle;
            return Ok(());
        }

        session.status = match cause {
            StopCause::Silence => SessionStatus::Stopping,
            StopCause::Rotation => SessionStatus::Splitting,
        };
        let outcomes = self
            .supervisor
            .stop_all(self.tuning.force_kill_timeout)
            .await;
        for (track, state) in &outcomes {
            debug!(%track, ?state, "capture track reached a terminal state");
        }
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        // Encoders may still be flushing container metadata right after exit.
        tokio::time::sleep(self.tuning.settle_delay).await;

        session.status = match self
            .uploader
            .upload_directory(&session.directory, &stamp)
            .await
        {
            Ok(report) if report.all_succeeded() => {
                info!(files = report.outcomes.len(), "session upload complete");
                SessionStatus::Uploaded
            }
            Ok(report) => {
                error!(
                    failed = report.failures().len(),
                    total = report.outcomes.len(),
                    "session upload finished with failures"
                );
                SessionStatus::Failed
            }
            Err(e) => {
                error!("session upload failed: {e}");
                SessionStatus::Failed
            }
        };
        info!(session_id = session.id, status = ?session.status, "session closed");
        session.remove_dir();

        self.state = ControllerState::Idle;
        if cause == StopCause::Rotation && self.activity.is_above_threshold() {
            info!("voice still active, starting the next segment");
            self.begin_session()?;
        }
        Ok(())
    }

    /// Active → Rotating on max-duration expiry
    async fn rotate_session(&mut self) -> AppResult<()> {
        if self.session.is_none() {
            debug!("rotation timer fired with no active session");
            return Ok(());
        }
        info!(
            max_secs = self.tuning.max_session.as_secs(),
            "maximum segment length reached, rotating session"
        );
        self.stop_session(StopCause::Rotation).await
    }

    /// Unconditional teardown; any in-flight session is discarded unsent
    async fn shutdown_now(&mut self) {
        info!("shutdown requested");
        self.state = ControllerState::Shutdown;
        self.max_deadline = None;
        self.activity.set_session_active(false);

        if let Some(mut session) = self.session.take() {
            warn!(session_id = session.id, "discarding in-flight session");
            session.status = SessionStatus::Discarded;
            self.supervisor.kill_all().await;
            session.remove_dir();
        } else {
            self.supervisor.kill_all().await;
        }
        info!("shutdown complete");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::capture::TrackSpec;
    use crate::recorder::session::TrackKind;
    use crate::upload::{BlobStore, UploadError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    /// Stand-in planner: each track writes its file immediately, then
    /// waits for one byte of input like an encoder waiting for `q`.
    struct ShPlanner;

    impl TrackPlanner for ShPlanner {
        fn plan(&self, session: &RecordingSession) -> Vec<TrackSpec> {
            TrackKind::ALL
                .into_iter()
                .map(|kind| {
                    let output = session.track_path(kind);
                    let script =
                        format!("printf take > '{}'; head -c1 >/dev/null", output.display());
                    TrackSpec {
                        kind,
                        program: "sh".to_string(),
                        args: vec!["-c".to_string(), script],
                        output,
                    }
                })
                .collect()
        }
    }

    #[derive(Default)]
    struct MockStore {
        puts: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl BlobStore for MockStore {
        async fn put(
            &self,
            key: &str,
            content_type: &str,
            _body: Vec<u8>,
        ) -> Result<(), UploadError> {
            self.puts
                .lock()
                .push((key.to_string(), content_type.to_string()));
            if self.fail {
                return Err(UploadError::Put {
                    key: key.to_string(),
                    message: "injected failure".to_string(),
                });
            }
            Ok(())
        }
    }

    struct Harness {
        events: mpsc::Sender<VoiceEvent>,
        shutdown: mpsc::Sender<()>,
        activity: Arc<VoiceActivity>,
        store: Arc<MockStore>,
        root: tempfile::TempDir,
        controller: JoinHandle<AppResult<()>>,
    }

    fn launch(tuning: Tuning) -> Harness {
        launch_with(tuning, Arc::new(MockStore::default()))
    }

    fn launch_with(tuning: Tuning, store: Arc<MockStore>) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let (event_tx, event_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let activity = Arc::new(VoiceActivity::new());
        let uploader = UploadPipeline::new(store.clone());
        let controller = RecordingController::new(
            tuning,
            root.path().to_path_buf(),
            Box::new(ShPlanner),
            uploader,
            activity.clone(),
            event_rx,
            shutdown_rx,
        );
        let handle = tokio::spawn(controller.run());
        Harness {
            events: event_tx,
            shutdown: shutdown_tx,
            activity,
            store,
            root,
            controller: handle,
        }
    }

    /// Millisecond-scale timings so lifecycle tests finish quickly
    fn fast_tuning() -> Tuning {
        Tuning {
            min_session: Duration::from_millis(100),
            max_session: Duration::from_secs(60),
            settle_delay: Duration::from_millis(10),
            ..Tuning::default()
        }
    }

    fn session_dirs(harness: &Harness) -> usize {
        std::fs::read_dir(harness.root.path()).unwrap().count()
    }

    async fn wait_for<F>(what: &str, mut cond: F)
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn shutdown_and_join(harness: &mut Harness) {
        harness.shutdown.send(()).await.unwrap();
        timeout(Duration::from_secs(5), &mut harness.controller)
            .await
            .expect("controller did not shut down")
            .expect("controller task panicked")
            .expect("controller returned an error");
    }

    #[tokio::test]
    async fn test_short_session_is_discarded_without_upload() {
        let mut harness = launch(Tuning {
            min_session: Duration::from_secs(30),
            ..fast_tuning()
        });

        harness.events.send(VoiceEvent::Started).await.unwrap();
        wait_for("session directory", || session_dirs(&harness) == 1).await;

        harness.events.send(VoiceEvent::SilenceConfirmed).await.unwrap();
        wait_for("directory cleanup", || session_dirs(&harness) == 0).await;
        assert!(harness.store.puts.lock().is_empty());

        shutdown_and_join(&mut harness).await;
    }

    #[tokio::test]
    async fn test_completed_session_uploads_every_track() {
        let mut harness = launch(fast_tuning());

        harness.events.send(VoiceEvent::Started).await.unwrap();
        wait_for("session directory", || session_dirs(&harness) == 1).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        harness.events.send(VoiceEvent::SilenceConfirmed).await.unwrap();
        wait_for("uploads", || harness.store.puts.lock().len() == 3).await;
        wait_for("directory cleanup", || session_dirs(&harness) == 0).await;

        let mut puts = harness.store.puts.lock().clone();
        puts.sort();
        assert!(puts[0].0.starts_with("recording-") && puts[0].0.ends_with("-audio.wav"));
        assert_eq!(puts[0].1, "audio/wav");
        assert!(puts[1].0.ends_with("-screen.mp4"));
        assert_eq!(puts[1].1, "video/mp4");
        assert!(puts[2].0.ends_with("-webcam.mp4"));
        assert_eq!(puts[2].1, "video/mp4");

        shutdown_and_join(&mut harness).await;
    }

    #[tokio::test]
    async fn test_rotation_splits_into_consecutive_segments() {
        // Oversized minimum proves rotation is never duration-gated.
        let mut harness = launch(Tuning {
            min_session: Duration::from_secs(60),
            max_session: Duration::from_millis(200),
            settle_delay: Duration::from_millis(10),
            ..Tuning::default()
        });
        harness.activity.record(60.0, true);

        harness.events.send(VoiceEvent::Started).await.unwrap();
        wait_for("two uploaded segments", || {
            harness.store.puts.lock().len() >= 6
        })
        .await;

        let stamps: BTreeSet<String> = harness
            .store
            .puts
            .lock()
            .iter()
            .filter(|(key, _)| key.ends_with("-screen.mp4"))
            .map(|(key, _)| key.clone())
            .collect();
        assert!(stamps.len() >= 2, "expected distinct segment keys: {stamps:?}");

        shutdown_and_join(&mut harness).await;
        assert_eq!(session_dirs(&harness), 0);
    }

    #[tokio::test]
    async fn test_rotation_ends_when_voice_has_faded() {
        let mut harness = launch(Tuning {
            min_session: Duration::from_secs(60),
            max_session: Duration::from_millis(150),
            settle_delay: Duration::from_millis(10),
            ..Tuning::default()
        });
        // activity stays below threshold, so the rotated segment is the last

        harness.events.send(VoiceEvent::Started).await.unwrap();
        wait_for("segment upload", || harness.store.puts.lock().len() == 3).await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(harness.store.puts.lock().len(), 3);
        assert_eq!(session_dirs(&harness), 0);

        shutdown_and_join(&mut harness).await;
    }

    #[tokio::test]
    async fn test_voice_start_while_active_is_ignored() {
        let mut harness = launch(fast_tuning());

        harness.events.send(VoiceEvent::Started).await.unwrap();
        wait_for("session directory", || session_dirs(&harness) == 1).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        harness.events.send(VoiceEvent::Started).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session_dirs(&harness), 1);

        harness.events.send(VoiceEvent::SilenceConfirmed).await.unwrap();
        wait_for("uploads", || harness.store.puts.lock().len() == 3).await;
        wait_for("directory cleanup", || session_dirs(&harness) == 0).await;

        shutdown_and_join(&mut harness).await;
    }

    #[tokio::test]
    async fn test_shutdown_discards_active_session_without_upload() {
        let mut harness = launch(fast_tuning());

        harness.events.send(VoiceEvent::Started).await.unwrap();
        wait_for("session directory", || session_dirs(&harness) == 1).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        shutdown_and_join(&mut harness).await;

        assert!(harness.store.puts.lock().is_empty());
        assert_eq!(session_dirs(&harness), 0);
    }

    #[tokio::test]
    async fn test_silence_events_while_idle_change_nothing() {
        let mut harness = launch(fast_tuning());

        harness.events.send(VoiceEvent::SilenceConfirmed).await.unwrap();
        harness.events.send(VoiceEvent::SilenceDetected).await.unwrap();
        harness.events.send(VoiceEvent::Resumed).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(session_dirs(&harness), 0);
        assert!(harness.store.puts.lock().is_empty());

        // Still alive and able to record afterwards
        harness.events.send(VoiceEvent::Started).await.unwrap();
        wait_for("session directory", || session_dirs(&harness) == 1).await;

        shutdown_and_join(&mut harness).await;
    }

    #[tokio::test]
    async fn test_upload_failure_still_removes_the_directory() {
        let store = Arc::new(MockStore {
            fail: true,
            ..MockStore::default()
        });
        let mut harness = launch_with(fast_tuning(), store);

        harness.events.send(VoiceEvent::Started).await.unwrap();
        wait_for("session directory", || session_dirs(&harness) == 1).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        harness.events.send(VoiceEvent::SilenceConfirmed).await.unwrap();
        wait_for("directory cleanup", || session_dirs(&harness) == 0).await;
        assert_eq!(harness.store.puts.lock().len(), 3);

        // A failed upload is non-fatal: the next session still starts
        harness.events.send(VoiceEvent::Started).await.unwrap();
        wait_for("next session directory", || session_dirs(&harness) == 1).await;

        shutdown_and_join(&mut harness).await;
    }
}
