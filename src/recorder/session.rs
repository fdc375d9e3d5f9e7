//! Recording session state
//!
//! Defines the session lifecycle states and the per-session record that
//! owns the temporary directory the capture tracks write into.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// One capture track of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Screen,
    Webcam,
    Audio,
}

impl TrackKind {
    /// Every track a full session records
    pub const ALL: [TrackKind; 3] = [TrackKind::Screen, TrackKind::Webcam, TrackKind::Audio];

    /// File name the track's encoder writes inside the session directory
    pub fn file_name(&self) -> &'static str {
        match self {
            TrackKind::Screen => "screen.mp4",
            TrackKind::Webcam => "webcam.mp4",
            TrackKind::Audio => "audio.wav",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackKind::Screen => "screen",
            TrackKind::Webcam => "webcam",
            TrackKind::Audio => "audio",
        };
        f.write_str(name)
    }
}

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Tracks are recording
    Active,
    /// Stopping because the max segment duration was reached
    Splitting,
    /// Stopping because silence was confirmed
    Stopping,
    /// Thrown away without upload (too short, or forced shutdown)
    Discarded,
    /// Every track file reached the blob store
    Uploaded,
    /// At least one track file failed to upload
    Failed,
}

/// One continuous or rotated multi-track capture attempt
///
/// Created only by the controller when voice activity is confirmed while
/// idle; the directory exists for exactly as long as the session record
/// owns it.
#[derive(Debug)]
pub struct RecordingSession {
    /// Creation time in epoch milliseconds; names the directory
    pub id: i64,

    /// Wall-clock creation time
    pub created_at: DateTime<Utc>,

    /// Temp directory holding the track output files
    pub directory: PathBuf,

    /// Tracks this session actually requested
    pub tracks: Vec<TrackKind>,

    /// Current lifecycle state
    pub status: SessionStatus,

    /// Monotonic start, for duration decisions
    started: Instant,
}

impl RecordingSession {
    /// Create the session record and its directory
    pub fn create(temp_root: &Path) -> std::io::Result<Self> {
        let created_at = Utc::now();
        let id = created_at.timestamp_millis();
        let directory = temp_root.join(format!("recording-{id}"));
        std::fs::create_dir_all(&directory)?;

        Ok(Self {
            id,
            created_at,
            directory,
            tracks: Vec::new(),
            status: SessionStatus::Active,
            started: Instant::now(),
        })
    }

    /// Time since the session started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Output path for one track
    pub fn track_path(&self, kind: TrackKind) -> PathBuf {
        self.directory.join(kind.file_name())
    }

    /// Best-effort removal of the session directory
    pub fn remove_dir(&self) {
        if let Err(e) = std::fs::remove_dir_all(&self.directory) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    "failed to remove session directory {}: {}",
                    self.directory.display(),
                    e
                );
            }
        }
    }
}
