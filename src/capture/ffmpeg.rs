//! Encoder invocations
//!
//! Builds the ffmpeg command line for each capture track, bound to the
//! resolved device pair and the session's output paths.

use super::devices::DevicePair;
use crate::recorder::session::{RecordingSession, TrackKind};
use std::path::{Path, PathBuf};

/// One external process to launch for a session track
#[derive(Debug, Clone)]
pub struct TrackSpec {
    /// Track the process records
    pub kind: TrackKind,
    /// Program to execute
    pub program: String,
    /// Full argument list
    pub args: Vec<String>,
    /// File the process writes inside the session directory
    pub output: PathBuf,
}

/// Produces the track processes for a session
///
/// The seam between the controller and concrete encoders: production uses
/// [`FfmpegPlanner`]; tests substitute harmless stand-in commands.
pub trait TrackPlanner: Send + Sync {
    fn plan(&self, session: &RecordingSession) -> Vec<TrackSpec>;
}

/// Plans one ffmpeg child per track against the resolved device pair
pub struct FfmpegPlanner {
    devices: DevicePair,
}

impl FfmpegPlanner {
    pub fn new(devices: DevicePair) -> Self {
        Self { devices }
    }
}

impl TrackPlanner for FfmpegPlanner {
    fn plan(&self, session: &RecordingSession) -> Vec<TrackSpec> {
        vec![
            screen_track(&self.devices, &session.track_path(TrackKind::Screen)),
            webcam_track(&self.devices, &session.track_path(TrackKind::Webcam)),
            audio_track(&session.track_path(TrackKind::Audio)),
        ]
    }
}

fn screen_track(devices: &DevicePair, output: &Path) -> TrackSpec {
    let args = vec![
        "-f".into(),
        "avfoundation".into(),
        "-framerate".into(),
        "5".into(),
        "-capture_cursor".into(),
        "1".into(),
        "-i".into(),
        format!("{}:none", devices.screen),
        "-vf".into(),
        "scale=1280:720".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "ultrafast".into(),
        "-y".into(),
        output.to_string_lossy().into_owned(),
    ];

    TrackSpec {
        kind: TrackKind::Screen,
        program: "ffmpeg".to_string(),
        args,
        output: output.to_path_buf(),
    }
}

fn webcam_track(devices: &DevicePair, output: &Path) -> TrackSpec {
    let args = vec![
        "-f".into(),
        "avfoundation".into(),
        "-framerate".into(),
        "30".into(),
        "-i".into(),
        format!("{}:none", devices.webcam),
        "-vf".into(),
        "scale=640:360".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "ultrafast".into(),
        "-y".into(),
        output.to_string_lossy().into_owned(),
    ];

    TrackSpec {
        kind: TrackKind::Webcam,
        program: "ffmpeg".to_string(),
        args,
        output: output.to_path_buf(),
    }
}

fn audio_track(output: &Path) -> TrackSpec {
    // Grabs the default audio input; device discovery only resolves the
    // video side of the listing.
    let args = vec![
        "-f".into(),
        "avfoundation".into(),
        "-i".into(),
        "none:0".into(),
        "-c:a".into(),
        "pcm_s16le".into(),
        "-ar".into(),
        "44100".into(),
        "-y".into(),
        output.to_string_lossy().into_owned(),
    ];

    TrackSpec {
        kind: TrackKind::Audio,
        program: "ffmpeg".to_string(),
        args,
        output: output.to_path_buf(),
    }
}
