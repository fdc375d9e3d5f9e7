//! External capture processes
//!
//! Device discovery, per-track encoder invocations, and supervision of
//! the ffmpeg children that write the session's track files.

pub mod devices;
pub mod ffmpeg;
pub mod process;
pub mod supervisor;

use crate::recorder::session::TrackKind;
use thiserror::Error;

/// Errors raised while resolving devices or launching capture processes
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("device discovery failed: {0}")]
    Discovery(String),

    #[error("failed to spawn {track} encoder: {source}")]
    Spawn {
        track: TrackKind,
        source: std::io::Error,
    },
}

pub use devices::DevicePair;
pub use ffmpeg::{FfmpegPlanner, TrackPlanner, TrackSpec};
pub use process::{CaptureProcess, ProcessState};
pub use supervisor::ProcessSupervisor;
