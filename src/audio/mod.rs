//! Audio monitoring
//!
//! Microphone capture, block loudness computation, and the voice-activity
//! monitor that decides when a recording should start or stop.

pub mod level;
pub mod mic;
pub mod monitor;

/// One fixed-size chunk of signed 16-bit PCM samples
pub type SampleBlock = Vec<i16>;

pub use mic::Microphone;
pub use monitor::{LevelMonitor, VoiceActivity, VoiceEvent};
