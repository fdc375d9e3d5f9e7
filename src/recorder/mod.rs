//! Recording lifecycle
//!
//! The session record plus the controller state machine that starts,
//! rotates, stops and uploads sessions in response to voice activity.

pub mod controller;
pub mod session;

pub use controller::{ControllerState, RecordingController};
pub use session::{RecordingSession, SessionStatus, TrackKind};
