//! Error types and handling
//!
//! Common error types used across the application.

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("startup resolution failed: {0}")]
    Startup(String),

    #[error("capture error: {0}")]
    Capture(#[from] crate::capture::CaptureError),
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
