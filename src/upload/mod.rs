//! Session upload
//!
//! Turns a completed session directory into objects in the blob store:
//! concurrent per-file puts with per-file outcome tracking.

pub mod pipeline;
pub mod store;

use std::path::PathBuf;
use thiserror::Error;

/// Errors from listing, reading, or putting session files
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to list session directory {path}: {source}")]
    List {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("put {key} failed: {message}")]
    Put { key: String, message: String },
}

pub use pipeline::{FileOutcome, UploadPipeline, UploadReport};
pub use store::{content_type_for, BlobStore, S3BlobStore};
