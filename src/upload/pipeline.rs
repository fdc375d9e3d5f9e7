//! Upload pipeline
//!
//! Lists a finished session directory and uploads every file in it
//! concurrently. Object keys carry the session's stop timestamp so a
//! bucket listing reads chronologically.

use super::store::{content_type_for, BlobStore};
use super::UploadError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Result of one file's upload attempt
#[derive(Debug)]
pub struct FileOutcome {
    pub file_name: String,
    pub key: String,
    pub result: Result<(), UploadError>,
}

/// Aggregated result of a directory upload
#[derive(Debug, Default)]
pub struct UploadReport {
    pub outcomes: Vec<FileOutcome>,
}

impl UploadReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn failures(&self) -> Vec<&FileOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err()).collect()
    }
}

/// Uploads session output to the blob store
pub struct UploadPipeline {
    store: Arc<dyn BlobStore>,
}

impl UploadPipeline {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Upload every regular file under `dir`, all transfers in flight
    /// at once. `stamp` is the session stop time baked into each key.
    pub async fn upload_directory(
        &self,
        dir: &Path,
        stamp: &str,
    ) -> Result<UploadReport, UploadError> {
        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| UploadError::List {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut uploads = JoinSet::new();
        loop {
            let entry = entries.next_entry().await.map_err(|e| UploadError::List {
                path: dir.to_path_buf(),
                source: e,
            })?;
            let Some(entry) = entry else {
                break;
            };
            let file_type = entry.file_type().await.map_err(|e| UploadError::List {
                path: entry.path(),
                source: e,
            })?;
            if !file_type.is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().to_string();
            let key = format!("recording-{stamp}-{file_name}");
            let content_type = content_type_for(&file_name);
            let store = Arc::clone(&self.store);
            let path = entry.path();
            uploads.spawn(async move {
                let result = Self::upload_one(store, &path, &key, content_type).await;
                FileOutcome {
                    file_name,
                    key,
                    result,
                }
            });
        }

        let mut report = UploadReport::default();
        while let Some(joined) = uploads.join_next().await {
            match joined {
                Ok(outcome) => {
                    if let Err(e) = &outcome.result {
                        warn!("upload of {} failed: {e}", outcome.key);
                    }
                    report.outcomes.push(outcome);
                }
                Err(e) => warn!("upload task failed: {e}"),
            }
        }
        report.outcomes.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(report)
    }

    async fn upload_one(
        store: Arc<dyn BlobStore>,
        path: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<(), UploadError> {
        let body = tokio::fs::read(path).await.map_err(|e| UploadError::Read {
            path: PathBuf::from(path),
            source: e,
        })?;
        info!("uploading {key} ({} bytes, {content_type})", body.len());
        store.put(key, content_type, body).await
    }
}
