//! Blob store
//!
//! The put-only storage abstraction the pipeline uploads through, and
//! its S3 implementation. Large bodies go up as multipart uploads with
//! a bounded number of parts in flight.

use super::UploadError;
use crate::config::{Cli, Tuning};
use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use tokio::task::JoinSet;

/// Write-side of the object store
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store one object; resolves once the body is fully delivered
    async fn put(&self, key: &str, content_type: &str, body: Vec<u8>) -> Result<(), UploadError>;
}

/// Content type for an uploaded track file
pub fn content_type_for(file_name: &str) -> &'static str {
    if file_name.to_lowercase().ends_with(".wav") {
        "audio/wav"
    } else {
        "video/mp4"
    }
}

/// S3-compatible blob store
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    part_size: usize,
    part_concurrency: usize,
}

impl S3BlobStore {
    /// Build the client from CLI credentials, path-style against the
    /// configured endpoint
    pub fn new(cli: &Cli, tuning: &Tuning) -> Self {
        let credentials = Credentials::new(
            cli.access_key_id.clone(),
            cli.secret_access_key.clone(),
            None,
            None,
            "yaptabber-cli",
        );
        let config = aws_sdk_s3::Config::builder()
            .region(Region::new(cli.region.clone()))
            .endpoint_url(&cli.endpoint)
            .credentials_provider(credentials)
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(config),
            bucket: tuning.bucket.clone(),
            part_size: tuning.part_size,
            part_concurrency: tuning.part_concurrency,
        }
    }

    async fn put_single(
        &self,
        key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), UploadError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| UploadError::Put {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), UploadError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| UploadError::Put {
                key: key.to_string(),
                message: format!("create multipart: {e}"),
            })?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| UploadError::Put {
                key: key.to_string(),
                message: "multipart upload id missing".to_string(),
            })?
            .to_string();

        match self.upload_parts(key, &upload_id, body).await {
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                    .map_err(|e| UploadError::Put {
                        key: key.to_string(),
                        message: format!("complete multipart: {e}"),
                    })?;
                Ok(())
            }
            Err(e) => {
                // Leave no half-finished multipart state behind
                let _ = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await;
                Err(e)
            }
        }
    }

    /// Upload body chunks with at most `part_concurrency` in flight
    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        body: Vec<u8>,
    ) -> Result<Vec<CompletedPart>, UploadError> {
        let chunks: Vec<Vec<u8>> = body.chunks(self.part_size).map(<[u8]>::to_vec).collect();
        let mut remaining = chunks.into_iter().enumerate();
        let mut in_flight = JoinSet::new();
        let mut parts: Vec<CompletedPart> = Vec::new();

        loop {
            while in_flight.len() < self.part_concurrency {
                let Some((index, chunk)) = remaining.next() else {
                    break;
                };
                let client = self.client.clone();
                let bucket = self.bucket.clone();
                let key = key.to_string();
                let upload_id = upload_id.to_string();
                in_flight.spawn(async move {
                    let part_number = (index + 1) as i32;
                    client
                        .upload_part()
                        .bucket(&bucket)
                        .key(&key)
                        .upload_id(&upload_id)
                        .part_number(part_number)
                        .body(ByteStream::from(chunk))
                        .send()
                        .await
                        .map(|out| {
                            CompletedPart::builder()
                                .part_number(part_number)
                                .set_e_tag(out.e_tag().map(str::to_string))
                                .build()
                        })
                        .map_err(|e| (part_number, e.to_string()))
                });
            }

            match in_flight.join_next().await {
                Some(Ok(Ok(part))) => parts.push(part),
                Some(Ok(Err((part_number, message)))) => {
                    in_flight.abort_all();
                    return Err(UploadError::Put {
                        key: key.to_string(),
                        message: format!("part {part_number}: {message}"),
                    });
                }
                Some(Err(e)) => {
                    in_flight.abort_all();
                    return Err(UploadError::Put {
                        key: key.to_string(),
                        message: format!("part task failed: {e}"),
                    });
                }
                None => break,
            }
        }

        // Completion requires ascending part numbers
        parts.sort_by_key(|p| p.part_number());
        Ok(parts)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, content_type: &str, body: Vec<u8>) -> Result<(), UploadError> {
        if body.len() <= self.part_size {
            self.put_single(key, content_type, body).await
        } else {
            self.put_multipart(key, content_type, body).await
        }
    }
}
