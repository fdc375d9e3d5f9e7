//! Runtime configuration
//!
//! Command-line surface plus the named tuning constants that drive the
//! voice-detection and session lifecycle decisions.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Loudness threshold separating voice from silence, in dB over raw
/// 16-bit amplitude (20 * log10 of block RMS).
pub const VOICE_THRESHOLD_DB: f64 = 50.0;

/// How long the level may stay below threshold before a stop is confirmed.
pub const SILENCE_GRACE: Duration = Duration::from_secs(5);

/// Sessions shorter than this are discarded as noise rather than uploaded.
pub const MIN_SESSION_DURATION: Duration = Duration::from_secs(15);

/// Sessions longer than this are rotated into a fresh segment.
pub const MAX_SESSION_DURATION: Duration = Duration::from_secs(600);

/// Per-process grace window between the quit request and a forced kill.
pub const FORCE_KILL_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after all encoders stop, letting them flush container metadata
/// before the session directory is listed for upload.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Samples per block handed to the level monitor.
pub const SAMPLES_PER_BLOCK: usize = 4096;

/// Bucket every finished take lands in.
pub const UPLOAD_BUCKET: &str = "yaptabber";

/// Multipart threshold and part size for large track files.
pub const UPLOAD_PART_SIZE: usize = 5 * 1024 * 1024;

/// Concurrent in-flight parts per multipart upload.
pub const UPLOAD_PART_CONCURRENCY: usize = 4;

/// Command-line arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "yaptabber", version, about = "Unattended voice-triggered meeting recorder")]
pub struct Cli {
    /// S3-compatible endpoint URL
    #[arg(long, env = "YAPTABBER_ENDPOINT")]
    pub endpoint: String,

    /// Region the bucket lives in
    #[arg(long, env = "YAPTABBER_REGION")]
    pub region: String,

    /// Access key id for the blob store
    #[arg(long, env = "YAPTABBER_ACCESS_KEY_ID")]
    pub access_key_id: String,

    /// Secret access key for the blob store
    #[arg(long, env = "YAPTABBER_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_access_key: String,

    /// Root directory for per-session temp directories (default: platform temp)
    #[arg(long, env = "YAPTABBER_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,
}

impl Cli {
    /// Resolved root under which session directories are created
    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Tunable timing and sizing knobs, injected wherever decisions depend on them
///
/// Production code uses [`Tuning::default`]; tests substitute millisecond-scale
/// values so timing-sensitive behavior can run quickly.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Voice/silence classification threshold in dB
    pub threshold_db: f64,
    /// Silence tolerated before the session is stopped
    pub silence_grace: Duration,
    /// Minimum session length worth keeping
    pub min_session: Duration,
    /// Maximum segment length before rotation
    pub max_session: Duration,
    /// Graceful-stop window per capture process
    pub force_kill_timeout: Duration,
    /// Encoder flush wait between stop and upload
    pub settle_delay: Duration,
    /// Destination bucket
    pub bucket: String,
    /// Multipart threshold/part size in bytes
    pub part_size: usize,
    /// In-flight parts per multipart upload
    pub part_concurrency: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            threshold_db: VOICE_THRESHOLD_DB,
            silence_grace: SILENCE_GRACE,
            min_session: MIN_SESSION_DURATION,
            max_session: MAX_SESSION_DURATION,
            force_kill_timeout: FORCE_KILL_TIMEOUT,
            settle_delay: SETTLE_DELAY,
            bucket: UPLOAD_BUCKET.to_string(),
            part_size: UPLOAD_PART_SIZE,
            part_concurrency: UPLOAD_PART_CONCURRENCY,
        }
    }
}
