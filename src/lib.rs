//! Yaptabber - unattended meeting capture, triggered by your voice.
//!
//! Listens to the microphone continuously, records screen, webcam and
//! audio while someone is talking, and ships every finished take to
//! object storage before cleaning up after itself.

pub mod audio;
pub mod capture;
pub mod config;
pub mod recorder;
pub mod upload;
pub mod utils;

use audio::{LevelMonitor, Microphone, VoiceActivity};
use capture::{devices, FfmpegPlanner};
use config::{Cli, Tuning};
use recorder::RecordingController;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upload::{S3BlobStore, UploadPipeline};
use utils::AppResult;

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yaptabber=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wire the pipeline together and run until interrupted
///
/// Device discovery happens first and is fatal on failure; after that the
/// recorder runs unattended until an interrupt arrives.
pub async fn run(cli: Cli) -> AppResult<()> {
    tracing::info!("Starting yaptabber v{}", env!("CARGO_PKG_VERSION"));

    let devices = devices::discover().await?;
    let tuning = Tuning::default();

    let (block_tx, block_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let activity = Arc::new(VoiceActivity::new());

    let store = Arc::new(S3BlobStore::new(&cli, &tuning));
    let controller = RecordingController::new(
        tuning.clone(),
        cli.temp_root(),
        Box::new(FfmpegPlanner::new(devices)),
        UploadPipeline::new(store),
        activity.clone(),
        event_rx,
        shutdown_rx,
    );

    let monitor = LevelMonitor::new(&tuning, block_rx, event_tx, activity);
    tokio::spawn(monitor.run());

    let _mic = Microphone::start(block_tx)?;

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received");
                let _ = shutdown_tx.send(()).await;
            }
            Err(e) => tracing::error!("failed to listen for interrupt: {}", e),
        }
    });

    controller.run().await
}
