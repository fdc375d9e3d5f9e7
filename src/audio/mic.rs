//! Microphone capture
//!
//! Streams the default input device into fixed-size 16-bit sample blocks
//! for the level monitor. The cpal stream is not `Send`, so it lives on a
//! dedicated thread for its whole life; a shared flag stops it.

use super::SampleBlock;
use crate::config::SAMPLES_PER_BLOCK;
use crate::utils::{AppError, AppResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Handle to the running capture thread
pub struct Microphone {
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Microphone {
    /// Start capturing the default input device
    ///
    /// Fails fast when no input device exists; later stream errors are
    /// logged from the capture thread instead, matching how encoder
    /// diagnostics are treated.
    pub fn start(blocks: mpsc::Sender<SampleBlock>) -> AppResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AppError::Startup("no default audio input device".to_string()))?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!("monitoring microphone: {}", name);

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let thread = std::thread::spawn(move || capture_thread(blocks, thread_stop));

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn capture_thread(blocks: mpsc::Sender<SampleBlock>, stop: Arc<AtomicBool>) {
    // The device is re-resolved here: cpal streams must be built and kept
    // on the thread that owns them.
    let host = cpal::default_host();
    let device = match host.default_input_device() {
        Some(d) => d,
        None => {
            tracing::error!("input device disappeared before capture started");
            return;
        }
    };

    let config = match device.default_input_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to read input config: {}", e);
            return;
        }
    };
    tracing::info!(
        "microphone stream: {:?}, {} Hz, {} ch",
        config.sample_format(),
        config.sample_rate().0,
        config.channels()
    );

    let stream_config: cpal::StreamConfig = config.clone().into();
    let stream = {
        let mut acc = BlockAccumulator::new(SAMPLES_PER_BLOCK, blocks);
        match config.sample_format() {
            cpal::SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| acc.push_all(data, |&s| s),
                stream_error,
                None,
            ),
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    acc.push_all(data, |&s| i16_from_f32(s))
                },
                stream_error,
                None,
            ),
            cpal::SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    acc.push_all(data, |&s| i16_from_u16(s))
                },
                stream_error,
                None,
            ),
            other => {
                tracing::error!("unsupported input sample format: {:?}", other);
                return;
            }
        }
    };

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("failed to build input stream: {}", e);
            return;
        }
    };

    if let Err(e) = stream.play() {
        tracing::error!("failed to start input stream: {}", e);
        return;
    }
    tracing::info!("microphone stream started");

    // Keep thread (and stream) alive until told to stop
    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    drop(stream);
    tracing::info!("microphone stream stopped");
}

fn stream_error(err: cpal::StreamError) {
    tracing::error!("microphone stream error: {}", err);
}

fn i16_from_f32(s: f32) -> i16 {
    (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

fn i16_from_u16(s: u16) -> i16 {
    (s as i32 - 32768) as i16
}

/// Gathers callback buffers into fixed-size blocks
struct BlockAccumulator {
    pending: Vec<i16>,
    capacity: usize,
    blocks: mpsc::Sender<SampleBlock>,
}

impl BlockAccumulator {
    fn new(capacity: usize, blocks: mpsc::Sender<SampleBlock>) -> Self {
        Self {
            pending: Vec::with_capacity(capacity),
            capacity,
            blocks,
        }
    }

    fn push_all<T>(&mut self, data: &[T], convert: impl Fn(&T) -> i16) {
        for sample in data {
            self.pending.push(convert(sample));
            if self.pending.len() == self.capacity {
                let block =
                    std::mem::replace(&mut self.pending, Vec::with_capacity(self.capacity));
                // A full channel drops the block rather than stalling the
                // audio callback.
                let _ = self.blocks.try_send(block);
            }
        }
    }
}
