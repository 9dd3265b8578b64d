//! Microphone capture into the session's outbound audio channel.
//!
//! The device is opened when the pipeline starts and the open stream is moved
//! into the capture task, which drops it on every way out of the loop. Frames
//! are never dropped under back-pressure: a full channel blocks the capture
//! task, and blocking longer than the stall timeout ends capture with an
//! error instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::core::audio::{AudioFrame, CaptureDevice, float_to_pcm16, resample};
use crate::core::realtime::{AudioSender, RealtimeError, RealtimeResult};

/// Capture parameters.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate frames are converted to before sending.
    pub wire_sample_rate: u32,
    /// Samples pulled from the device per frame, at the device's rate.
    pub block_size: usize,
    /// How long a single device read may wait before the stop flag is checked.
    pub read_timeout: Duration,
    /// How long a send may block on a full channel before capture gives up.
    pub stall_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            wire_sample_rate: crate::core::audio::WIRE_SAMPLE_RATE,
            block_size: 4096,
            read_timeout: Duration::from_millis(100),
            stall_timeout: Duration::from_secs(2),
        }
    }
}

/// Starts capture runs.
pub struct CapturePipeline;

impl CapturePipeline {
    /// Open `device` and stream its audio into `sender` until stopped.
    ///
    /// Device errors while opening are returned directly. Errors after that
    /// are reported through `on_error`, after which capture stops and the
    /// device is released.
    pub fn start<E>(
        device: Arc<dyn CaptureDevice>,
        sender: AudioSender,
        config: CaptureConfig,
        on_error: E,
    ) -> RealtimeResult<CaptureHandle>
    where
        E: Fn(RealtimeError) + Send + 'static,
    {
        if config.block_size == 0 || config.wire_sample_rate == 0 {
            return Err(RealtimeError::InvalidConfiguration(
                "capture block size and sample rate must be positive".to_string(),
            ));
        }

        let mut stream = device.open()?;
        let device_name = device.name();
        info!(
            device = %device_name,
            native_rate = stream.sample_rate(),
            block_size = config.block_size,
            "Capture started"
        );

        let stop = Arc::new(AtomicBool::new(false));
        let frames_sent = Arc::new(AtomicU64::new(0));
        let runtime = tokio::runtime::Handle::current();

        let task = {
            let stop = stop.clone();
            let frames_sent = frames_sent.clone();
            tokio::task::spawn_blocking(move || {
                while !stop.load(Ordering::SeqCst) {
                    let block = match stream.read_block(config.block_size, config.read_timeout) {
                        Ok(Some(block)) => block,
                        Ok(None) => continue,
                        Err(e) => {
                            error!(device = %device_name, "Capture read failed: {}", e);
                            on_error(RealtimeError::Device(e));
                            break;
                        }
                    };

                    let resampled = resample(&block, stream.sample_rate(), config.wire_sample_rate);
                    let frame = AudioFrame::capture(
                        float_to_pcm16(&resampled),
                        config.wire_sample_rate,
                    );

                    if let Err(e) = sender.send_blocking(&runtime, frame, config.stall_timeout) {
                        if stop.load(Ordering::SeqCst) {
                            break;
                        }
                        match e {
                            RealtimeError::InvalidState { .. } => {
                                debug!("Session no longer active, ending capture");
                            }
                            other => {
                                error!("Capture send failed: {}", other);
                                on_error(other);
                            }
                        }
                        break;
                    }
                    frames_sent.fetch_add(1, Ordering::Relaxed);
                }
                drop(stream);
                info!(device = %device_name, "Capture stopped");
            })
        };

        Ok(CaptureHandle {
            stop,
            frames_sent,
            task: Some(task),
        })
    }
}

/// A running capture. Stopping waits for the device to be released.
pub struct CaptureHandle {
    stop: Arc<AtomicBool>,
    frames_sent: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    /// Frames handed to the session so far.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Whether the capture loop has exited on its own.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop capturing. Returns once the device handle has been dropped.
    pub async fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Capture task failed: {}", e);
            }
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}
