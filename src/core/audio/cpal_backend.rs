//! Host audio devices through `cpal`.
//!
//! `cpal::Stream` is not `Send` on every platform, so each open stream lives on
//! its own thread. The thread builds the stream, reports the negotiated sample
//! rate back, and keeps the stream alive until the owning handle is dropped.
//! Samples cross the thread boundary through a lock-free ring buffer.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{error, info, warn};

use super::device::{
    CaptureDevice, CaptureStream, DeviceError, DeviceResult, PlaybackDevice, PlaybackSink,
};

/// Seconds of audio the ring buffers can hold.
const RING_SECONDS: usize = 10;
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Keeps a `cpal::Stream` alive on a dedicated thread.
struct StreamThread {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    fn spawn<T, F>(name: &str, build: F) -> DeviceResult<(Self, T)>
    where
        T: Send + 'static,
        F: FnOnce() -> DeviceResult<(cpal::Stream, T)> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<DeviceResult<T>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let (stream, value) = match build() {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(DeviceError::StreamFailed(e.to_string())));
                    return;
                }
                if ready_tx.send(Ok(value)).is_err() {
                    return;
                }
                // Blocks until the handle drops its sender.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| DeviceError::StreamFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(value)) => Ok((
                Self {
                    stop: Some(stop_tx),
                    handle: Some(handle),
                },
                value,
            )),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(DeviceError::StreamFailed(
                    "audio thread exited before the stream started".to_string(),
                ))
            }
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Audio stream thread panicked");
            }
        }
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> DeviceError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            DeviceError::Unavailable("device disappeared while opening".to_string())
        }
        cpal::BuildStreamError::StreamConfigNotSupported => {
            DeviceError::UnsupportedConfig(err.to_string())
        }
        other => DeviceError::StreamFailed(other.to_string()),
    }
}

fn find_input_device(name: Option<&str>) -> DeviceResult<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(wanted) => host
            .input_devices()
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| DeviceError::Unavailable(format!("input device not found: {wanted}"))),
        None => host
            .default_input_device()
            .ok_or_else(|| DeviceError::Unavailable("no default input device".to_string())),
    }
}

fn find_output_device(name: Option<&str>) -> DeviceResult<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(wanted) => host
            .output_devices()
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| {
                DeviceError::Unavailable(format!("output device not found: {wanted}"))
            }),
        None => host
            .default_output_device()
            .ok_or_else(|| DeviceError::Unavailable("no default output device".to_string())),
    }
}

type StreamFault = Arc<Mutex<Option<String>>>;

// =============================================================================
// Capture
// =============================================================================

/// Microphone input through the host audio API.
#[derive(Debug, Clone, Default)]
pub struct CpalCaptureDevice {
    device_name: Option<String>,
}

impl CpalCaptureDevice {
    /// Use the host's default input device.
    pub fn default_device() -> Self {
        Self::default()
    }

    /// Use the input device with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }
}

impl CaptureDevice for CpalCaptureDevice {
    fn name(&self) -> String {
        self.device_name
            .clone()
            .unwrap_or_else(|| "default input".to_string())
    }

    fn open(&self) -> DeviceResult<Box<dyn CaptureStream>> {
        let device_name = self.device_name.clone();
        let fault: StreamFault = Arc::new(Mutex::new(None));
        let callback_fault = fault.clone();

        let (thread, (sample_rate, consumer)) = StreamThread::spawn("audio-capture", move || {
            let device = find_input_device(device_name.as_deref())?;
            let supported = device
                .default_input_config()
                .map_err(|e| DeviceError::UnsupportedConfig(e.to_string()))?;
            if supported.sample_format() != cpal::SampleFormat::F32 {
                return Err(DeviceError::UnsupportedConfig(format!(
                    "input sample format {:?}",
                    supported.sample_format()
                )));
            }

            let sample_rate = supported.sample_rate().0;
            let channels = supported.channels() as usize;
            let config = supported.config();
            let ring = HeapRb::<f32>::new(sample_rate as usize * RING_SECONDS);
            let (mut producer, consumer): (HeapProd<f32>, HeapCons<f32>) = ring.split();

            info!(
                device = %device.name().unwrap_or_else(|_| "unknown".into()),
                sample_rate,
                channels,
                "Opening input stream"
            );

            let stream = device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                        if channels > 1 {
                            let mono: Vec<f32> = data
                                .chunks_exact(channels)
                                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                                .collect();
                            producer.push_slice(&mono);
                        } else {
                            producer.push_slice(data);
                        }
                    },
                    move |err| {
                        error!("Audio input stream error: {}", err);
                        *callback_fault.lock() = Some(err.to_string());
                    },
                    None,
                )
                .map_err(map_build_error)?;

            Ok((stream, (sample_rate, consumer)))
        })?;

        Ok(Box::new(CpalCaptureStream {
            sample_rate,
            consumer,
            fault,
            _thread: thread,
        }))
    }
}

struct CpalCaptureStream {
    sample_rate: u32,
    consumer: HeapCons<f32>,
    fault: StreamFault,
    _thread: StreamThread,
}

impl CaptureStream for CpalCaptureStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_block(
        &mut self,
        block_size: usize,
        timeout: Duration,
    ) -> DeviceResult<Option<Vec<f32>>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.fault.lock().take() {
                return Err(DeviceError::StreamFailed(message));
            }
            if block_size > 0 && self.consumer.occupied_len() >= block_size {
                let mut block = vec![0.0f32; block_size];
                self.consumer.pop_slice(&mut block);
                return Ok(Some(block));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

// =============================================================================
// Playback
// =============================================================================

/// Speaker output through the host audio API.
#[derive(Debug, Clone, Default)]
pub struct CpalPlaybackDevice {
    device_name: Option<String>,
}

impl CpalPlaybackDevice {
    /// Use the host's default output device.
    pub fn default_device() -> Self {
        Self::default()
    }

    /// Use the output device with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }
}

impl PlaybackDevice for CpalPlaybackDevice {
    fn name(&self) -> String {
        self.device_name
            .clone()
            .unwrap_or_else(|| "default output".to_string())
    }

    fn open(&self) -> DeviceResult<Box<dyn PlaybackSink>> {
        let device_name = self.device_name.clone();

        let (thread, (sample_rate, producer)) = StreamThread::spawn("audio-playback", move || {
            let device = find_output_device(device_name.as_deref())?;
            let supported = device
                .default_output_config()
                .map_err(|e| DeviceError::UnsupportedConfig(e.to_string()))?;
            if supported.sample_format() != cpal::SampleFormat::F32 {
                return Err(DeviceError::UnsupportedConfig(format!(
                    "output sample format {:?}",
                    supported.sample_format()
                )));
            }

            let sample_rate = supported.sample_rate().0;
            let channels = supported.channels() as usize;
            let config = supported.config();
            let ring = HeapRb::<f32>::new(sample_rate as usize * RING_SECONDS);
            let (producer, mut consumer): (HeapProd<f32>, HeapCons<f32>) = ring.split();

            info!(
                device = %device.name().unwrap_or_else(|_| "unknown".into()),
                sample_rate,
                channels,
                "Opening output stream"
            );

            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                        for frame in data.chunks_mut(channels.max(1)) {
                            let sample = consumer.try_pop().unwrap_or(0.0);
                            frame.fill(sample);
                        }
                    },
                    move |err| {
                        error!("Audio output stream error: {}", err);
                    },
                    None,
                )
                .map_err(map_build_error)?;

            Ok((stream, (sample_rate, producer)))
        })?;

        Ok(Box::new(CpalPlaybackSink {
            sample_rate,
            producer,
            _thread: thread,
        }))
    }
}

struct CpalPlaybackSink {
    sample_rate: u32,
    producer: HeapProd<f32>,
    _thread: StreamThread,
}

impl PlaybackSink for CpalPlaybackSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play(&mut self, samples: Vec<f32>) -> DeviceResult<()> {
        let written = self.producer.push_slice(&samples);
        if written < samples.len() {
            warn!(
                dropped = samples.len() - written,
                "Output ring buffer full, dropping samples"
            );
        }
        Ok(())
    }
}
