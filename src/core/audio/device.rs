//! Device abstractions for microphone capture and speaker playback.
//!
//! Opening a device returns a stream object that owns the hardware handle.
//! Dropping the stream releases the device, so a handle can never outlive the
//! capture or playback run that acquired it.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by audio devices.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// No matching device exists on this host
    #[error("Audio device unavailable: {0}")]
    Unavailable(String),

    /// The host refused access to the device
    #[error("Audio device permission denied: {0}")]
    PermissionDenied(String),

    /// The device is already held by another stream
    #[error("Audio device busy: {0}")]
    Busy(String),

    /// The device does not support a usable stream configuration
    #[error("Unsupported audio configuration: {0}")]
    UnsupportedConfig(String),

    /// The stream failed after it was opened
    #[error("Audio stream failed: {0}")]
    StreamFailed(String),
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// A source of microphone audio.
pub trait CaptureDevice: Send + Sync {
    /// Human-readable device name for logs.
    fn name(&self) -> String;

    /// Acquire the device exclusively.
    fn open(&self) -> DeviceResult<Box<dyn CaptureStream>>;
}

/// An open capture stream. Dropping it releases the device.
pub trait CaptureStream: Send {
    /// Native sample rate of the samples returned by [`read_block`](Self::read_block).
    fn sample_rate(&self) -> u32;

    /// Block until `block_size` mono samples are available or `timeout`
    /// elapses. Returns `Ok(None)` on timeout.
    fn read_block(&mut self, block_size: usize, timeout: Duration)
    -> DeviceResult<Option<Vec<f32>>>;
}

/// A speaker the playback scheduler can write to.
pub trait PlaybackDevice: Send + Sync {
    /// Human-readable device name for logs.
    fn name(&self) -> String;

    /// Acquire the device exclusively.
    fn open(&self) -> DeviceResult<Box<dyn PlaybackSink>>;
}

/// An open playback stream. Dropping it releases the device.
pub trait PlaybackSink: Send {
    /// Native sample rate expected by [`play`](Self::play).
    fn sample_rate(&self) -> u32;

    /// Append mono samples to the output. Must not block on playback.
    fn play(&mut self, samples: Vec<f32>) -> DeviceResult<()>;
}
