//! Audio primitives: sample conversion, frames, and device access.
//!
//! Device I/O is abstracted behind [`CaptureDevice`] and [`PlaybackDevice`].
//! The in-memory implementations work everywhere; host devices are available
//! with the `device-cpal` feature.

pub mod convert;
mod device;
mod frame;
mod memory;

#[cfg(feature = "device-cpal")]
mod cpal_backend;

pub use convert::{
    decode_base64_pcm16, encode_base64_pcm16, float_to_pcm16, pcm16_from_bytes, pcm16_to_bytes,
    pcm16_to_float, resample,
};
pub use device::{
    CaptureDevice, CaptureStream, DeviceError, DeviceResult, PlaybackDevice, PlaybackSink,
};
pub use frame::{AudioFrame, Direction};
pub use memory::{MemoryCaptureDevice, MemoryPlaybackDevice};

#[cfg(feature = "device-cpal")]
pub use cpal_backend::{CpalCaptureDevice, CpalPlaybackDevice};

/// Sample rate of PCM16 audio on the wire.
pub const WIRE_SAMPLE_RATE: u32 = 24000;
