//! Immutable audio frames exchanged between capture, session, and playback.

use std::time::Duration;

use super::convert::pcm16_to_float;

/// Which way a frame is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Microphone audio bound for the remote endpoint.
    Capture,
    /// Model audio bound for the speaker.
    Playback,
}

/// A block of PCM16 mono samples at a known sample rate.
///
/// Frames are moved from producer to consumer and never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
    sample_rate: u32,
    direction: Direction,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32, direction: Direction) -> Self {
        Self {
            samples,
            sample_rate,
            direction,
        }
    }

    pub fn capture(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, Direction::Capture)
    }

    pub fn playback(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, Direction::Playback)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length, computed in whole nanoseconds so that back-to-back
    /// frames add up without floating point drift.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = self.samples.len() as u128 * 1_000_000_000 / self.sample_rate as u128;
        Duration::from_nanos(nanos as u64)
    }

    /// Samples as `f32` for device output.
    pub fn to_float(&self) -> Vec<f32> {
        pcm16_to_float(&self.samples)
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}
