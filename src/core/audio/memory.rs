//! In-memory audio devices for headless sessions and tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::device::{
    CaptureDevice, CaptureStream, DeviceError, DeviceResult, PlaybackDevice, PlaybackSink,
};

#[derive(Default)]
struct CaptureShared {
    buffer: Mutex<VecDeque<f32>>,
    available: Condvar,
    in_use: AtomicBool,
    opened: AtomicUsize,
    unavailable: AtomicBool,
}

/// A capture device fed by [`push_samples`](Self::push_samples).
#[derive(Clone)]
pub struct MemoryCaptureDevice {
    sample_rate: u32,
    shared: Arc<CaptureShared>,
}

impl MemoryCaptureDevice {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            shared: Arc::new(CaptureShared::default()),
        }
    }

    /// A device whose `open` always fails, simulating a missing microphone.
    pub fn unavailable(sample_rate: u32) -> Self {
        let device = Self::new(sample_rate);
        device.shared.unavailable.store(true, Ordering::SeqCst);
        device
    }

    /// Queue samples for the next reads.
    pub fn push_samples(&self, samples: &[f32]) {
        let mut buffer = self.shared.buffer.lock();
        buffer.extend(samples.iter().copied());
        self.shared.available.notify_all();
    }

    /// Whether a stream currently holds the device.
    pub fn is_open(&self) -> bool {
        self.shared.in_use.load(Ordering::SeqCst)
    }

    /// How many times the device has been opened.
    pub fn open_count(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn buffered_len(&self) -> usize {
        self.shared.buffer.lock().len()
    }
}

impl CaptureDevice for MemoryCaptureDevice {
    fn name(&self) -> String {
        "memory-capture".to_string()
    }

    fn open(&self) -> DeviceResult<Box<dyn CaptureStream>> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(DeviceError::Unavailable(self.name()));
        }
        if self
            .shared
            .in_use
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DeviceError::Busy(self.name()));
        }
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCaptureStream {
            sample_rate: self.sample_rate,
            shared: self.shared.clone(),
        }))
    }
}

struct MemoryCaptureStream {
    sample_rate: u32,
    shared: Arc<CaptureShared>,
}

impl CaptureStream for MemoryCaptureStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_block(
        &mut self,
        block_size: usize,
        timeout: Duration,
    ) -> DeviceResult<Option<Vec<f32>>> {
        let mut buffer = self.shared.buffer.lock();
        if buffer.len() < block_size {
            self.shared.available.wait_for(&mut buffer, timeout);
        }
        if buffer.len() < block_size || block_size == 0 {
            return Ok(None);
        }
        Ok(Some(buffer.drain(..block_size).collect()))
    }
}

impl Drop for MemoryCaptureStream {
    fn drop(&mut self) {
        self.shared.in_use.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct PlaybackShared {
    played: Mutex<Vec<Vec<f32>>>,
    in_use: AtomicBool,
}

/// A playback device that records every block it is asked to play.
#[derive(Clone)]
pub struct MemoryPlaybackDevice {
    sample_rate: u32,
    shared: Arc<PlaybackShared>,
}

impl MemoryPlaybackDevice {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            shared: Arc::new(PlaybackShared::default()),
        }
    }

    /// Blocks handed to the sink so far, in play order.
    pub fn played_blocks(&self) -> Vec<Vec<f32>> {
        self.shared.played.lock().clone()
    }

    pub fn played_samples(&self) -> usize {
        self.shared.played.lock().iter().map(Vec::len).sum()
    }

    pub fn is_open(&self) -> bool {
        self.shared.in_use.load(Ordering::SeqCst)
    }
}

impl PlaybackDevice for MemoryPlaybackDevice {
    fn name(&self) -> String {
        "memory-playback".to_string()
    }

    fn open(&self) -> DeviceResult<Box<dyn PlaybackSink>> {
        if self
            .shared
            .in_use
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DeviceError::Busy(self.name()));
        }
        Ok(Box::new(MemoryPlaybackSink {
            sample_rate: self.sample_rate,
            shared: self.shared.clone(),
        }))
    }
}

struct MemoryPlaybackSink {
    sample_rate: u32,
    shared: Arc<PlaybackShared>,
}

impl PlaybackSink for MemoryPlaybackSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play(&mut self, samples: Vec<f32>) -> DeviceResult<()> {
        self.shared.played.lock().push(samples);
        Ok(())
    }
}

impl Drop for MemoryPlaybackSink {
    fn drop(&mut self) {
        self.shared.in_use.store(false, Ordering::SeqCst);
    }
}
