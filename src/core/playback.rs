//! Gapless playback scheduling for model audio.
//!
//! Frames are placed on a single forward-moving timeline: each frame starts at
//! `max(now, next_start)` and pushes `next_start` forward by its duration, so
//! bursts of deltas play back-to-back with no gap and no overlap. A frame is
//! handed to the output sink when its start time comes due; from then on it
//! plays to completion. [`PlaybackScheduler::flush`] discards everything not
//! yet handed over and pulls the cursor back to the present.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::core::audio::{AudioFrame, DeviceError, PlaybackSink, resample};

// =============================================================================
// Clocks
// =============================================================================

/// Monotonic time source for the playback timeline.
pub trait PlaybackClock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;
}

/// Wall clock based on [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, at: Duration) {
        self.nanos.store(at.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl PlaybackClock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Placement of one frame on the playback timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledFrame {
    pub sequence: u64,
    pub start: Duration,
    pub duration: Duration,
}

impl ScheduledFrame {
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

struct QueuedFrame {
    slot: ScheduledFrame,
    frame: AudioFrame,
}

struct SchedulerState {
    next_start: Duration,
    next_sequence: u64,
    queue: VecDeque<QueuedFrame>,
}

/// Orders decoded audio frames for sequential playback.
///
/// The cursor and the queue share one lock and the clock is read while it is
/// held, so a frame scheduled concurrently with [`flush`](Self::flush) either
/// lands in the queue before the flush (and is discarded) or is placed at or
/// after the flushed cursor.
pub struct PlaybackScheduler {
    clock: Arc<dyn PlaybackClock>,
    state: Mutex<SchedulerState>,
    wake: Notify,
}

impl PlaybackScheduler {
    pub fn new(clock: Arc<dyn PlaybackClock>) -> Self {
        let next_start = clock.now();
        Self {
            clock,
            state: Mutex::new(SchedulerState {
                next_start,
                next_sequence: 0,
                queue: VecDeque::new(),
            }),
            wake: Notify::new(),
        }
    }

    /// Current time on the scheduler's clock.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Queue a frame and return where it landed on the timeline.
    pub fn schedule(&self, frame: AudioFrame) -> ScheduledFrame {
        let slot = {
            let mut state = self.state.lock();
            let now = self.clock.now();
            let start = now.max(state.next_start);
            let duration = frame.duration();
            let slot = ScheduledFrame {
                sequence: state.next_sequence,
                start,
                duration,
            };
            state.next_sequence += 1;
            state.next_start = start + duration;
            state.queue.push_back(QueuedFrame { slot, frame });
            slot
        };
        self.wake.notify_one();
        slot
    }

    /// Cancel every frame not yet handed to the sink and reset the cursor to
    /// now. Returns the number of cancelled frames.
    pub fn flush(&self) -> usize {
        let mut state = self.state.lock();
        let now = self.clock.now();
        let cancelled = state.queue.len();
        state.queue.clear();
        state.next_start = now;
        debug!(cancelled, "Playback flushed");
        cancelled
    }

    /// Frames waiting for their start time.
    pub fn pending_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Where the next frame would start if nothing else arrives first.
    pub fn next_start(&self) -> Duration {
        self.state.lock().next_start
    }

    /// Remove and return frames whose start time is at or before
    /// `now + lookahead`, in timeline order.
    pub fn drain_due(&self, lookahead: Duration) -> Vec<(ScheduledFrame, AudioFrame)> {
        let mut state = self.state.lock();
        let horizon = self.clock.now() + lookahead;
        let mut due = Vec::new();
        while state
            .queue
            .front()
            .is_some_and(|queued| queued.slot.start <= horizon)
        {
            if let Some(queued) = state.queue.pop_front() {
                due.push((queued.slot, queued.frame));
            }
        }
        due
    }

    fn time_until_next(&self, lookahead: Duration) -> Option<Duration> {
        let state = self.state.lock();
        let horizon = self.clock.now() + lookahead;
        state
            .queue
            .front()
            .map(|queued| queued.slot.start.saturating_sub(horizon))
    }

    /// Drive `sink` from this scheduler until `cancel` fires.
    ///
    /// Frames are handed over one `quantum` ahead of their start time so the
    /// device never runs dry between wakeups. The sink is dropped, releasing
    /// the device, before the task finishes.
    pub fn spawn_pump<E>(
        self: &Arc<Self>,
        mut sink: Box<dyn PlaybackSink>,
        quantum: Duration,
        cancel: CancellationToken,
        on_error: E,
    ) -> JoinHandle<()>
    where
        E: Fn(DeviceError) + Send + 'static,
    {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let sink_rate = sink.sample_rate();
            loop {
                for (slot, frame) in scheduler.drain_due(quantum) {
                    let rate = frame.sample_rate();
                    let mut samples = frame.to_float();
                    if rate != sink_rate {
                        samples = resample(&samples, rate, sink_rate);
                    }
                    if let Err(e) = sink.play(samples) {
                        error!(sequence = slot.sequence, "Playback sink error: {}", e);
                        on_error(e);
                    }
                }

                let wait = scheduler
                    .time_until_next(quantum)
                    .map_or(quantum, |d| d.min(quantum));

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = scheduler.wake.notified() => {}
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            drop(sink);
            debug!("Playback pump stopped");
        })
    }
}
