//! Public entry point for a spoken conversation.
//!
//! [`VoiceSession`] ties the protocol session to the local audio devices.
//! It starts and stops capture with the connection and the mute flag, runs
//! the playback pump, keeps the final transcript, and forwards every
//! [`SessionEvent`] to the caller.

mod observer;

pub use observer::{ConversationObserver, dispatch_event, spawn_observer};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::core::audio::{AudioFrame, CaptureDevice, PlaybackDevice};
use crate::core::capture::{CaptureConfig, CaptureHandle, CapturePipeline};
use crate::core::playback::{PlaybackClock, PlaybackScheduler, SystemClock};
use crate::core::realtime::{
    RealtimeConfig, RealtimeError, RealtimeResult, RealtimeSession, SessionEvent, SessionState,
    TranscriptEntry,
};
use crate::core::tools::ToolRegistry;

/// Default playback pump quantum.
pub const DEFAULT_PLAYBACK_QUANTUM: Duration = Duration::from_millis(10);

/// Builder for [`VoiceSession`].
pub struct VoiceSessionBuilder {
    config: RealtimeConfig,
    registry: Arc<ToolRegistry>,
    capture_device: Option<Arc<dyn CaptureDevice>>,
    playback_device: Option<Arc<dyn PlaybackDevice>>,
    clock: Arc<dyn PlaybackClock>,
    capture_config: CaptureConfig,
    playback_quantum: Duration,
}

impl VoiceSessionBuilder {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ToolRegistry::empty()),
            capture_device: None,
            playback_device: None,
            clock: Arc::new(SystemClock::new()),
            capture_config: CaptureConfig::default(),
            playback_quantum: DEFAULT_PLAYBACK_QUANTUM,
        }
    }

    /// Tools the model may call.
    pub fn tools(mut self, registry: ToolRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn capture_device(mut self, device: Arc<dyn CaptureDevice>) -> Self {
        self.capture_device = Some(device);
        self
    }

    pub fn playback_device(mut self, device: Arc<dyn PlaybackDevice>) -> Self {
        self.playback_device = Some(device);
        self
    }

    /// Clock for the playback timeline.
    pub fn clock(mut self, clock: Arc<dyn PlaybackClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn capture_config(mut self, config: CaptureConfig) -> Self {
        self.capture_config = config;
        self
    }

    pub fn playback_quantum(mut self, quantum: Duration) -> Self {
        self.playback_quantum = quantum;
        self
    }

    pub fn build(self) -> RealtimeResult<VoiceSession> {
        if self.config.api_key.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }
        if self.playback_quantum.is_zero() {
            return Err(RealtimeError::InvalidConfiguration(
                "playback quantum must be positive".to_string(),
            ));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(VoiceSession {
            config: self.config,
            registry: self.registry,
            capture_device: self.capture_device,
            playback_device: self.playback_device,
            capture_config: self.capture_config,
            playback_quantum: self.playback_quantum,
            playback: Arc::new(PlaybackScheduler::new(self.clock)),
            events_tx,
            events_rx: Some(events_rx),
            transcript: Arc::new(Mutex::new(Vec::new())),
            protocol: None,
            state_rx: None,
            forwarder: None,
            capture: None,
            pump: None,
            muted: false,
        })
    }
}

/// A running playback pump and the token that stops it.
struct PumpHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// One spoken conversation with a realtime model.
///
/// Every error returned from a method is also delivered as a
/// [`SessionEvent::Error`].
pub struct VoiceSession {
    config: RealtimeConfig,
    registry: Arc<ToolRegistry>,
    capture_device: Option<Arc<dyn CaptureDevice>>,
    playback_device: Option<Arc<dyn PlaybackDevice>>,
    capture_config: CaptureConfig,
    playback_quantum: Duration,
    playback: Arc<PlaybackScheduler>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    transcript: Arc<Mutex<Vec<TranscriptEntry>>>,
    protocol: Option<RealtimeSession>,
    state_rx: Option<watch::Receiver<SessionState>>,
    forwarder: Option<JoinHandle<()>>,
    capture: Option<CaptureHandle>,
    pump: Option<PumpHandle>,
    muted: bool,
}

impl VoiceSession {
    pub fn builder(config: RealtimeConfig) -> VoiceSessionBuilder {
        VoiceSessionBuilder::new(config)
    }

    /// The event stream. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events_rx.take()
    }

    pub fn state(&self) -> SessionState {
        self.state_rx
            .as_ref()
            .map_or(SessionState::Idle, |rx| *rx.borrow())
    }

    pub fn session_id(&self) -> Option<String> {
        self.protocol.as_ref().and_then(RealtimeSession::session_id)
    }

    /// Final transcript entries in arrival order.
    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript.lock().clone()
    }

    /// Playback frames scheduled but not yet handed to the speaker.
    pub fn pending_playback(&self) -> usize {
        self.playback.pending_len()
    }

    /// The playback timeline, for callers driving their own output.
    pub fn playback(&self) -> &Arc<PlaybackScheduler> {
        &self.playback
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    fn surface<T>(&self, result: RealtimeResult<T>) -> RealtimeResult<T> {
        if let Err(e) = &result {
            if self
                .events_tx
                .send(SessionEvent::Error(e.to_connection_error()))
                .is_err()
            {
                trace!("Error event dropped, no listener");
            }
        }
        result
    }

    fn protocol(&self, operation: &'static str) -> RealtimeResult<&RealtimeSession> {
        self.protocol.as_ref().ok_or(RealtimeError::InvalidState {
            operation,
            state: self.state(),
        })
    }

    /// Connect, negotiate the session, and start the audio devices.
    ///
    /// Fails with `InvalidState` if a connection is already being made or is
    /// active. A previous closed or failed connection is replaced.
    pub async fn connect(&mut self) -> RealtimeResult<()> {
        let result = self.connect_inner().await;
        self.surface(result)
    }

    async fn connect_inner(&mut self) -> RealtimeResult<()> {
        let state = self.state();
        if matches!(state, SessionState::Connecting | SessionState::Active) {
            return Err(RealtimeError::InvalidState {
                operation: "connect",
                state,
            });
        }
        self.teardown().await;

        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let mut protocol = RealtimeSession::new(
            self.config.clone(),
            self.registry.clone(),
            self.playback.clone(),
            internal_tx,
        )?;
        self.state_rx = Some(protocol.subscribe_state());
        self.forwarder = Some(spawn_forwarder(
            internal_rx,
            self.events_tx.clone(),
            self.transcript.clone(),
        ));

        // Acquire the speaker before touching the network.
        if let Err(e) = self.start_playback() {
            self.protocol = Some(protocol);
            self.teardown().await;
            return Err(e);
        }

        if let Err(e) = protocol.connect().await {
            self.protocol = Some(protocol);
            self.teardown().await;
            return Err(e);
        }
        self.protocol = Some(protocol);

        if !self.muted {
            if let Err(e) = self.start_capture() {
                self.teardown().await;
                return Err(e);
            }
        }
        Ok(())
    }

    fn start_playback(&mut self) -> RealtimeResult<()> {
        let Some(device) = &self.playback_device else {
            return Ok(());
        };
        let sink = device.open()?;
        info!(device = %device.name(), "Playback started");

        let cancel = CancellationToken::new();
        let events = self.events_tx.clone();
        let task = self.playback.spawn_pump(
            sink,
            self.playback_quantum,
            cancel.clone(),
            move |e| {
                let error = RealtimeError::Device(e);
                let _ = events.send(SessionEvent::Error(error.to_connection_error()));
            },
        );
        self.pump = Some(PumpHandle { cancel, task });
        Ok(())
    }

    fn start_capture(&mut self) -> RealtimeResult<()> {
        let Some(device) = self.capture_device.clone() else {
            return Ok(());
        };
        if self.capture.is_some() {
            return Ok(());
        }
        let sender = self.protocol("start capture")?.audio_sender()?;
        let events = self.events_tx.clone();
        let handle = CapturePipeline::start(
            device,
            sender,
            self.capture_config.clone(),
            move |e: RealtimeError| {
                let _ = events.send(SessionEvent::Error(e.to_connection_error()));
            },
        )?;
        self.capture = Some(handle);
        Ok(())
    }

    async fn stop_capture(&mut self) {
        if let Some(capture) = self.capture.take() {
            let frames = capture.frames_sent();
            capture.stop().await;
            debug!(frames, "Capture released");
        }
    }

    async fn stop_playback(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.cancel.cancel();
            if let Err(e) = pump.task.await {
                error!("Playback pump failed: {}", e);
            }
        }
    }

    /// Release devices, close the protocol session, and drain its events.
    async fn teardown(&mut self) {
        self.stop_capture().await;
        if let Some(protocol) = self.protocol.as_mut() {
            if let Err(e) = protocol.disconnect().await {
                error!("Disconnect failed: {}", e);
            }
        }
        self.stop_playback().await;
        self.protocol = None;
        if let Some(forwarder) = self.forwarder.take() {
            if let Err(e) = forwarder.await {
                error!("Event forwarder failed: {}", e);
            }
        }
    }

    /// Close the conversation and release both audio devices.
    ///
    /// Safe to call in any state; a second call does nothing.
    pub async fn disconnect(&mut self) -> RealtimeResult<()> {
        if self.protocol.is_none() && self.capture.is_none() && self.pump.is_none() {
            debug!(state = %self.state(), "Disconnect is a no-op");
            return Ok(());
        }
        info!(session_id = ?self.session_id(), "Disconnecting");
        self.teardown().await;
        Ok(())
    }

    /// Send a typed user message.
    pub async fn send_text(&self, text: &str) -> RealtimeResult<()> {
        let result = match self.protocol("send text") {
            Ok(protocol) => protocol.send_text(text).await,
            Err(e) => Err(e),
        };
        self.surface(result)
    }

    /// Send one frame of user audio. Dropped while muted.
    pub async fn send_audio(&self, frame: AudioFrame) -> RealtimeResult<()> {
        let result = match self.protocol("send audio") {
            Ok(_) if self.muted => {
                trace!("Muted, dropping audio frame");
                Ok(())
            }
            Ok(protocol) => protocol.send_audio(frame).await,
            Err(e) => Err(e),
        };
        self.surface(result)
    }

    /// Stop the assistant. Local playback is silenced before the cancel is
    /// sent. Returns the number of dropped frames.
    pub async fn interrupt(&self) -> RealtimeResult<usize> {
        let result = match self.protocol("interrupt") {
            Ok(protocol) => protocol.interrupt().await,
            Err(e) => Err(e),
        };
        self.surface(result)
    }

    /// Commit buffered input audio as a user turn.
    pub async fn commit_audio(&self) -> RealtimeResult<()> {
        let result = match self.protocol("commit audio") {
            Ok(protocol) => protocol.commit_audio().await,
            Err(e) => Err(e),
        };
        self.surface(result)
    }

    /// Mute or unmute the microphone. Capture stops while muted and resumes
    /// when unmuted if the session is active.
    pub async fn set_muted(&mut self, muted: bool) -> RealtimeResult<()> {
        if self.muted == muted {
            return Ok(());
        }
        self.muted = muted;
        info!(muted, "Microphone mute changed");

        if muted {
            self.stop_capture().await;
            Ok(())
        } else if self.state() == SessionState::Active {
            let result = self.start_capture();
            self.surface(result)
        } else {
            Ok(())
        }
    }

    /// Whether the capture loop is running.
    pub fn is_capturing(&self) -> bool {
        self.capture.as_ref().is_some_and(|c| !c.is_finished())
    }
}

/// Relay protocol events to the caller, recording final transcripts.
fn spawn_forwarder(
    mut internal: mpsc::UnboundedReceiver<SessionEvent>,
    events: mpsc::UnboundedSender<SessionEvent>,
    transcript: Arc<Mutex<Vec<TranscriptEntry>>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = internal.recv().await {
            if let SessionEvent::Transcript(entry) = &event {
                if entry.is_final {
                    transcript.lock().push(entry.clone());
                }
            }
            if events.send(event).is_err() {
                trace!("Session event dropped, no listener");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::{MemoryCaptureDevice, MemoryPlaybackDevice};

    fn config() -> RealtimeConfig {
        RealtimeConfig {
            api_key: "test_key".to_string(),
            endpoint_url: Some("ws://127.0.0.1:1/realtime".to_string()),
            connect_timeout_ms: 2000,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_requires_api_key() {
        let result = VoiceSession::builder(RealtimeConfig::default()).build();
        assert!(matches!(result, Err(RealtimeError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_new_session_is_idle() {
        let mut session = VoiceSession::builder(config()).build().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.take_events().is_some());
        assert!(session.take_events().is_none());
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_send_text_while_idle_is_reported() {
        let mut session = VoiceSession::builder(config()).build().unwrap();
        let mut events = session.take_events().unwrap();

        let result = session.send_text("hello").await;
        assert!(matches!(
            result,
            Err(RealtimeError::InvalidState {
                state: SessionState::Idle,
                ..
            })
        ));
        match events.try_recv().unwrap() {
            SessionEvent::Error(error) => {
                assert_eq!(error.kind, crate::core::realtime::ErrorKind::InvalidState)
            }
            other => panic!("Expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_connect_releases_playback_device() {
        let playback = Arc::new(MemoryPlaybackDevice::new(48000));
        let capture = Arc::new(MemoryCaptureDevice::new(48000));
        let mut session = VoiceSession::builder(config())
            .playback_device(playback.clone())
            .capture_device(capture.clone())
            .build()
            .unwrap();

        let result = session.connect().await;
        assert!(matches!(result, Err(RealtimeError::ConnectionFailed(_))));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!playback.is_open());
        assert!(!capture.is_open());
        assert_eq!(capture.open_count(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_speaker_aborts_connect() {
        struct NoSpeaker;
        impl PlaybackDevice for NoSpeaker {
            fn name(&self) -> String {
                "none".to_string()
            }
            fn open(&self) -> crate::core::audio::DeviceResult<Box<dyn crate::core::audio::PlaybackSink>> {
                Err(crate::core::audio::DeviceError::Unavailable("no speaker".to_string()))
            }
        }

        let mut session = VoiceSession::builder(config())
            .playback_device(Arc::new(NoSpeaker))
            .build()
            .unwrap();
        let result = session.connect().await;
        assert!(matches!(result, Err(RealtimeError::Device(_))));
    }

    #[tokio::test]
    async fn test_mute_toggle_while_idle() {
        let mut session = VoiceSession::builder(config()).build().unwrap();
        session.set_muted(true).await.unwrap();
        assert!(session.is_muted());
        session.set_muted(false).await.unwrap();
        assert!(!session.is_muted());
        assert!(!session.is_capturing());
    }

    #[tokio::test]
    async fn test_disconnect_idle_is_noop() {
        let mut session = VoiceSession::builder(config()).build().unwrap();
        session.disconnect().await.unwrap();
        session.disconnect().await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }
}
