//! OpenAI Realtime protocol session.
//!
//! One connection task owns the WebSocket. It multiplexes the outbound queue
//! and inbound server events in a single `select!` loop, so all frames leave
//! in the order they were queued. Tool calls run on their own tasks and feed
//! their results back through the same queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use http::header::AUTHORIZATION;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::config::{
    Modality, OPENAI_BETA_HEADER, OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL,
    OpenAIRealtimeVoice, PCM16_FORMAT,
};
use super::messages::{
    ApiError, ClientEvent, InputAudioTranscription, MaxTokens, OutboundEnvelope, ServerEvent,
    SessionConfig, ToolDef, TurnDetection,
};
use crate::core::audio::{AudioFrame, decode_base64_pcm16};
use crate::core::playback::PlaybackScheduler;
use crate::core::realtime::base::{
    RealtimeConfig, RealtimeError, RealtimeResult, SessionEvent, SessionState, TranscriptEntry,
    TranscriptRole,
};
use crate::core::tools::{ToolCall, ToolRegistry, ToolResult};

/// Outbound queue depth. Capture blocks when this many messages are waiting.
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Server error code for a cancel that arrived after the response finished.
const CANCEL_NOT_ACTIVE_CODE: &str = "response_cancel_not_active";

/// Messages queued for the connection task.
#[derive(Debug)]
pub(crate) enum Outbound {
    Event(ClientEvent),
    Audio(AudioFrame),
}

impl Outbound {
    fn into_event(self) -> ClientEvent {
        match self {
            Outbound::Event(event) => event,
            Outbound::Audio(frame) => ClientEvent::audio_append(&frame),
        }
    }
}

// =============================================================================
// Shared State
// =============================================================================

/// Whether assistant audio may reach the playback scheduler.
///
/// A local interrupt closes the gate. It reopens only on the first
/// `response.created` after the cancelled response has finished, so audio
/// from the cancelled response is dropped even when its `response.created`
/// arrives after the interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum AudioGate {
    #[default]
    Open,
    /// The cancelled response has not reported `response.done` yet
    Cancelling,
    /// The cancelled response is done; the next response reopens the gate
    AwaitingNextResponse,
}

/// State visible to both the session handle and its background tasks.
struct Shared {
    state: watch::Sender<SessionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
    session_id: Mutex<Option<String>>,
    /// Failure that ended a connect attempt, handed back to `connect()`.
    connect_failure: Mutex<Option<RealtimeError>>,
    audio_gate: Mutex<AudioGate>,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Apply a legal transition and announce it. Illegal ones are ignored.
    fn transition(&self, next: SessionState) -> bool {
        let mut from = SessionState::Idle;
        let moved = self.state.send_if_modified(|current| {
            from = *current;
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });

        if moved {
            info!(from = %from, to = %next, "Session state changed");
            self.emit(SessionEvent::ConnectionStateChanged(next));
        } else {
            debug!(from = %from, to = %next, "Ignoring state transition");
        }
        moved
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("Session event dropped, no listener");
        }
    }

    fn report(&self, error: &RealtimeError) {
        self.emit(SessionEvent::Error(error.to_connection_error()));
    }

    /// Move to Errored because of `error`.
    ///
    /// While connecting the error is kept for `connect()` to return; once
    /// active it is reported as an event. During shutdown it is only logged.
    fn fail(&self, error: RealtimeError) {
        match self.state() {
            SessionState::Connecting => {
                warn!("Connect attempt failed: {}", error);
                *self.connect_failure.lock() = Some(error);
                self.transition(SessionState::Errored);
            }
            SessionState::Active => {
                error!("Session failed: {}", error);
                self.report(&error);
                self.transition(SessionState::Errored);
            }
            state => debug!(state = %state, "Ignoring failure after session ended: {}", error),
        }
    }
}

// =============================================================================
// Audio Sender
// =============================================================================

/// Cloneable handle for pushing captured audio into an active session.
#[derive(Clone)]
pub struct AudioSender {
    tx: mpsc::Sender<Outbound>,
    state: watch::Receiver<SessionState>,
}

impl AudioSender {
    fn ensure_active(&self) -> RealtimeResult<()> {
        let state = *self.state.borrow();
        if state == SessionState::Active {
            Ok(())
        } else {
            Err(RealtimeError::InvalidState {
                operation: "send audio",
                state,
            })
        }
    }

    /// Queue a frame, waiting for room in the outbound queue.
    pub async fn send(&self, frame: AudioFrame) -> RealtimeResult<()> {
        self.ensure_active()?;
        self.tx
            .send(Outbound::Audio(frame))
            .await
            .map_err(|_| RealtimeError::ConnectionClosed("outbound queue closed".to_string()))
    }

    /// Queue a frame from a blocking thread.
    ///
    /// Never drops the frame: a full queue blocks the caller for up to
    /// `stall_timeout`, after which the send fails.
    pub fn send_blocking(
        &self,
        runtime: &Handle,
        frame: AudioFrame,
        stall_timeout: Duration,
    ) -> RealtimeResult<()> {
        self.ensure_active()?;
        match self.tx.try_send(Outbound::Audio(frame)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(RealtimeError::ConnectionClosed(
                "outbound queue closed".to_string(),
            )),
            Err(TrySendError::Full(pending)) => {
                trace!("Outbound queue full, waiting");
                runtime
                    .block_on(self.tx.send_timeout(pending, stall_timeout))
                    .map_err(|e| match e {
                        SendTimeoutError::Timeout(_) => RealtimeError::Timeout(format!(
                            "outbound audio blocked for {}ms",
                            stall_timeout.as_millis()
                        )),
                        SendTimeoutError::Closed(_) => {
                            RealtimeError::ConnectionClosed("outbound queue closed".to_string())
                        }
                    })
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(
        capacity: usize,
        state: SessionState,
    ) -> (Self, mpsc::Receiver<Outbound>, watch::Sender<SessionState>) {
        let (tx, rx) = mpsc::channel(capacity);
        let (state_tx, state_rx) = watch::channel(state);
        (
            Self {
                tx,
                state: state_rx,
            },
            rx,
            state_tx,
        )
    }
}

// =============================================================================
// Realtime Session
// =============================================================================

/// A single connection to the OpenAI Realtime API.
///
/// A session connects once. After it is closed a new one must be created.
pub struct RealtimeSession {
    config: RealtimeConfig,
    registry: Arc<ToolRegistry>,
    playback: Arc<PlaybackScheduler>,
    shared: Arc<Shared>,
    outbound: Option<mpsc::Sender<Outbound>>,
    cancel: CancellationToken,
    tool_tasks: TaskTracker,
    connection_task: Option<JoinHandle<()>>,
}

impl RealtimeSession {
    /// Create an idle session. Nothing is sent until [`connect`](Self::connect).
    pub fn new(
        config: RealtimeConfig,
        registry: Arc<ToolRegistry>,
        playback: Arc<PlaybackScheduler>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> RealtimeResult<Self> {
        if config.api_key.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }

        let (state, _) = watch::channel(SessionState::Idle);
        Ok(Self {
            config,
            registry,
            playback,
            shared: Arc::new(Shared {
                state,
                events,
                session_id: Mutex::new(None),
                connect_failure: Mutex::new(None),
                audio_gate: Mutex::new(AudioGate::Open),
            }),
            outbound: None,
            cancel: CancellationToken::new(),
            tool_tasks: TaskTracker::new(),
            connection_task: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Watch state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Server-assigned session id, once `session.created` has arrived.
    pub fn session_id(&self) -> Option<String> {
        self.shared.session_id.lock().clone()
    }

    /// WebSocket URL for this configuration.
    pub fn endpoint_url(&self) -> RealtimeResult<Url> {
        let url = match &self.config.endpoint_url {
            Some(endpoint) => Url::parse(endpoint),
            None => Url::parse_with_params(OPENAI_REALTIME_URL, &[("model", &self.config.model)]),
        }
        .map_err(|e| RealtimeError::InvalidConfiguration(format!("invalid endpoint URL: {e}")))?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            scheme => Err(RealtimeError::InvalidConfiguration(format!(
                "endpoint URL must use ws or wss, got {scheme}"
            ))),
        }
    }

    /// The `session.update` payload sent on connect.
    pub fn session_config(&self) -> SessionConfig {
        let tools: Vec<ToolDef> = self
            .registry
            .definitions()
            .into_iter()
            .map(|def| ToolDef {
                tool_type: "function".to_string(),
                name: def.name,
                description: Some(def.description),
                parameters: Some(def.parameters),
            })
            .collect();
        let tool_choice = if tools.is_empty() {
            None
        } else {
            self.config.tool_choice.clone()
        };

        let voice = self
            .config
            .voice
            .parse::<OpenAIRealtimeVoice>()
            .unwrap_or_else(|e| {
                warn!("{}, using {}", e, OpenAIRealtimeVoice::default());
                OpenAIRealtimeVoice::default()
            });

        SessionConfig {
            modalities: Some(vec![
                Modality::Text.as_str().to_string(),
                Modality::Audio.as_str().to_string(),
            ]),
            instructions: self.config.instructions.clone(),
            voice: Some(voice.as_str().to_string()),
            input_audio_format: Some(PCM16_FORMAT.to_string()),
            output_audio_format: Some(PCM16_FORMAT.to_string()),
            input_audio_transcription: self.config.input_audio_transcription.as_ref().map(|t| {
                InputAudioTranscription {
                    model: t.model.clone(),
                }
            }),
            turn_detection: self
                .config
                .turn_detection
                .as_ref()
                .map(|td| TurnDetection::ServerVad {
                    threshold: td.threshold,
                    prefix_padding_ms: td.prefix_padding_ms,
                    silence_duration_ms: td.silence_duration_ms,
                    create_response: None,
                    interrupt_response: None,
                }),
            tools,
            tool_choice,
            temperature: self.config.temperature,
            max_response_output_tokens: Some(MaxTokens::from_limit(
                self.config.max_response_output_tokens,
            )),
        }
    }

    /// Open the WebSocket, configure the session, and wait for the server to
    /// acknowledge it.
    ///
    /// On failure the session is left Errored and the connection is torn down.
    pub async fn connect(&mut self) -> RealtimeResult<()> {
        let state = self.state();
        if state != SessionState::Idle {
            return Err(RealtimeError::InvalidState {
                operation: "connect",
                state,
            });
        }

        let url = self.endpoint_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::InvalidConfiguration(format!("invalid request: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|_| RealtimeError::InvalidConfiguration("malformed API key".to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static(OPENAI_BETA_HEADER));

        self.shared.transition(SessionState::Connecting);
        info!(url = %url, model = %self.config.model, "Connecting to realtime endpoint");

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let ws_stream = match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request))
            .await
        {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                let error = map_connect_error(e);
                self.shared.transition(SessionState::Errored);
                return Err(error);
            }
            Err(_) => {
                self.shared.transition(SessionState::Errored);
                return Err(RealtimeError::Timeout(format!(
                    "WebSocket handshake took longer than {}ms",
                    self.config.connect_timeout_ms
                )));
            }
        };
        debug!("WebSocket connected, configuring session");

        let (tx, rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let inbound = InboundHandler {
            shared: self.shared.clone(),
            registry: self.registry.clone(),
            playback: self.playback.clone(),
            outbound: tx.clone(),
            cancel: self.cancel.clone(),
            tool_tasks: self.tool_tasks.clone(),
            flush_on_speech_start: self.config.flush_on_speech_start,
            function_names: HashMap::new(),
            interim: HashMap::new(),
        };
        self.connection_task = Some(tokio::spawn(run_connection(
            ws_stream,
            rx,
            inbound,
            self.cancel.clone(),
        )));
        self.outbound = Some(tx.clone());

        let update = ClientEvent::SessionUpdate {
            session: self.session_config(),
        };
        if tx.send(Outbound::Event(update)).await.is_err() {
            self.shared.transition(SessionState::Errored);
            self.shutdown_connection().await;
            return Err(RealtimeError::ConnectionClosed(
                "connection ended before configuration was sent".to_string(),
            ));
        }

        let mut state_rx = self.shared.state.subscribe();
        let outcome = match tokio::time::timeout(
            timeout,
            state_rx.wait_for(|s| *s != SessionState::Connecting),
        )
        .await
        {
            Ok(Ok(state)) => Ok(*state),
            Ok(Err(_)) => Err(RealtimeError::ConnectionClosed(
                "session dropped while connecting".to_string(),
            )),
            Err(_) => Err(RealtimeError::Timeout(format!(
                "no session acknowledgement within {}ms",
                self.config.connect_timeout_ms
            ))),
        };

        match outcome {
            Ok(SessionState::Active) => {
                info!(session_id = ?self.session_id(), "Realtime session active");
                Ok(())
            }
            Ok(state) => {
                let error = self.shared.connect_failure.lock().take().unwrap_or_else(|| {
                    RealtimeError::ConnectionFailed(format!("session ended while connecting ({state})"))
                });
                self.shutdown_connection().await;
                Err(error)
            }
            Err(e) => {
                self.shared.transition(SessionState::Errored);
                self.shutdown_connection().await;
                Err(e)
            }
        }
    }

    fn sender(&self, operation: &'static str) -> RealtimeResult<&mpsc::Sender<Outbound>> {
        let state = self.state();
        match (&self.outbound, state) {
            (Some(tx), SessionState::Active) => Ok(tx),
            _ => Err(RealtimeError::InvalidState { operation, state }),
        }
    }

    async fn enqueue(&self, operation: &'static str, event: ClientEvent) -> RealtimeResult<()> {
        self.sender(operation)?
            .send(Outbound::Event(event))
            .await
            .map_err(|_| RealtimeError::ConnectionClosed("outbound queue closed".to_string()))
    }

    /// Send a typed user message and ask for a response.
    pub async fn send_text(&self, text: &str) -> RealtimeResult<()> {
        self.enqueue("send text", ClientEvent::user_text(text)).await?;
        self.enqueue("send text", ClientEvent::ResponseCreate).await
    }

    /// Append a captured frame to the server's input buffer.
    pub async fn send_audio(&self, frame: AudioFrame) -> RealtimeResult<()> {
        self.audio_sender()?.send(frame).await
    }

    /// Commit the input buffer as a user turn.
    pub async fn commit_audio(&self) -> RealtimeResult<()> {
        self.enqueue("commit audio", ClientEvent::InputAudioBufferCommit)
            .await
    }

    /// Discard uncommitted input audio.
    pub async fn clear_audio(&self) -> RealtimeResult<()> {
        self.enqueue("clear audio", ClientEvent::InputAudioBufferClear)
            .await
    }

    /// Stop the assistant mid-response.
    ///
    /// Queued playback is flushed before anything goes to the network.
    /// Returns the number of frames dropped.
    pub async fn interrupt(&self) -> RealtimeResult<usize> {
        let tx = self.sender("interrupt")?;
        // Close the gate first so no delta is scheduled behind the flush.
        *self.shared.audio_gate.lock() = AudioGate::Cancelling;
        let dropped = self.playback.flush();
        debug!(dropped, "Interrupted playback");

        tx.send(Outbound::Event(ClientEvent::ResponseCancel))
            .await
            .map_err(|_| RealtimeError::ConnectionClosed("outbound queue closed".to_string()))?;
        Ok(dropped)
    }

    /// A sender capture can use from its own thread.
    pub fn audio_sender(&self) -> RealtimeResult<AudioSender> {
        let tx = self.sender("send audio")?;
        Ok(AudioSender {
            tx: tx.clone(),
            state: self.shared.state.subscribe(),
        })
    }

    /// Close the connection. Safe to call in any state.
    pub async fn disconnect(&mut self) -> RealtimeResult<()> {
        let state = self.state();
        if matches!(
            state,
            SessionState::Idle | SessionState::Closing | SessionState::Closed
        ) {
            debug!(state = %state, "Disconnect is a no-op");
            return Ok(());
        }

        self.shared.transition(SessionState::Closing);
        let dropped = self.playback.flush();
        if dropped > 0 {
            debug!(dropped, "Dropped queued playback on disconnect");
        }
        self.shutdown_connection().await;
        self.shared.transition(SessionState::Closed);
        Ok(())
    }

    /// Stop the connection task and any in-flight tool calls.
    async fn shutdown_connection(&mut self) {
        self.outbound = None;
        self.cancel.cancel();
        if let Some(task) = self.connection_task.take() {
            if let Err(e) = task.await {
                error!("Connection task failed: {}", e);
            }
        }
        self.tool_tasks.close();
        self.tool_tasks.wait().await;
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn map_connect_error(error: WsError) -> RealtimeError {
    match error {
        WsError::Http(response) => {
            let status = response.status();
            if status == http::StatusCode::UNAUTHORIZED || status == http::StatusCode::FORBIDDEN {
                RealtimeError::AuthenticationFailed(format!("server rejected credentials ({status})"))
            } else {
                RealtimeError::ConnectionFailed(format!("handshake rejected with HTTP {status}"))
            }
        }
        other => RealtimeError::ConnectionFailed(other.to_string()),
    }
}

// =============================================================================
// Connection Task
// =============================================================================

async fn run_connection<S>(
    ws_stream: S,
    mut rx: mpsc::Receiver<Outbound>,
    mut inbound: InboundHandler,
    cancel: CancellationToken,
) where
    S: futures_util::Stream<Item = Result<Message, WsError>>
        + futures_util::Sink<Message, Error = WsError>
        + Unpin,
{
    let (mut sink, mut stream) = ws_stream.split();
    let shared = inbound.shared.clone();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!("Close frame not sent: {}", e);
                }
                break;
            }

            outbound = rx.recv() => {
                let Some(outbound) = outbound else { break };
                let event = outbound.into_event();
                let kind = event.kind();
                let json = match serde_json::to_string(&OutboundEnvelope::new(event)) {
                    Ok(json) => json,
                    Err(e) => {
                        let error = RealtimeError::Serialization(format!("{kind}: {e}"));
                        error!("{}", error);
                        shared.report(&error);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    shared.fail(RealtimeError::ConnectionClosed(format!("send failed: {e}")));
                    break;
                }
                trace!(event = kind, "Sent client event");
            }

            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => inbound.handle(event),
                            Err(e) => shared.fail(RealtimeError::Protocol(format!(
                                "malformed server event: {e}"
                            ))),
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        warn!(len = data.len(), "Ignoring unexpected binary frame");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            shared.fail(RealtimeError::ConnectionClosed(format!("pong failed: {e}")));
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                            .unwrap_or_else(|| "no reason given".to_string());
                        info!(reason = %reason, "Server closed the connection");
                        shared.fail(RealtimeError::ConnectionClosed(reason));
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        shared.fail(RealtimeError::ConnectionClosed(e.to_string()));
                        break;
                    }
                    None => {
                        shared.fail(RealtimeError::ConnectionClosed("stream ended".to_string()));
                        break;
                    }
                }
            }
        }
    }

    debug!("Connection task finished");
}

// =============================================================================
// Inbound Event Handling
// =============================================================================

struct InboundHandler {
    shared: Arc<Shared>,
    registry: Arc<ToolRegistry>,
    playback: Arc<PlaybackScheduler>,
    outbound: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
    tool_tasks: TaskTracker,
    flush_on_speech_start: bool,
    /// call_id -> function name, for servers that only name it in the output item
    function_names: HashMap<String, String>,
    /// Interim transcript text per (role, item_id)
    interim: HashMap<(TranscriptRole, String), String>,
}

impl InboundHandler {
    fn handle(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Error { error } => self.handle_api_error(error),
            ServerEvent::SessionCreated { session } => {
                debug!(
                    session_id = ?session.id,
                    model = ?session.model,
                    expires_at = ?session.expires_at,
                    "Session created"
                );
                if let Some(id) = session.id {
                    *self.shared.session_id.lock() = Some(id);
                }
            }
            ServerEvent::SessionUpdated { session } => {
                info!(
                    voice = ?session.voice,
                    model = ?session.model,
                    tools = session.tools.len(),
                    "Session configuration acknowledged"
                );
                if let Some(id) = session.id {
                    self.shared.session_id.lock().get_or_insert(id);
                }
                if self.shared.state() == SessionState::Connecting {
                    self.shared.transition(SessionState::Active);
                }
            }
            event if self.shared.state() != SessionState::Active => {
                debug!(state = %self.shared.state(), "Dropping server event: {:?}", event);
            }
            ServerEvent::SpeechStarted { audio_start_ms, .. } => {
                debug!(audio_start_ms, "User speech started");
                if self.flush_on_speech_start {
                    let dropped = self.playback.flush();
                    if dropped > 0 {
                        debug!(dropped, "Flushed playback for barge-in");
                    }
                }
                self.shared.emit(SessionEvent::SpeechStarted);
            }
            ServerEvent::SpeechStopped { audio_end_ms, .. } => {
                debug!(audio_end_ms, "User speech stopped");
                self.shared.emit(SessionEvent::SpeechStopped);
            }
            ServerEvent::TranscriptionDelta { item_id, delta } => {
                self.interim_transcript(TranscriptRole::User, item_id, &delta);
            }
            ServerEvent::TranscriptionCompleted {
                item_id,
                transcript,
            } => self.final_transcript(TranscriptRole::User, item_id, transcript),
            ServerEvent::TranscriptionFailed { item_id, error } => {
                warn!(item_id = ?item_id, "Input transcription failed: {}", error);
                if let Some(item_id) = item_id {
                    self.interim.remove(&(TranscriptRole::User, item_id));
                }
                self.shared.report(&RealtimeError::Protocol(format!(
                    "transcription failed: {error}"
                )));
            }
            ServerEvent::TextDelta { item_id, delta }
            | ServerEvent::AudioTranscriptDelta { item_id, delta } => {
                self.interim_transcript(TranscriptRole::Assistant, item_id, &delta);
            }
            ServerEvent::TextDone { item_id, text } => {
                self.final_transcript(TranscriptRole::Assistant, item_id, text)
            }
            ServerEvent::AudioTranscriptDone {
                item_id,
                transcript,
            } => self.final_transcript(TranscriptRole::Assistant, item_id, transcript),
            ServerEvent::AudioDelta { delta, .. } => self.handle_audio(&delta),
            ServerEvent::ResponseCreated { response } => {
                debug!(response_id = ?response.id, "Response started");
                let mut gate = self.shared.audio_gate.lock();
                match *gate {
                    AudioGate::AwaitingNextResponse => *gate = AudioGate::Open,
                    AudioGate::Cancelling => {
                        debug!(response_id = ?response.id, "Response started before its cancel took effect")
                    }
                    AudioGate::Open => {}
                }
            }
            ServerEvent::ResponseDone { response } => {
                debug!(response_id = ?response.id, status = ?response.status, "Response done");
                self.cancelled_response_finished();
                self.shared.emit(SessionEvent::ResponseDone {
                    status: response.status,
                });
            }
            ServerEvent::OutputItemAdded { item } => {
                if item.item_type == "function_call" {
                    if let (Some(call_id), Some(name)) = (item.call_id, item.name) {
                        self.function_names.insert(call_id, name);
                    }
                }
            }
            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
                ..
            } => {
                let remembered = self.function_names.remove(&call_id);
                let name = name.or(remembered).unwrap_or_default();
                self.spawn_tool_call(ToolCall {
                    call_id,
                    name,
                    arguments,
                });
            }
            ServerEvent::FunctionCallArgumentsDelta { call_id, delta } => {
                trace!(call_id = %call_id, len = delta.len(), "Function arguments delta");
            }
            ServerEvent::AudioDone { .. }
            | ServerEvent::OutputItemDone { .. }
            | ServerEvent::ConversationItemCreated { .. }
            | ServerEvent::InputAudioBufferCommitted { .. }
            | ServerEvent::InputAudioBufferCleared
            | ServerEvent::RateLimitsUpdated { .. } => {
                trace!("Informational server event");
            }
            ServerEvent::Unknown => trace!("Ignoring unrecognized server event"),
        }
    }

    fn handle_api_error(&mut self, error: ApiError) {
        if error.code.as_deref() == Some(CANCEL_NOT_ACTIVE_CODE) {
            debug!("Cancel arrived after the response finished");
            self.cancelled_response_finished();
            return;
        }
        let err = if error.is_authentication() {
            RealtimeError::AuthenticationFailed(error.to_string())
        } else {
            RealtimeError::Protocol(error.to_string())
        };
        self.shared.fail(err);
    }

    fn cancelled_response_finished(&self) {
        let mut gate = self.shared.audio_gate.lock();
        if *gate == AudioGate::Cancelling {
            *gate = AudioGate::AwaitingNextResponse;
        }
    }

    fn handle_audio(&mut self, delta: &str) {
        if *self.shared.audio_gate.lock() != AudioGate::Open {
            trace!("Dropping audio from an interrupted response");
            return;
        }
        match decode_base64_pcm16(delta) {
            Ok(samples) if samples.is_empty() => {}
            Ok(samples) => {
                let scheduled = self
                    .playback
                    .schedule(AudioFrame::playback(samples, OPENAI_REALTIME_SAMPLE_RATE));
                trace!(sequence = scheduled.sequence, start = ?scheduled.start, "Scheduled audio");
            }
            Err(e) => {
                self.shared
                    .fail(RealtimeError::Protocol(format!("invalid audio payload: {e}")));
            }
        }
    }

    fn interim_transcript(&mut self, role: TranscriptRole, item_id: String, delta: &str) {
        let text = self.interim.entry((role, item_id.clone())).or_default();
        text.push_str(delta);
        let entry = TranscriptEntry {
            role,
            text: text.clone(),
            is_final: false,
            item_id: Some(item_id),
        };
        self.shared.emit(SessionEvent::Transcript(entry));
    }

    fn final_transcript(&mut self, role: TranscriptRole, item_id: String, text: String) {
        self.interim.remove(&(role, item_id.clone()));
        debug!(role = %role, "Transcript: {}", text);
        self.shared.emit(SessionEvent::Transcript(TranscriptEntry {
            role,
            text,
            is_final: true,
            item_id: Some(item_id),
        }));
    }

    fn spawn_tool_call(&self, call: ToolCall) {
        info!(tool = %call.name, call_id = %call.call_id, "Tool call requested");
        let registry = self.registry.clone();
        let outbound = self.outbound.clone();
        let shared = self.shared.clone();
        let cancel = self.cancel.clone();

        self.tool_tasks.spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(call_id = %call.call_id, "Tool call abandoned on shutdown");
                    return;
                }
                result = registry.dispatch(&call) => result,
            };
            deliver_tool_result(&outbound, &shared, &call, result).await;
        });
    }
}

/// Send a tool result to the model, request the follow-up response, and
/// report the invocation.
async fn deliver_tool_result(
    outbound: &mpsc::Sender<Outbound>,
    shared: &Shared,
    call: &ToolCall,
    result: ToolResult,
) {
    if !result.success {
        warn!(
            tool = %call.name,
            call_id = %call.call_id,
            "Tool call failed: {}",
            result.error_message().unwrap_or("unknown error")
        );
    }

    let output = ClientEvent::function_output(&call.call_id, result.output_json());
    let delivered = outbound.send(Outbound::Event(output)).await.is_ok()
        && outbound
            .send(Outbound::Event(ClientEvent::ResponseCreate))
            .await
            .is_ok();
    if !delivered {
        let error = RealtimeError::Tool(format!(
            "result for call {} could not be delivered",
            call.call_id
        ));
        error!("{}", error);
        shared.report(&error);
    }

    let arguments = call
        .parsed_arguments()
        .unwrap_or_else(|_| Value::String(call.arguments.clone()));
    shared.emit(SessionEvent::ToolInvoked {
        name: call.name.clone(),
        arguments,
        result,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::playback::ManualClock;
    use crate::core::realtime::base::TurnDetectionConfig;
    use crate::core::tools::{FnTool, ToolDefinition, ToolError};
    use serde_json::json;

    fn test_config() -> RealtimeConfig {
        RealtimeConfig {
            api_key: "test_key".to_string(),
            ..Default::default()
        }
    }

    fn scheduler() -> Arc<PlaybackScheduler> {
        Arc::new(PlaybackScheduler::new(Arc::new(ManualClock::new())))
    }

    fn session_with(
        config: RealtimeConfig,
        registry: ToolRegistry,
    ) -> (RealtimeSession, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = RealtimeSession::new(config, Arc::new(registry), scheduler(), tx).unwrap();
        (session, rx)
    }

    fn handler_for(
        state: SessionState,
        flush_on_speech_start: bool,
    ) -> (
        InboundHandler,
        mpsc::Receiver<Outbound>,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::channel(16);
        let (state_tx, _) = watch::channel(state);
        let handler = InboundHandler {
            shared: Arc::new(Shared {
                state: state_tx,
                events: events_tx,
                session_id: Mutex::new(None),
                connect_failure: Mutex::new(None),
                audio_gate: Mutex::new(AudioGate::Open),
            }),
            registry: Arc::new(ToolRegistry::empty()),
            playback: scheduler(),
            outbound: out_tx,
            cancel: CancellationToken::new(),
            tool_tasks: TaskTracker::new(),
            flush_on_speech_start,
            function_names: HashMap::new(),
            interim: HashMap::new(),
        };
        (handler, out_rx, events_rx)
    }

    fn parse(value: Value) -> ServerEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_api_key_required() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = RealtimeSession::new(
            RealtimeConfig::default(),
            Arc::new(ToolRegistry::empty()),
            scheduler(),
            tx,
        );
        assert!(matches!(result, Err(RealtimeError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_new_session_is_idle() {
        let (session, _rx) = session_with(test_config(), ToolRegistry::empty());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.session_id().is_none());
    }

    #[test]
    fn test_endpoint_url_defaults_to_model_query() {
        let (session, _rx) = session_with(test_config(), ToolRegistry::empty());
        let url = session.endpoint_url().unwrap();
        assert_eq!(url.as_str(), "wss://api.openai.com/v1/realtime?model=gpt-realtime");
    }

    #[test]
    fn test_endpoint_url_rejects_http() {
        let config = RealtimeConfig {
            endpoint_url: Some("https://example.com/realtime".to_string()),
            ..test_config()
        };
        let (session, _rx) = session_with(config, ToolRegistry::empty());
        assert!(matches!(
            session.endpoint_url(),
            Err(RealtimeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_session_config_includes_tools() {
        let mut builder = ToolRegistry::builder();
        builder
            .register(
                ToolDefinition::new("ping", "Reply with pong", json!({"type": "object", "properties": {}})),
                Arc::new(FnTool::new(|_args: Value| async move {
                    Ok::<_, ToolError>(json!({"reply": "pong"}))
                })),
            )
            .unwrap();
        let config = RealtimeConfig {
            voice: "marin".to_string(),
            turn_detection: Some(TurnDetectionConfig::default()),
            ..test_config()
        };
        let (session, _rx) = session_with(config, builder.build());

        let session_config = serde_json::to_value(session.session_config()).unwrap();
        assert_eq!(session_config["voice"], "marin");
        assert_eq!(session_config["input_audio_format"], "pcm16");
        assert_eq!(session_config["turn_detection"]["type"], "server_vad");
        assert_eq!(session_config["tools"][0]["name"], "ping");
        assert_eq!(session_config["tools"][0]["type"], "function");
        assert_eq!(session_config["tool_choice"], "auto");
    }

    #[test]
    fn test_session_config_without_tools_omits_tool_choice() {
        let (session, _rx) = session_with(test_config(), ToolRegistry::empty());
        let session_config = serde_json::to_value(session.session_config()).unwrap();
        assert!(session_config.get("tools").is_none());
        assert!(session_config.get("tool_choice").is_none());
    }

    #[test]
    fn test_session_config_token_limit() {
        let (session, _rx) = session_with(test_config(), ToolRegistry::empty());
        let session_config = serde_json::to_value(session.session_config()).unwrap();
        assert_eq!(session_config["max_response_output_tokens"], 4096);

        let config = RealtimeConfig {
            max_response_output_tokens: None,
            ..test_config()
        };
        let (session, _rx) = session_with(config, ToolRegistry::empty());
        let session_config = serde_json::to_value(session.session_config()).unwrap();
        assert_eq!(session_config["max_response_output_tokens"], "inf");
    }

    #[tokio::test]
    async fn test_send_text_requires_active_session() {
        let (session, _rx) = session_with(test_config(), ToolRegistry::empty());
        match session.send_text("hello").await {
            Err(RealtimeError::InvalidState { operation, state }) => {
                assert_eq!(operation, "send text");
                assert_eq!(state, SessionState::Idle);
            }
            other => panic!("Expected InvalidState, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_audio_requires_active_session() {
        let (session, _rx) = session_with(test_config(), ToolRegistry::empty());
        let frame = AudioFrame::capture(vec![0; 240], 24000);
        assert!(matches!(
            session.send_audio(frame).await,
            Err(RealtimeError::InvalidState { .. })
        ));
        assert!(session.audio_sender().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_idle_is_noop() {
        let (mut session, mut rx) = session_with(test_config(), ToolRegistry::empty());
        session.disconnect().await.unwrap();
        session.disconnect().await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_refused_leaves_errored() {
        let config = RealtimeConfig {
            endpoint_url: Some("ws://127.0.0.1:1/realtime".to_string()),
            connect_timeout_ms: 2000,
            ..test_config()
        };
        let (mut session, mut rx) = session_with(config, ToolRegistry::empty());

        let result = session.connect().await;
        assert!(matches!(result, Err(RealtimeError::ConnectionFailed(_))));
        assert_eq!(session.state(), SessionState::Errored);

        assert_eq!(
            rx.recv().await,
            Some(SessionEvent::ConnectionStateChanged(SessionState::Connecting))
        );
        assert_eq!(
            rx.recv().await,
            Some(SessionEvent::ConnectionStateChanged(SessionState::Errored))
        );

        session.disconnect().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_map_connect_error_unauthorized() {
        let response = http::Response::builder()
            .status(401)
            .body(None)
            .unwrap();
        assert!(matches!(
            map_connect_error(WsError::Http(response.into())),
            RealtimeError::AuthenticationFailed(_)
        ));

        let response = http::Response::builder()
            .status(500)
            .body(None)
            .unwrap();
        assert!(matches!(
            map_connect_error(WsError::Http(response.into())),
            RealtimeError::ConnectionFailed(_)
        ));
    }

    #[test]
    fn test_session_updated_activates() {
        let (mut handler, _out, mut events) = handler_for(SessionState::Connecting, true);
        handler.handle(parse(json!({"type": "session.created", "session": {"id": "sess_1"}})));
        assert_eq!(handler.shared.state(), SessionState::Connecting);

        handler.handle(parse(json!({"type": "session.updated", "session": {}})));
        assert_eq!(handler.shared.state(), SessionState::Active);
        assert_eq!(handler.shared.session_id.lock().as_deref(), Some("sess_1"));
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::ConnectionStateChanged(SessionState::Active)
        );
    }

    #[test]
    fn test_error_while_connecting_is_kept_for_connect() {
        let (mut handler, _out, mut events) = handler_for(SessionState::Connecting, true);
        handler.handle(parse(json!({
            "type": "error",
            "error": {"type": "invalid_request_error", "code": "invalid_api_key", "message": "bad key"}
        })));

        assert_eq!(handler.shared.state(), SessionState::Errored);
        assert!(matches!(
            handler.shared.connect_failure.lock().take(),
            Some(RealtimeError::AuthenticationFailed(_))
        ));
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::ConnectionStateChanged(SessionState::Errored)
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_error_while_active_is_reported() {
        let (mut handler, _out, mut events) = handler_for(SessionState::Active, true);
        handler.handle(parse(json!({
            "type": "error",
            "error": {"type": "server_error", "message": "boom"}
        })));

        assert_eq!(handler.shared.state(), SessionState::Errored);
        match events.try_recv().unwrap() {
            SessionEvent::Error(error) => {
                assert_eq!(error.kind, crate::core::realtime::base::ErrorKind::Protocol);
                assert!(error.message.contains("boom"));
            }
            other => panic!("Expected error event, got {other:?}"),
        }
    }

    #[test]
    fn test_late_cancel_error_is_ignored() {
        let (mut handler, _out, mut events) = handler_for(SessionState::Active, true);
        handler.handle(parse(json!({
            "type": "error",
            "error": {"type": "invalid_request_error", "code": "response_cancel_not_active", "message": "no response"}
        })));
        assert_eq!(handler.shared.state(), SessionState::Active);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_transcript_deltas_accumulate() {
        let (mut handler, _out, mut events) = handler_for(SessionState::Active, true);
        for delta in ["Bon", "jour"] {
            handler.handle(parse(json!({
                "type": "response.audio_transcript.delta",
                "item_id": "item_1",
                "delta": delta
            })));
        }
        handler.handle(parse(json!({
            "type": "response.audio_transcript.done",
            "item_id": "item_1",
            "transcript": "Bonjour"
        })));

        let texts: Vec<(String, bool)> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|event| match event {
                SessionEvent::Transcript(entry) => {
                    assert_eq!(entry.role, TranscriptRole::Assistant);
                    Some((entry.text, entry.is_final))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            texts,
            vec![
                ("Bon".to_string(), false),
                ("Bonjour".to_string(), false),
                ("Bonjour".to_string(), true),
            ]
        );
        assert!(handler.interim.is_empty());
    }

    #[test]
    fn test_user_transcripts_tracked_per_item() {
        let (mut handler, _out, mut events) = handler_for(SessionState::Active, true);
        for (item_id, delta) in [("item_a", "Bon"), ("item_b", "Sal"), ("item_a", "jour")] {
            handler.handle(parse(json!({
                "type": "conversation.item.input_audio_transcription.delta",
                "item_id": item_id,
                "delta": delta
            })));
        }
        // Same item id on the assistant side is a separate entry.
        handler.handle(parse(json!({
            "type": "response.audio_transcript.delta",
            "item_id": "item_a",
            "delta": "Oui"
        })));
        assert_eq!(handler.interim.len(), 3);

        handler.handle(parse(json!({
            "type": "conversation.item.input_audio_transcription.completed",
            "item_id": "item_a",
            "transcript": "Bonjour"
        })));
        assert_eq!(handler.interim.len(), 2);
        assert!(handler.interim.contains_key(&(TranscriptRole::Assistant, "item_a".to_string())));

        let entries: Vec<TranscriptEntry> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|event| match event {
                SessionEvent::Transcript(entry) => Some(entry),
                _ => None,
            })
            .collect();
        let user: Vec<(&str, bool)> = entries
            .iter()
            .filter(|entry| entry.role == TranscriptRole::User)
            .map(|entry| (entry.text.as_str(), entry.is_final))
            .collect();
        assert_eq!(
            user,
            vec![("Bon", false), ("Sal", false), ("Bonjour", false), ("Bonjour", true)]
        );
    }

    #[test]
    fn test_audio_delta_schedules_playback() {
        let (mut handler, _out, _events) = handler_for(SessionState::Active, true);
        let samples = vec![100i16; 240];
        handler.handle(parse(json!({
            "type": "response.audio.delta",
            "delta": crate::core::audio::encode_base64_pcm16(&samples)
        })));
        assert_eq!(handler.playback.pending_len(), 1);
    }

    #[test]
    fn test_invalid_audio_payload_is_protocol_error() {
        let (mut handler, _out, _events) = handler_for(SessionState::Active, true);
        handler.handle(parse(json!({"type": "response.audio.delta", "delta": "%%%"})));
        assert_eq!(handler.shared.state(), SessionState::Errored);
        assert_eq!(handler.playback.pending_len(), 0);
    }

    #[test]
    fn test_speech_started_flushes_playback() {
        let (mut handler, _out, mut events) = handler_for(SessionState::Active, true);
        handler
            .playback
            .schedule(AudioFrame::playback(vec![0; 240], 24000));
        handler.handle(parse(json!({"type": "input_audio_buffer.speech_started", "audio_start_ms": 120})));
        assert_eq!(handler.playback.pending_len(), 0);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::SpeechStarted);
    }

    #[test]
    fn test_speech_started_keeps_playback_when_disabled() {
        let (mut handler, _out, _events) = handler_for(SessionState::Active, false);
        handler
            .playback
            .schedule(AudioFrame::playback(vec![0; 240], 24000));
        handler.handle(parse(json!({"type": "input_audio_buffer.speech_started"})));
        assert_eq!(handler.playback.pending_len(), 1);
    }

    fn audio_delta() -> Value {
        json!({
            "type": "response.audio.delta",
            "delta": crate::core::audio::encode_base64_pcm16(&[1, 2, 3, 4])
        })
    }

    #[test]
    fn test_interrupted_response_stays_silent_until_done() {
        let (mut handler, _out, _events) = handler_for(SessionState::Active, true);
        *handler.shared.audio_gate.lock() = AudioGate::Cancelling;

        // The cancelled response may only start after the interrupt.
        handler.handle(parse(json!({"type": "response.created", "response": {"id": "resp_cancelled"}})));
        handler.handle(parse(audio_delta()));
        assert_eq!(handler.playback.pending_len(), 0);

        handler.handle(parse(json!({
            "type": "response.done",
            "response": {"id": "resp_cancelled", "status": "cancelled"}
        })));
        handler.handle(parse(audio_delta()));
        assert_eq!(handler.playback.pending_len(), 0);

        handler.handle(parse(json!({"type": "response.created", "response": {"id": "resp_next"}})));
        handler.handle(parse(audio_delta()));
        assert_eq!(handler.playback.pending_len(), 1);
        assert_eq!(*handler.shared.audio_gate.lock(), AudioGate::Open);
    }

    #[test]
    fn test_late_cancel_reopens_on_next_response() {
        let (mut handler, _out, _events) = handler_for(SessionState::Active, true);
        *handler.shared.audio_gate.lock() = AudioGate::Cancelling;

        handler.handle(parse(audio_delta()));
        handler.handle(parse(json!({
            "type": "error",
            "error": {"type": "invalid_request_error", "code": "response_cancel_not_active", "message": "no response"}
        })));
        assert_eq!(*handler.shared.audio_gate.lock(), AudioGate::AwaitingNextResponse);

        handler.handle(parse(json!({"type": "response.created", "response": {"id": "resp_2"}})));
        handler.handle(parse(audio_delta()));
        assert_eq!(handler.playback.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_returns_failure_and_requests_response() {
        let (mut handler, mut out, mut events) = handler_for(SessionState::Active, true);
        handler.handle(parse(json!({
            "type": "response.output_item.added",
            "item": {"type": "function_call", "call_id": "call_9", "name": "launch_rocket"}
        })));
        handler.handle(parse(json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_9",
            "arguments": "{}"
        })));

        match out.recv().await.unwrap().into_event() {
            ClientEvent::ConversationItemCreate { item } => {
                assert_eq!(item.call_id.as_deref(), Some("call_9"));
                let output: Value = serde_json::from_str(item.output.as_deref().unwrap()).unwrap();
                assert_eq!(output["success"], false);
            }
            other => panic!("Expected function output, got {other:?}"),
        }
        assert!(matches!(
            out.recv().await.unwrap().into_event(),
            ClientEvent::ResponseCreate
        ));

        loop {
            match events.recv().await.unwrap() {
                SessionEvent::ToolInvoked { name, result, .. } => {
                    assert_eq!(name, "launch_rocket");
                    assert!(!result.success);
                    break;
                }
                _ => continue,
            }
        }
        assert_eq!(handler.shared.state(), SessionState::Active);
    }

    #[test]
    fn test_events_dropped_when_not_active() {
        let (mut handler, _out, mut events) = handler_for(SessionState::Errored, true);
        handler.handle(parse(json!({"type": "input_audio_buffer.speech_stopped"})));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_audio_sender_blocks_then_times_out() {
        let (sender, mut rx, _state) = AudioSender::for_test(1, SessionState::Active);
        let runtime = Handle::current();

        let result = tokio::task::spawn_blocking(move || {
            let frame = || AudioFrame::capture(vec![0; 16], 24000);
            sender.send_blocking(&runtime, frame(), Duration::from_millis(50))?;
            sender.send_blocking(&runtime, frame(), Duration::from_millis(50))
        })
        .await
        .unwrap();

        assert!(matches!(result, Err(RealtimeError::Timeout(_))));
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_audio_sender_rejects_inactive_session() {
        let (sender, _rx, state) = AudioSender::for_test(4, SessionState::Active);
        state.send_replace(SessionState::Closing);
        let result = sender.send(AudioFrame::capture(vec![0; 16], 24000)).await;
        assert!(matches!(
            result,
            Err(RealtimeError::InvalidState {
                state: SessionState::Closing,
                ..
            })
        ));
    }
}
