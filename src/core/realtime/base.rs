//! Shared types for the realtime protocol session.
//!
//! # Audio Format
//!
//! All audio on the wire is PCM 16-bit signed little-endian mono at 24kHz.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::audio::DeviceError;
use crate::core::tools::ToolResult;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Could not establish the connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection dropped or was closed by the remote side
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Credentials rejected during connect
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Malformed or unexpected message, or a server-reported error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Outbound message could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Tool handler failure that could not be reported to the model
    #[error("Tool error: {0}")]
    Tool(String),

    /// Microphone or speaker failure
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Operation not permitted in the current session state
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl RealtimeError {
    /// Category reported to the conversation UI.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RealtimeError::ConnectionFailed(_)
            | RealtimeError::ConnectionClosed(_)
            | RealtimeError::Timeout(_) => ErrorKind::Network,
            RealtimeError::AuthenticationFailed(_) => ErrorKind::Authentication,
            RealtimeError::Protocol(_) | RealtimeError::Serialization(_) => ErrorKind::Protocol,
            RealtimeError::Tool(_) => ErrorKind::ToolFailure,
            RealtimeError::Device(_) => ErrorKind::Device,
            RealtimeError::InvalidState { .. } => ErrorKind::InvalidState,
            RealtimeError::InvalidConfiguration(_) => ErrorKind::Configuration,
        }
    }

    /// The UI-facing record for this error.
    pub fn to_connection_error(&self) -> ConnectionError {
        ConnectionError {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Error category surfaced to the conversation UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Protocol,
    Authentication,
    ToolFailure,
    Device,
    InvalidState,
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Network => "network",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Authentication => "authentication",
            ErrorKind::ToolFailure => "tool_failure",
            ErrorKind::Device => "device",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

/// An error as delivered to the conversation UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

// =============================================================================
// Configuration Types
// =============================================================================

/// Parameters negotiated with the remote endpoint on connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// API key sent as a bearer token
    #[serde(skip_serializing)]
    pub api_key: String,

    /// Full WebSocket URL; when unset the OpenAI endpoint for `model` is used
    pub endpoint_url: Option<String>,

    /// Model to use (e.g., "gpt-realtime")
    pub model: String,

    /// Voice for audio output
    pub voice: String,

    /// System instructions for the assistant
    pub instructions: Option<String>,

    /// Temperature for response generation
    pub temperature: Option<f32>,

    /// Maximum response tokens; `None` means unlimited
    pub max_response_output_tokens: Option<u32>,

    /// Input audio transcription; `None` disables user transcripts
    pub input_audio_transcription: Option<InputTranscriptionConfig>,

    /// Server turn detection; `None` disables it
    pub turn_detection: Option<TurnDetectionConfig>,

    /// Tool choice strategy (auto, none, required)
    pub tool_choice: Option<String>,

    /// How long `connect` waits for the session to be acknowledged
    pub connect_timeout_ms: u64,

    /// Flush local playback when the server detects the user speaking
    pub flush_on_speech_start: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint_url: None,
            model: "gpt-realtime".to_string(),
            voice: "coral".to_string(),
            instructions: None,
            temperature: Some(0.8),
            max_response_output_tokens: Some(4096),
            input_audio_transcription: Some(InputTranscriptionConfig::default()),
            turn_detection: Some(TurnDetectionConfig::default()),
            tool_choice: Some("auto".to_string()),
            connect_timeout_ms: 10_000,
            flush_on_speech_start: true,
        }
    }
}

/// Configuration for input audio transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputTranscriptionConfig {
    /// Model to use for transcription (e.g., "whisper-1")
    pub model: String,
}

impl Default for InputTranscriptionConfig {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
        }
    }
}

/// Server-side voice activity detection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnDetectionConfig {
    /// Activation threshold (0.0 to 1.0)
    pub threshold: f32,
    /// Audio included before detected speech (ms)
    pub prefix_padding_ms: u32,
    /// Silence that ends a turn (ms)
    pub silence_duration_ms: u32,
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle of a protocol session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Not yet connected
    #[default]
    Idle,
    /// Socket open, waiting for the session configuration to be acknowledged
    Connecting,
    /// Audio and text may flow
    Active,
    /// Shutting down
    Closing,
    /// Shut down; terminal
    Closed,
    /// Failed; only `disconnect` is allowed
    Errored,
}

impl SessionState {
    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Active)
                | (Connecting, Errored)
                | (Connecting, Closing)
                | (Active, Errored)
                | (Active, Closing)
                | (Errored, Closing)
                | (Closing, Closed)
        )
    }

    /// Whether the session has ended for good.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Active => write!(f, "Active"),
            SessionState::Closing => write!(f, "Closing"),
            SessionState::Closed => write!(f, "Closed"),
            SessionState::Errored => write!(f, "Errored"),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Role of the speaker in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    User,
    Assistant,
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptRole::User => write!(f, "user"),
            TranscriptRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A piece of conversation text.
///
/// Interim entries carry everything heard so far for their `item_id` and are
/// superseded by later entries; only final entries are durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub text: String,
    pub is_final: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

/// Everything the engine reports to the conversation UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ConnectionStateChanged(SessionState),
    Transcript(TranscriptEntry),
    Error(ConnectionError),
    ToolInvoked {
        name: String,
        arguments: serde_json::Value,
        result: ToolResult,
    },
    /// Server VAD heard the user start speaking
    SpeechStarted,
    /// Server VAD heard the user stop speaking
    SpeechStopped,
    /// A model response finished; `status` is completed, cancelled, or failed
    ResponseDone { status: Option<String> },
}
