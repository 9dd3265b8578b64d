//! OpenAI Realtime API WebSocket message types.
//!
//! Client events (sent to server):
//! - session.update - Configure voice, instructions, formats, tools, turn detection
//! - input_audio_buffer.append / commit / clear - Microphone audio
//! - conversation.item.create - User text or a function call result
//! - response.create - Ask the model to respond
//! - response.cancel - Stop the in-flight response (barge-in)
//!
//! Server events are decoded into [`ServerEvent`]. Event types this engine has
//! no use for decode to [`ServerEvent::Unknown`]; a known type with a broken
//! payload is a decode error.

use serde::{Deserialize, Serialize};

use crate::core::audio::{AudioFrame, encode_base64_pcm16};

// =============================================================================
// Session Configuration
// =============================================================================

/// Body of a `session.update` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Response modalities (text, audio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,

    /// System instructions for the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Voice for audio output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,

    /// Input audio transcription configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,

    /// Turn detection configuration. `None` serializes as JSON null, which
    /// disables server turn detection.
    pub turn_detection: Option<TurnDetection>,

    /// Tool definitions
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tools: Vec<ToolDef>,

    /// Tool choice strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_output_tokens: Option<MaxTokens>,
}

/// Maximum tokens configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxTokens {
    /// Specific number of tokens
    Number(u32),
    /// Unlimited, sent as "inf"
    Infinite(String),
}

impl MaxTokens {
    /// A configured limit, or "inf" when there is none.
    pub fn from_limit(limit: Option<u32>) -> Self {
        match limit {
            Some(tokens) => Self::Number(tokens),
            None => Self::Infinite("inf".to_string()),
        }
    }
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g., "whisper-1")
    pub model: String,
}

/// Server-side voice activity detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    #[serde(rename = "server_vad")]
    ServerVad {
        threshold: f32,
        prefix_padding_ms: u32,
        silence_duration_ms: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        create_response: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        interrupt_response: Option<bool>,
    },
}

/// Tool definition as sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Always "function"
    #[serde(rename = "type")]
    pub tool_type: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema of the arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

// =============================================================================
// Conversation Items
// =============================================================================

/// Conversation item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// message, function_call, or function_call_output
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// user, assistant, or system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ContentPart>>,
    /// Call ID for function call items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Function name for function call items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    /// JSON-encoded function result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Content part within a conversation item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    /// input_text, input_audio, text, or audio
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

// =============================================================================
// Client Events (sent to server)
// =============================================================================

/// Client events sent to the OpenAI Realtime API.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    /// Append base64 PCM16 audio to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },

    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear,

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    #[serde(rename = "response.create")]
    ResponseCreate,

    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

impl ClientEvent {
    /// Audio append event for a captured frame.
    pub fn audio_append(frame: &AudioFrame) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: encode_base64_pcm16(frame.samples()),
        }
    }

    /// A user text message.
    pub fn user_text(text: &str) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem {
                item_type: "message".to_string(),
                role: Some("user".to_string()),
                content: Some(vec![ContentPart {
                    content_type: "input_text".to_string(),
                    text: Some(text.to_string()),
                    transcript: None,
                }]),
                ..Default::default()
            },
        }
    }

    /// The result of a function call, correlated by `call_id`.
    pub fn function_output(call_id: &str, output: String) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem {
                item_type: "function_call_output".to_string(),
                call_id: Some(call_id.to_string()),
                output: Some(output),
                ..Default::default()
            },
        }
    }

    /// Event type string, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            ClientEvent::InputAudioBufferCommit => "input_audio_buffer.commit",
            ClientEvent::InputAudioBufferClear => "input_audio_buffer.clear",
            ClientEvent::ConversationItemCreate { .. } => "conversation.item.create",
            ClientEvent::ResponseCreate => "response.create",
            ClientEvent::ResponseCancel => "response.cancel",
        }
    }
}

/// A client event stamped with a unique `event_id`.
///
/// Server `error` events echo the id back, which ties a failure to the
/// message that caused it.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEnvelope {
    pub event_id: String,
    #[serde(flatten)]
    pub event: ClientEvent,
}

impl OutboundEnvelope {
    pub fn new(event: ClientEvent) -> Self {
        Self {
            event_id: format!("evt_{}", uuid::Uuid::new_v4().simple()),
            event,
        }
    }
}

// =============================================================================
// Server Events (received from server)
// =============================================================================

/// Server events received from the OpenAI Realtime API.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "error")]
    Error { error: ApiError },

    #[serde(rename = "session.created")]
    SessionCreated { session: Session },

    /// Acknowledges a `session.update`
    #[serde(rename = "session.updated")]
    SessionUpdated { session: Session },

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        audio_start_ms: u64,
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        #[serde(default)]
        audio_end_ms: u64,
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted {
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(rename = "input_audio_buffer.cleared")]
    InputAudioBufferCleared,

    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated { item: ConversationItem },

    /// Partial user transcript
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    TranscriptionDelta {
        item_id: String,
        delta: String,
    },

    /// Final user transcript
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        item_id: String,
        transcript: String,
    },

    #[serde(rename = "conversation.item.input_audio_transcription.failed")]
    TranscriptionFailed {
        #[serde(default)]
        item_id: Option<String>,
        error: ApiError,
    },

    #[serde(rename = "response.created")]
    ResponseCreated { response: Response },

    #[serde(rename = "response.done")]
    ResponseDone { response: Response },

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: ConversationItem },

    #[serde(rename = "response.output_item.done")]
    OutputItemDone { item: ConversationItem },

    #[serde(rename = "response.text.delta", alias = "response.output_text.delta")]
    TextDelta { item_id: String, delta: String },

    #[serde(rename = "response.text.done", alias = "response.output_text.done")]
    TextDone { item_id: String, text: String },

    #[serde(
        rename = "response.audio_transcript.delta",
        alias = "response.output_audio_transcript.delta"
    )]
    AudioTranscriptDelta { item_id: String, delta: String },

    #[serde(
        rename = "response.audio_transcript.done",
        alias = "response.output_audio_transcript.done"
    )]
    AudioTranscriptDone { item_id: String, transcript: String },

    /// Base64 PCM16 chunk of assistant audio
    #[serde(rename = "response.audio.delta", alias = "response.output_audio.delta")]
    AudioDelta {
        #[serde(default)]
        item_id: Option<String>,
        delta: String,
    },

    #[serde(rename = "response.audio.done", alias = "response.output_audio.done")]
    AudioDone {
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta { call_id: String, delta: String },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        call_id: String,
        /// Present on current API versions; older ones only name the
        /// function in `response.output_item.added`.
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        item_id: Option<String>,
        #[serde(default)]
        arguments: String,
    },

    #[serde(rename = "rate_limits.updated")]
    RateLimitsUpdated {
        #[serde(default)]
        rate_limits: Vec<serde_json::Value>,
    },

    /// Any event type not listed above
    #[serde(other)]
    Unknown,
}

// =============================================================================
// Supporting Types
// =============================================================================

/// API error information.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    /// Client event that caused the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl ApiError {
    /// Whether the server rejected the credentials.
    pub fn is_authentication(&self) -> bool {
        self.error_type == "authentication_error"
            || matches!(self.code.as_deref(), Some("invalid_api_key"))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({}): {}", self.error_type, code, self.message),
            None => write!(f, "{}: {}", self.error_type, self.message),
        }
    }
}

/// Session information echoed by the server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Session {
    pub id: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub expires_at: Option<u64>,
    pub tools: Vec<ToolDef>,
}

/// Response information.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Response {
    pub id: Option<String>,
    /// completed, cancelled, failed, or incomplete
    pub status: Option<String>,
    pub status_details: Option<serde_json::Value>,
    pub output: Vec<ConversationItem>,
}
