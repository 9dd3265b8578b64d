//! Realtime conversation protocol.
//!
//! A [`RealtimeSession`] owns one WebSocket connection to the OpenAI Realtime
//! API. It negotiates the session, streams microphone audio out, schedules
//! assistant audio for playback, dispatches tool calls, and reports
//! everything else as [`SessionEvent`]s.
//!
//! # Session Lifecycle
//!
//! ```text
//! Idle -> Connecting -> Active -> Closing -> Closed
//!             |           |
//!             +-> Errored +-> Closing -> Closed
//! ```

mod base;
pub mod openai;

pub use base::{
    ConnectionError, ErrorKind, InputTranscriptionConfig, RealtimeConfig, RealtimeError,
    RealtimeResult, SessionEvent, SessionState, TranscriptEntry, TranscriptRole,
    TurnDetectionConfig,
};
pub use openai::{AudioSender, RealtimeSession};
