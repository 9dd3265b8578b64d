//! OpenAI Realtime API session.
//!
//! # Supported Models
//!
//! - `gpt-realtime` - GA realtime model (default)
//! - `gpt-4o-realtime-preview` and its dated snapshots
//! - `gpt-4o-mini-realtime-preview` - Mini model for lower latency
//!
//! # Audio Format
//!
//! Input and output audio is PCM 16-bit signed little-endian mono at 24kHz.
//!
//! # Example
//!
//! ```rust,ignore
//! use realtime_voice::core::playback::{PlaybackScheduler, SystemClock};
//! use realtime_voice::core::realtime::{RealtimeConfig, RealtimeSession};
//! use realtime_voice::core::tools::ToolRegistry;
//! use std::sync::Arc;
//!
//! let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! let playback = Arc::new(PlaybackScheduler::new(Arc::new(SystemClock::new())));
//! let config = RealtimeConfig {
//!     api_key: "sk-...".to_string(),
//!     ..Default::default()
//! };
//!
//! let mut session = RealtimeSession::new(config, Arc::new(ToolRegistry::empty()), playback, events_tx)?;
//! session.connect().await?;
//! session.send_text("Bonjour").await?;
//! ```

mod client;
mod config;
mod messages;

pub use client::{AudioSender, RealtimeSession};
#[cfg(test)]
pub(crate) use client::Outbound;
pub use config::{
    KNOWN_REALTIME_MODELS, Modality, OPENAI_BETA_HEADER, OPENAI_REALTIME_SAMPLE_RATE,
    OPENAI_REALTIME_URL, OpenAIRealtimeVoice, PCM16_FORMAT, is_known_model,
};
pub use messages::{
    ApiError, ClientEvent, ContentPart, ConversationItem, InputAudioTranscription, MaxTokens,
    OutboundEnvelope, Response, ServerEvent, Session, SessionConfig, ToolDef, TurnDetection,
};
