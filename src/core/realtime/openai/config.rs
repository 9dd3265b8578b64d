//! OpenAI Realtime API constants, voices and models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Sample rate of `pcm16` audio on the Realtime API.
pub const OPENAI_REALTIME_SAMPLE_RATE: u32 = 24000;

/// The only audio format this engine negotiates, for both directions.
pub const PCM16_FORMAT: &str = "pcm16";

/// Value of the `OpenAI-Beta` header.
pub const OPENAI_BETA_HEADER: &str = "realtime=v1";

/// Models known to speak this protocol version. Others are allowed but logged.
pub const KNOWN_REALTIME_MODELS: &[&str] = &[
    "gpt-realtime",
    "gpt-4o-realtime-preview",
    "gpt-4o-realtime-preview-2024-10-01",
    "gpt-4o-realtime-preview-2024-12-17",
    "gpt-4o-mini-realtime-preview",
];

pub fn is_known_model(model: &str) -> bool {
    KNOWN_REALTIME_MODELS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(model))
}

/// Voices accepted by the Realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIRealtimeVoice {
    Alloy,
    Ash,
    Ballad,
    #[default]
    Coral,
    Echo,
    Sage,
    Shimmer,
    Verse,
    /// `gpt-realtime` only
    Cedar,
    /// `gpt-realtime` only
    Marin,
}

impl OpenAIRealtimeVoice {
    pub const ALL: [OpenAIRealtimeVoice; 10] = [
        Self::Alloy,
        Self::Ash,
        Self::Ballad,
        Self::Coral,
        Self::Echo,
        Self::Sage,
        Self::Shimmer,
        Self::Verse,
        Self::Cedar,
        Self::Marin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
            Self::Cedar => "cedar",
            Self::Marin => "marin",
        }
    }
}

impl FromStr for OpenAIRealtimeVoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|voice| voice.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| format!("unknown voice {name:?}"))
    }
}

impl fmt::Display for OpenAIRealtimeVoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response modalities. Sessions always request both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
        }
    }
}
