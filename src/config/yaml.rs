use serde::Deserialize;
use std::path::Path;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// Every section and field is optional. Values present here override the
/// environment.
///
/// # Example YAML structure
/// ```yaml
/// realtime:
///   api_key: "sk-..."
///   endpoint_url: "wss://api.openai.com/v1/realtime?model=gpt-realtime"
///   model: "gpt-realtime"
///   voice: "coral"
///   instructions: "You are a friendly French tutor."
///   temperature: 0.8
///   max_response_output_tokens: 4096
///   connect_timeout_ms: 10000
///   flush_on_speech_start: true
///
/// transcription:
///   enabled: true
///   model: "whisper-1"
///
/// turn_detection:
///   enabled: true
///   threshold: 0.5
///   prefix_padding_ms: 300
///   silence_duration_ms: 500
///
/// audio:
///   wire_sample_rate: 24000
///   capture_block_size: 4096
///   capture_stall_timeout_ms: 2000
///   playback_quantum_ms: 10
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub realtime: Option<RealtimeYaml>,
    pub transcription: Option<TranscriptionYaml>,
    pub turn_detection: Option<TurnDetectionYaml>,
    pub audio: Option<AudioYaml>,
}

/// Connection and persona settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub api_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub temperature: Option<f32>,
    pub max_response_output_tokens: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub flush_on_speech_start: Option<bool>,
}

/// Input transcription settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TranscriptionYaml {
    pub enabled: Option<bool>,
    pub model: Option<String>,
}

/// Server VAD settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TurnDetectionYaml {
    pub enabled: Option<bool>,
    pub threshold: Option<f32>,
    pub prefix_padding_ms: Option<u32>,
    pub silence_duration_ms: Option<u32>,
}

/// Local audio settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub wire_sample_rate: Option<u32>,
    pub capture_block_size: Option<usize>,
    pub capture_stall_timeout_ms: Option<u64>,
    pub playback_quantum_ms: Option<u64>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
