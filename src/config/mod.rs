//! Configuration module for the realtime voice engine
//!
//! This module loads engine configuration from .env files, environment
//! variables, and YAML files. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Applying YAML overrides onto the environment base
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use realtime_voice::config::EngineConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = EngineConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config = EngineConfig::from_file(Path::new("config.yaml"))?;
//!
//! println!("Using model {}", config.model);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::core::capture::CaptureConfig;
use crate::core::realtime::{InputTranscriptionConfig, RealtimeConfig, TurnDetectionConfig};

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::{AudioYaml, RealtimeYaml, TranscriptionYaml, TurnDetectionYaml, YamlConfig};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Parse(String),

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },

    #[error("OpenAI API key is required (set OPENAI_API_KEY or realtime.api_key)")]
    MissingApiKey,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Engine configuration
///
/// Contains everything needed to open a realtime session and drive the
/// local audio devices.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_key: String,
    /// Overrides the default endpoint; the model query is not added.
    pub endpoint_url: Option<String>,
    pub model: String,
    pub voice: String,
    pub instructions: Option<String>,
    pub temperature: f32,
    pub max_response_output_tokens: Option<u32>,
    /// `None` disables input transcription.
    pub transcription_model: Option<String>,
    /// `None` disables server VAD.
    pub turn_detection: Option<TurnDetectionConfig>,
    pub connect_timeout_ms: u64,
    pub flush_on_speech_start: bool,

    // Local audio
    pub wire_sample_rate: u32,
    pub capture_block_size: usize,
    pub capture_stall_timeout_ms: u64,
    pub playback_quantum_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let realtime = RealtimeConfig::default();
        Self {
            api_key: String::new(),
            endpoint_url: None,
            model: realtime.model.clone(),
            voice: realtime.voice.clone(),
            instructions: None,
            temperature: realtime.temperature.unwrap_or(0.8),
            max_response_output_tokens: realtime.max_response_output_tokens,
            transcription_model: realtime
                .input_audio_transcription
                .as_ref()
                .map(|t| t.model.clone()),
            turn_detection: Some(TurnDetectionConfig::default()),
            connect_timeout_ms: realtime.connect_timeout_ms,
            flush_on_speech_start: realtime.flush_on_speech_start,
            wire_sample_rate: crate::core::audio::WIRE_SAMPLE_RATE,
            capture_block_size: 4096,
            capture_stall_timeout_ms: 2000,
            playback_quantum_ms: 10,
        }
    }
}

/// Zeroize the API key when the configuration is dropped.
impl Drop for EngineConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        self.api_key.zeroize();
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Loads a `.env` file from the working directory if present; variables
    /// already set in the process environment take precedence over it.
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        let config = env::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables
    /// 3. .env file values
    /// 4. Default values
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        let yaml_config = YamlConfig::from_file(path)?;
        let mut config = env::load_from_env()?;
        merge::apply_yaml(&mut config, yaml_config);
        config.validate()?;
        Ok(config)
    }

    /// Check every setting, returning the first problem found.
    pub fn validate(&self) -> ConfigResult<()> {
        validation::validate_api_key(&self.api_key)?;
        validation::validate_temperature(self.temperature)?;
        validation::validate_voice(&self.voice)?;
        validation::check_model(&self.model);
        if let Some(vad) = &self.turn_detection {
            validation::validate_turn_detection(vad)?;
        }
        if let Some(url) = &self.endpoint_url {
            validation::validate_endpoint_url(url)?;
        }
        validation::validate_positive("wire_sample_rate", u64::from(self.wire_sample_rate))?;
        validation::validate_positive("capture_block_size", self.capture_block_size as u64)?;
        validation::validate_positive("capture_stall_timeout_ms", self.capture_stall_timeout_ms)?;
        validation::validate_positive("playback_quantum_ms", self.playback_quantum_ms)?;
        validation::validate_positive("connect_timeout_ms", self.connect_timeout_ms)?;
        Ok(())
    }

    /// Session parameters for the protocol layer.
    pub fn to_realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            api_key: self.api_key.clone(),
            endpoint_url: self.endpoint_url.clone(),
            model: self.model.clone(),
            voice: self.voice.clone(),
            instructions: self.instructions.clone(),
            temperature: Some(self.temperature),
            max_response_output_tokens: self.max_response_output_tokens,
            input_audio_transcription: self
                .transcription_model
                .as_ref()
                .map(|model| InputTranscriptionConfig {
                    model: model.clone(),
                }),
            turn_detection: self.turn_detection.clone(),
            tool_choice: Some("auto".to_string()),
            connect_timeout_ms: self.connect_timeout_ms,
            flush_on_speech_start: self.flush_on_speech_start,
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            wire_sample_rate: self.wire_sample_rate,
            block_size: self.capture_block_size,
            stall_timeout: Duration::from_millis(self.capture_stall_timeout_ms),
            ..CaptureConfig::default()
        }
    }

    pub fn playback_quantum(&self) -> Duration {
        Duration::from_millis(self.playback_quantum_ms)
    }
}
