use tracing::warn;
use url::Url;

use super::{ConfigError, ConfigResult};
use crate::core::realtime::TurnDetectionConfig;
use crate::core::realtime::openai::{OpenAIRealtimeVoice, is_known_model};

/// Temperatures the Realtime API accepts.
const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.6..=1.2;

pub(super) fn validate_api_key(api_key: &str) -> ConfigResult<()> {
    if api_key.trim().is_empty() {
        return Err(ConfigError::MissingApiKey);
    }
    Ok(())
}

pub(super) fn validate_temperature(temperature: f32) -> ConfigResult<()> {
    if !TEMPERATURE_RANGE.contains(&temperature) {
        return Err(ConfigError::InvalidValue {
            name: "temperature",
            message: format!(
                "{temperature} is outside {}..={}",
                TEMPERATURE_RANGE.start(),
                TEMPERATURE_RANGE.end()
            ),
        });
    }
    Ok(())
}

pub(super) fn validate_turn_detection(vad: &TurnDetectionConfig) -> ConfigResult<()> {
    if !(0.0..=1.0).contains(&vad.threshold) {
        return Err(ConfigError::InvalidValue {
            name: "turn_detection.threshold",
            message: format!("{} is outside 0..=1", vad.threshold),
        });
    }
    Ok(())
}

pub(super) fn validate_endpoint_url(url: &str) -> ConfigResult<()> {
    let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidValue {
        name: "endpoint_url",
        message: format!("{url:?}: {e}"),
    })?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        scheme => Err(ConfigError::InvalidValue {
            name: "endpoint_url",
            message: format!("scheme must be ws or wss, got {scheme}"),
        }),
    }
}

pub(super) fn validate_positive(name: &'static str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            name,
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

pub(super) fn validate_voice(voice: &str) -> ConfigResult<()> {
    voice
        .parse::<OpenAIRealtimeVoice>()
        .map(|_| ())
        .map_err(|message| ConfigError::InvalidValue {
            name: "voice",
            message,
        })
}

/// Unknown models are passed through; newer snapshots appear faster than
/// this list is updated.
pub(super) fn check_model(model: &str) {
    if !is_known_model(model) {
        warn!(model = %model, "Unrecognized realtime model, passing it through");
    }
}
