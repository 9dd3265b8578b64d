use std::env;
use std::str::FromStr;

use super::{ConfigError, ConfigResult, EngineConfig};

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &'static str) -> ConfigResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                name,
                message: format!("{raw:?}: {e}"),
            }),
        None => Ok(None),
    }
}

/// Build a configuration from defaults plus environment variables.
///
/// Unset and empty variables keep their defaults.
pub(super) fn load_from_env() -> ConfigResult<EngineConfig> {
    let mut config = EngineConfig::default();

    if let Some(key) = var("OPENAI_API_KEY") {
        config.api_key = key;
    }
    if let Some(url) = var("REALTIME_ENDPOINT_URL") {
        config.endpoint_url = Some(url);
    }
    if let Some(model) = var("REALTIME_MODEL") {
        config.model = model;
    }
    if let Some(voice) = var("REALTIME_VOICE") {
        config.voice = voice;
    }
    if let Some(instructions) = var("REALTIME_INSTRUCTIONS") {
        config.instructions = Some(instructions);
    }
    if let Some(temperature) = parse_var("REALTIME_TEMPERATURE")? {
        config.temperature = temperature;
    }
    if let Some(model) = var("REALTIME_TRANSCRIPTION_MODEL") {
        config.transcription_model = Some(model);
    }
    if let Some(timeout) = parse_var("REALTIME_CONNECT_TIMEOUT_MS")? {
        config.connect_timeout_ms = timeout;
    }

    Ok(config)
}
