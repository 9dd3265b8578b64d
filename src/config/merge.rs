use super::EngineConfig;
use super::yaml::YamlConfig;

/// Overlay every value present in `yaml` onto `config`.
pub(super) fn apply_yaml(config: &mut EngineConfig, yaml: YamlConfig) {
    if let Some(realtime) = yaml.realtime {
        if let Some(key) = realtime.api_key {
            config.api_key = key;
        }
        if realtime.endpoint_url.is_some() {
            config.endpoint_url = realtime.endpoint_url;
        }
        if let Some(model) = realtime.model {
            config.model = model;
        }
        if let Some(voice) = realtime.voice {
            config.voice = voice;
        }
        if realtime.instructions.is_some() {
            config.instructions = realtime.instructions;
        }
        if let Some(temperature) = realtime.temperature {
            config.temperature = temperature;
        }
        if realtime.max_response_output_tokens.is_some() {
            config.max_response_output_tokens = realtime.max_response_output_tokens;
        }
        if let Some(timeout) = realtime.connect_timeout_ms {
            config.connect_timeout_ms = timeout;
        }
        if let Some(flush) = realtime.flush_on_speech_start {
            config.flush_on_speech_start = flush;
        }
    }

    if let Some(transcription) = yaml.transcription {
        if transcription.enabled == Some(false) {
            config.transcription_model = None;
        } else if let Some(model) = transcription.model {
            config.transcription_model = Some(model);
        }
    }

    if let Some(vad) = yaml.turn_detection {
        if vad.enabled == Some(false) {
            config.turn_detection = None;
        } else {
            let current = config.turn_detection.get_or_insert_with(Default::default);
            if let Some(threshold) = vad.threshold {
                current.threshold = threshold;
            }
            if let Some(prefix) = vad.prefix_padding_ms {
                current.prefix_padding_ms = prefix;
            }
            if let Some(silence) = vad.silence_duration_ms {
                current.silence_duration_ms = silence;
            }
        }
    }

    if let Some(audio) = yaml.audio {
        if let Some(rate) = audio.wire_sample_rate {
            config.wire_sample_rate = rate;
        }
        if let Some(block) = audio.capture_block_size {
            config.capture_block_size = block;
        }
        if let Some(stall) = audio.capture_stall_timeout_ms {
            config.capture_stall_timeout_ms = stall;
        }
        if let Some(quantum) = audio.playback_quantum_ms {
            config.playback_quantum_ms = quantum;
        }
    }
}
