//! Sample format conversion and resampling.
//!
//! The wire format is PCM16 little-endian; devices work in `f32` samples in the
//! range `[-1.0, 1.0]`. Scaling is asymmetric so that the full signed 16-bit
//! range is usable: negative samples scale by 32768, positive samples by 32767.

use base64::Engine;
use base64::prelude::BASE64_STANDARD;

const NEGATIVE_SCALE: f32 = 32768.0;
const POSITIVE_SCALE: f32 = 32767.0;

/// Convert `f32` samples to PCM16, clamping to `[-1.0, 1.0]` first.
///
/// NaN samples are written as silence.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let s = if sample.is_nan() {
                0.0
            } else {
                sample.clamp(-1.0, 1.0)
            };
            if s < 0.0 {
                (s * NEGATIVE_SCALE).round() as i16
            } else {
                (s * POSITIVE_SCALE).round() as i16
            }
        })
        .collect()
}

/// Convert PCM16 samples to `f32` in `[-1.0, 1.0]`.
pub fn pcm16_to_float(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&s| {
            if s < 0 {
                s as f32 / NEGATIVE_SCALE
            } else {
                s as f32 / POSITIVE_SCALE
            }
        })
        .collect()
}

/// Resample mono audio with linear interpolation.
///
/// The output holds `round(len * to_rate / from_rate)` samples. Equal rates
/// return the input untouched.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let out_len = (samples.len() as f64 * to_rate as f64 / from_rate as f64).round() as usize;
    let step = from_rate as f64 / to_rate as f64;
    let last = samples.len() - 1;

    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let position = i as f64 * step;
        let idx0 = (position.floor() as usize).min(last);
        let idx1 = (idx0 + 1).min(last);
        let frac = (position - idx0 as f64) as f32;
        let s0 = samples[idx0];
        let s1 = samples[idx1];
        output.push(s0 + (s1 - s0) * frac);
    }
    output
}

/// Serialize PCM16 samples as little-endian bytes.
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Parse little-endian PCM16 bytes. A trailing odd byte is ignored.
pub fn pcm16_from_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode PCM16 samples for the `audio` field of wire messages.
pub fn encode_base64_pcm16(samples: &[i16]) -> String {
    BASE64_STANDARD.encode(pcm16_to_bytes(samples))
}

/// Decode a base64 PCM16 payload received from the wire.
pub fn decode_base64_pcm16(payload: &str) -> Result<Vec<i16>, base64::DecodeError> {
    let bytes = BASE64_STANDARD.decode(payload)?;
    Ok(pcm16_from_bytes(&bytes))
}
