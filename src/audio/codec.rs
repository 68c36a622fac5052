//! PCM16 codec between float samples and base64 transport text.

use base64::Engine;

use super::backend::{AudioFrame, PlaybackBuffer};
use crate::error::DecodeError;

/// Bytes per 16-bit sample
const BYTES_PER_SAMPLE: usize = 2;

/// Scale between float samples and the i16 range
const PCM16_SCALE: f32 = 32768.0;

/// Quantize float samples to i16
///
/// Input is clamped to [-1, 1] before scaling so out-of-range samples
/// saturate instead of wrapping.
pub fn quantize(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let s = if s.is_nan() { 0.0 } else { s.clamp(-1.0, 1.0) };
            // float -> int casts saturate, so 1.0 * 32768 lands on i16::MAX
            (s * PCM16_SCALE) as i16
        })
        .collect()
}

/// Build a capture frame from one block of float samples
pub fn encode_frame(samples: &[f32], sample_rate: u32, channels: u16) -> AudioFrame {
    AudioFrame {
        samples: quantize(samples),
        sample_rate,
        channels,
    }
}

/// Encode float samples as base64 PCM16LE
pub fn encode(samples: &[f32]) -> String {
    let pcm_bytes: Vec<u8> = quantize(samples)
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect();
    encode_bytes(&pcm_bytes)
}

/// Base64 transport encoding of raw bytes
pub fn encode_bytes(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Inverse transport encoding; returns raw PCM16LE bytes
pub fn decode(text: &str) -> Result<Vec<u8>, DecodeError> {
    base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))
}

/// Interpret PCM16LE bytes as i16 samples
pub fn pcm16_samples(bytes: &[u8]) -> Result<Vec<i16>, DecodeError> {
    if bytes.len() % BYTES_PER_SAMPLE != 0 {
        return Err(DecodeError::MisalignedLength {
            len: bytes.len(),
            frame_size: BYTES_PER_SAMPLE,
        });
    }

    Ok(bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect())
}

/// Decode PCM16LE bytes into a playback buffer at the session's output
/// rate and channel count
pub fn decode_audio_data(
    bytes: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<PlaybackBuffer, DecodeError> {
    if channels == 0 {
        return Err(DecodeError::InvalidFormat("zero channels".to_string()));
    }
    if sample_rate == 0 {
        return Err(DecodeError::InvalidFormat("zero sample rate".to_string()));
    }

    let frame_size = BYTES_PER_SAMPLE * channels as usize;
    if bytes.len() % frame_size != 0 {
        return Err(DecodeError::MisalignedLength {
            len: bytes.len(),
            frame_size,
        });
    }

    let samples = pcm16_samples(bytes)?;
    let frames = samples.len() / channels as usize;
    let mut data = vec![Vec::with_capacity(frames); channels as usize];

    for frame in samples.chunks_exact(channels as usize) {
        for (channel, &sample) in frame.iter().enumerate() {
            data[channel].push(sample as f32 / PCM16_SCALE);
        }
    }

    Ok(PlaybackBuffer {
        sample_rate,
        channels: data,
    })
}
