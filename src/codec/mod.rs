//! PCM conversion and wire framing
//!
//! Pure conversion between normalized f32 samples and 16-bit signed
//! little-endian PCM, plus the base64 framing used on the wire. The inference
//! endpoint expects 16 kHz mono PCM on the way in and returns 24 kHz mono PCM
//! in its inline audio parts.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::LiveError;

/// Mime tag attached to every outbound audio chunk
pub const OUTBOUND_AUDIO_MIME: &str = "audio/pcm;rate=16000";

/// Encoded PCM payload ready for wire transit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcmChunk {
    /// Base64-encoded 16-bit LE PCM bytes
    pub data: String,

    /// Sample rate / format tag, e.g. "audio/pcm;rate=16000"
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

impl PcmChunk {
    /// Package one captured frame as an outbound wire chunk
    pub fn from_samples(samples: &[f32]) -> Self {
        Self {
            data: encode_base64(&float_to_pcm16(samples)),
            mime_type: OUTBOUND_AUDIO_MIME.to_string(),
        }
    }
}

/// Convert normalized f32 samples to 16-bit signed LE PCM bytes
///
/// Samples are clamped to [-1.0, 1.0] first. Negative values scale by 32768,
/// non-negative by 32767, matching the asymmetric i16 range. Total: there is
/// no failure mode on the encode path.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let s = sample.clamp(-1.0, 1.0);
        let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
        bytes.extend_from_slice(&(scaled as i16).to_le_bytes());
    }
    bytes
}

/// Convert 16-bit signed LE PCM bytes to normalized f32 samples, one
/// sequence per channel
///
/// Trailing bytes that do not fill a whole sample across all channels are
/// dropped, not an error. Each sample is divided by 32768.0.
pub fn pcm16_to_float(bytes: &[u8], channels: usize) -> Vec<Vec<f32>> {
    let channels = channels.max(1);
    let frame_bytes = 2 * channels;
    let frame_count = bytes.len() / frame_bytes;

    let mut out = vec![Vec::with_capacity(frame_count); channels];
    for frame in bytes.chunks_exact(frame_bytes) {
        for (ch, sample_bytes) in frame.chunks_exact(2).enumerate() {
            let sample = i16::from_le_bytes([sample_bytes[0], sample_bytes[1]]);
            out[ch].push(f32::from(sample) / 32768.0);
        }
    }
    out
}

/// Encode bytes as standard base64 (total, cannot fail)
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode standard base64, failing with `LiveError::Decode` on malformed input
pub fn decode_base64(data: &str) -> Result<Vec<u8>, LiveError> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| LiveError::Decode(format!("invalid base64: {}", e)))
}
