use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::channel::ChannelConfig;

/// Configuration for a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSessionConfig {
    /// Unique session identifier
    pub session_id: String,

    /// Duplex channel endpoint URL
    pub channel_url: String,

    /// Model requested from the inference endpoint
    pub model: String,

    /// Prebuilt voice for synthesized audio
    pub voice: String,

    /// Capture sample rate (the endpoint expects 16kHz mono)
    pub capture_sample_rate: u32,

    /// Playback sample rate (inbound audio is 24kHz mono)
    pub playback_sample_rate: u32,

    /// Capture frame duration in milliseconds
    pub frame_duration_ms: u64,

    /// Frames below this RMS energy are not forwarded to the channel
    pub silence_rms: f32,

    /// Gain applied to frame RMS for the volume readout
    pub volume_gain: f32,

    /// Credits charged at open and per billing interval
    pub billing_cost: i64,

    /// Wall-clock interval between recurring charges
    pub billing_interval: Duration,

    /// Optional WAV dump of the outbound capture stream
    pub tap_path: Option<PathBuf>,
}

impl Default for LiveSessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("live-{}", uuid::Uuid::new_v4()),
            channel_url: "nats://localhost:4222".to_string(),
            model: "multimodal-live-preview".to_string(),
            voice: "Zephyr".to_string(),
            capture_sample_rate: 16000,
            playback_sample_rate: 24000,
            frame_duration_ms: 100,
            silence_rms: 0.01,
            volume_gain: 6.0,
            billing_cost: 40,
            billing_interval: Duration::from_secs(600), // 10 minutes
            tap_path: None,
        }
    }
}

impl LiveSessionConfig {
    /// Samples per capture frame at the configured rate
    pub fn frame_samples(&self) -> usize {
        (self.capture_sample_rate as u64 * self.frame_duration_ms / 1000) as usize
    }

    /// The channel-facing slice of this configuration
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: self.channel_url.clone(),
            session_id: self.session_id.clone(),
            model: self.model.clone(),
            voice: self.voice.clone(),
        }
    }
}
