use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::session::LiveSessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub channel: ChannelSettings,
    pub billing: BillingConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// "device" for real hardware, "sim" for machines without audio
    pub backend: String,
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    pub frame_duration_ms: u64,
    /// Frames below this RMS energy are not forwarded
    pub silence_rms: f32,
    /// Gain applied to RMS for the volume readout
    pub volume_gain: f32,
    /// Optional WAV dump of the outbound capture stream
    pub tap_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChannelSettings {
    pub url: String,
    pub model: String,
    pub voice: String,
}

#[derive(Debug, Deserialize)]
pub struct BillingConfig {
    pub cost_per_interval: i64,
    pub interval_ms: u64,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Derive a per-session configuration (fresh session id each call)
    pub fn session_config(&self) -> LiveSessionConfig {
        LiveSessionConfig {
            channel_url: self.channel.url.clone(),
            model: self.channel.model.clone(),
            voice: self.channel.voice.clone(),
            capture_sample_rate: self.audio.capture_sample_rate,
            playback_sample_rate: self.audio.playback_sample_rate,
            frame_duration_ms: self.audio.frame_duration_ms,
            silence_rms: self.audio.silence_rms,
            volume_gain: self.audio.volume_gain,
            billing_cost: self.billing.cost_per_interval,
            billing_interval: Duration::from_millis(self.billing.interval_ms),
            tap_path: self.audio.tap_path.as_ref().map(Into::into),
            ..LiveSessionConfig::default()
        }
    }
}
