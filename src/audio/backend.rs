//! Audio device seams
//!
//! Capture and playback go through small traits so the session controller is
//! not welded to real hardware: the cpal backends drive actual devices, the
//! sim backends stand in for tests and development boxes without audio.

use tokio::sync::mpsc;

use crate::error::{LiveError, Result};

/// Configuration for microphone capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Capture sample rate in Hz (the endpoint expects 16 kHz)
    pub sample_rate: u32,

    /// Samples per delivered frame
    pub frame_samples: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_samples: 1600, // 100ms at 16kHz
        }
    }
}

/// Configuration for playback
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Playback sample rate in Hz (inbound audio is 24 kHz mono)
    pub sample_rate: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { sample_rate: 24000 }
    }
}

/// Live handle for an open microphone
///
/// Frames arrive on a bounded channel in capture order. Closing releases the
/// device; it is safe to call `close` multiple times and from any state, and
/// dropping the handle closes it too.
pub struct CaptureHandle {
    frames: Option<mpsc::Receiver<Vec<f32>>>,
    stopper: Option<Box<dyn FnOnce() + Send>>,
}

impl CaptureHandle {
    pub fn new(frames: mpsc::Receiver<Vec<f32>>, stopper: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            frames: Some(frames),
            stopper: Some(stopper),
        }
    }

    /// Take the frame receiver; yields `None` after the first call
    pub fn take_frames(&mut self) -> Option<mpsc::Receiver<Vec<f32>>> {
        self.frames.take()
    }

    /// Stop the framing stage and release the microphone (idempotent)
    pub fn close(&mut self) {
        if let Some(stop) = self.stopper.take() {
            stop();
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens microphone capture handles
pub trait CaptureBackend: Send + Sync {
    /// Request microphone access and start the framing stage
    ///
    /// Fails with `PermissionDenied` or `DeviceUnavailable`.
    fn open(&self, config: &CaptureConfig) -> Result<CaptureHandle>;
}

/// Output-device FIFO consumed by the playback scheduler
///
/// `device_time` is the device clock in seconds since the sink was opened; it
/// advances whether or not audio is queued. Appended samples play back to
/// back after whatever is already queued, with silence filling any idle time
/// in between.
pub trait PlaybackSink: Send {
    fn device_time(&self) -> f64;

    fn append(&mut self, samples: &[f32]);

    /// Release the output device; queued audio drains first (idempotent)
    fn close(&mut self);
}

/// Opens playback sinks
pub trait PlaybackBackend: Send + Sync {
    fn open(&self, config: &PlaybackConfig) -> Result<Box<dyn PlaybackSink>>;
}

/// Which backend pair to use for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioBackendKind {
    /// Real devices via cpal
    Device,
    /// Synthetic backends (no hardware; capture produces nothing)
    Sim,
}

impl AudioBackendKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "device" => Ok(Self::Device),
            "sim" => Ok(Self::Sim),
            other => Err(LiveError::DeviceUnavailable(format!(
                "unknown audio backend '{}'",
                other
            ))),
        }
    }
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create the capture/playback backend pair for the requested kind
    pub fn create(
        kind: AudioBackendKind,
    ) -> (
        std::sync::Arc<dyn CaptureBackend>,
        std::sync::Arc<dyn PlaybackBackend>,
    ) {
        match kind {
            AudioBackendKind::Device => (
                std::sync::Arc::new(super::capture::CpalCaptureBackend),
                std::sync::Arc::new(super::playback::CpalPlaybackBackend),
            ),
            AudioBackendKind::Sim => (
                std::sync::Arc::new(super::sim::SimCaptureBackend::silent()),
                std::sync::Arc::new(super::sim::SimPlaybackBackend::new().0),
            ),
        }
    }
}
