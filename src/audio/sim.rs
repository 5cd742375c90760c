//! Synthetic audio backends
//!
//! Stand-ins for real devices: the capture backend replays a scripted frame
//! sequence, the playback sink records appends against a manually advanced
//! clock. Used by the integration tests and by machines without audio
//! hardware (`backend = "sim"`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::backend::{
    CaptureBackend, CaptureConfig, CaptureHandle, PlaybackBackend, PlaybackConfig, PlaybackSink,
};
use crate::error::{LiveError, Result};

/// Capture backend that replays a fixed frame script
///
/// After the script is exhausted the handle stays open (silent microphone)
/// until closed. The script is consumed by the first `open`.
pub struct SimCaptureBackend {
    script: Mutex<Vec<Vec<f32>>>,
    closed: Arc<AtomicBool>,
}

impl SimCaptureBackend {
    pub fn with_frames(frames: Vec<Vec<f32>>) -> Self {
        Self {
            script: Mutex::new(frames),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A microphone that never produces a frame
    pub fn silent() -> Self {
        Self::with_frames(Vec::new())
    }

    /// Whether the handle opened from this backend has been closed
    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl CaptureBackend for SimCaptureBackend {
    fn open(&self, _config: &CaptureConfig) -> Result<CaptureHandle> {
        let frames = {
            let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *script)
        };

        let (frame_tx, frame_rx) = mpsc::channel::<Vec<f32>>(frames.len().max(1));
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread = std::thread::spawn(move || {
            for frame in frames {
                if frame_tx.blocking_send(frame).is_err() {
                    return;
                }
            }
            // Keep the frame channel open until closed, like a silent mic
            let _ = stop_rx.recv();
        });

        let closed = Arc::clone(&self.closed);
        let stopper = Box::new(move || {
            let _ = stop_tx.send(());
            let _ = thread.join();
            closed.store(true, Ordering::SeqCst);
        });

        Ok(CaptureHandle::new(frame_rx, stopper))
    }
}

/// Capture backend whose acquisition always fails, for teardown tests
pub struct FailingCaptureBackend;

impl CaptureBackend for FailingCaptureBackend {
    fn open(&self, _config: &CaptureConfig) -> Result<CaptureHandle> {
        Err(LiveError::DeviceUnavailable(
            "simulated capture failure".to_string(),
        ))
    }
}

/// Observable state of a sim playback sink
#[derive(Debug, Default)]
pub struct SimPlaybackState {
    /// Manually advanced device clock, seconds
    pub clock: Mutex<f64>,
    /// Sample counts appended, in arrival order
    pub appended: Mutex<Vec<usize>>,
    /// Whether the sink was closed
    pub closed: Mutex<bool>,
}

impl SimPlaybackState {
    pub fn advance_clock(&self, seconds: f64) {
        let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        *clock += seconds;
    }

    pub fn total_appended(&self) -> usize {
        self.appended
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .sum()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Playback backend producing sinks bound to a shared observable state
pub struct SimPlaybackBackend {
    state: Arc<SimPlaybackState>,
}

impl SimPlaybackBackend {
    /// Returns the backend and the state handle the test keeps
    pub fn new() -> (Self, Arc<SimPlaybackState>) {
        let state = Arc::new(SimPlaybackState::default());
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl PlaybackBackend for SimPlaybackBackend {
    fn open(&self, _config: &PlaybackConfig) -> Result<Box<dyn PlaybackSink>> {
        Ok(Box::new(SimPlaybackSink {
            state: Arc::clone(&self.state),
        }))
    }
}

struct SimPlaybackSink {
    state: Arc<SimPlaybackState>,
}

impl PlaybackSink for SimPlaybackSink {
    fn device_time(&self) -> f64 {
        *self.state.clock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn append(&mut self, samples: &[f32]) {
        self.state
            .appended
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(samples.len());
    }

    fn close(&mut self) {
        *self.state.closed.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }
}
