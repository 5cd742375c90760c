//! Gapless playback scheduling
//!
//! Inbound audio buffers arrive at irregular intervals with irregular
//! durations. The scheduler keeps a single forward-only cursor: each buffer
//! starts at `max(next_play_time, device_time)` and advances the cursor by
//! its duration, so buffers are heard back to back in arrival order with no
//! overlap, and with no gap as long as arrivals keep pace with playback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error};

use super::backend::{PlaybackBackend, PlaybackConfig, PlaybackSink};
use crate::codec;
use crate::error::{LiveError, Result};

/// Decoded inbound audio, owned by the scheduler until handed to the device
#[derive(Debug, Clone)]
pub struct InboundAudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl InboundAudioBuffer {
    /// Decode a 16-bit LE PCM payload (mono) into a playable buffer
    pub fn from_pcm16(bytes: &[u8], sample_rate: u32) -> Self {
        let mut channels = codec::pcm16_to_float(bytes, 1);
        Self {
            samples: channels.pop().unwrap_or_default(),
            sample_rate,
        }
    }

    /// Buffer duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Forward-only playback cursor
///
/// Pure bookkeeping, no device involvement: `schedule` computes where the
/// next buffer starts and advances past it.
#[derive(Debug, Default)]
pub struct PlaybackCursor {
    next_play_time: f64,
}

impl PlaybackCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-zero the cursor to the device's current time
    pub fn reset(&mut self, now: f64) {
        self.next_play_time = now;
    }

    /// Schedule one buffer: returns its start time and advances the cursor
    pub fn schedule(&mut self, now: f64, duration: f64) -> f64 {
        let start = self.next_play_time.max(now);
        self.next_play_time = start + duration;
        start
    }

    pub fn next_play_time(&self) -> f64 {
        self.next_play_time
    }
}

/// Schedules inbound buffers onto a playback sink
pub struct PlaybackScheduler {
    cursor: PlaybackCursor,
    sink: Box<dyn PlaybackSink>,
}

impl PlaybackScheduler {
    /// Wrap a sink; the cursor starts at the sink's time zero
    pub fn new(sink: Box<dyn PlaybackSink>) -> Self {
        Self {
            cursor: PlaybackCursor::new(),
            sink,
        }
    }

    /// Queue one decoded buffer for gapless playback; returns its start time
    ///
    /// Ownership of the samples passes to the output device from here on. A
    /// payload that failed to decode never reaches this point, so a malformed
    /// chunk cannot desynchronize the timeline.
    pub fn enqueue(&mut self, buffer: InboundAudioBuffer) -> f64 {
        let duration = buffer.duration();
        let start = self.cursor.schedule(self.sink.device_time(), duration);
        self.sink.append(&buffer.samples);

        debug!(
            start_secs = start,
            duration_secs = duration,
            samples = buffer.samples.len(),
            "buffer scheduled"
        );

        start
    }

    /// Re-zero the cursor at session start
    ///
    /// Only valid with no buffers pending; the controller creates a fresh
    /// scheduler per session, so this is the session-start re-zero.
    pub fn reset(&mut self) {
        self.cursor.reset(self.sink.device_time());
    }

    /// Release the output device; audio already queued plays out first
    pub fn close(&mut self) {
        self.sink.close();
    }
}

// ============================================================================
// cpal sink
// ============================================================================

struct SinkShared {
    /// Mono samples waiting for the device callback
    queue: Mutex<VecDeque<f32>>,
    /// Output frames rendered so far (queued audio and silence alike)
    frames_played: AtomicU64,
}

/// Plays to the default output device
pub struct CpalPlaybackBackend;

impl PlaybackBackend for CpalPlaybackBackend {
    fn open(&self, config: &PlaybackConfig) -> Result<Box<dyn PlaybackSink>> {
        let shared = Arc::new(SinkShared {
            queue: Mutex::new(VecDeque::new()),
            frames_played: AtomicU64::new(0),
        });

        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread_shared = Arc::clone(&shared);
        let sample_rate = config.sample_rate;
        // The thread is detached on purpose: close() signals it and it exits
        // on its own once queued audio has drained
        let _device_thread = std::thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || {
                let stream = match build_output_stream(sample_rate, Arc::clone(&thread_shared)) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let _ = stop_rx.recv();

                // Let already-scheduled audio play out before releasing the
                // device; new buffers stopped arriving when close() was called
                let deadline = std::time::Instant::now() + drain_budget(&thread_shared, sample_rate);
                while std::time::Instant::now() < deadline {
                    let remaining = thread_shared
                        .queue
                        .lock()
                        .map(|q| q.len())
                        .unwrap_or(0);
                    if remaining == 0 {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }

                drop(stream);
                debug!("Playback stream released");
            })
            .map_err(|e| LiveError::DeviceUnavailable(format!("playback thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(LiveError::DeviceUnavailable(
                    "playback thread exited during startup".to_string(),
                ))
            }
        }

        Ok(Box::new(CpalPlaybackSink {
            shared,
            sample_rate: config.sample_rate,
            stop_tx: Some(stop_tx),
        }))
    }
}

/// How long the drain loop may wait: remaining queue plus a small margin
fn drain_budget(shared: &SinkShared, sample_rate: u32) -> Duration {
    let queued = shared.queue.lock().map(|q| q.len()).unwrap_or(0);
    let queued_ms = (queued as u64 * 1000) / u64::from(sample_rate.max(1));
    Duration::from_millis(queued_ms + 500)
}

fn build_output_stream(sample_rate: u32, shared: Arc<SinkShared>) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| LiveError::DeviceUnavailable("no output device available".to_string()))?;

    let rate = SampleRate(sample_rate);
    let supported = device
        .supported_output_configs()
        .map_err(|e| LiveError::DeviceUnavailable(format!("output configs: {}", e)))?
        .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .min_by_key(|c| c.channels())
        .ok_or_else(|| {
            LiveError::DeviceUnavailable(format!("no output config supports {} Hz", sample_rate))
        })?;

    let channels = supported.channels() as usize;
    let stream_config = supported.with_sample_rate(rate).config();

    debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels,
        "playback initialized"
    );

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut queue = match shared.queue.lock() {
                    Ok(queue) => queue,
                    Err(poisoned) => poisoned.into_inner(),
                };

                for frame in data.chunks_mut(channels) {
                    // Silence when the queue runs dry; the device clock keeps
                    // advancing either way
                    let sample = queue.pop_front().unwrap_or(0.0);
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }

                let frames = (data.len() / channels) as u64;
                shared.frames_played.fetch_add(frames, Ordering::Relaxed);
            },
            |err| {
                error!("Playback stream error: {}", err);
            },
            None,
        )
        .map_err(|e| LiveError::DeviceUnavailable(format!("build output stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| LiveError::DeviceUnavailable(format!("start output stream: {}", e)))?;

    Ok(stream)
}

struct CpalPlaybackSink {
    shared: Arc<SinkShared>,
    sample_rate: u32,
    stop_tx: Option<std_mpsc::Sender<()>>,
}

impl PlaybackSink for CpalPlaybackSink {
    fn device_time(&self) -> f64 {
        self.shared.frames_played.load(Ordering::Relaxed) as f64 / f64::from(self.sample_rate)
    }

    fn append(&mut self, samples: &[f32]) {
        let mut queue = match self.shared.queue.lock() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.extend(samples.iter().copied());
    }

    fn close(&mut self) {
        // The device thread drains queued audio and exits on its own
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for CpalPlaybackSink {
    fn drop(&mut self) {
        self.close();
    }
}
