use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::LiveSessionConfig;
use super::stats::SessionStatus;
use crate::audio::{
    frame_rms, CaptureBackend, CaptureConfig, CaptureHandle, CaptureTap, InboundAudioBuffer,
    PlaybackBackend, PlaybackConfig, PlaybackScheduler,
};
use crate::billing::{BillingMeter, CreditSink};
use crate::channel::{
    Attachment, ChannelEvent, ChannelSession, DuplexChannel, OutboundFrame, ServerMessage,
};
use crate::codec::{self, PcmChunk};
use crate::error::LiveError;
use crate::transcript::{Direction, TranscriptAggregator, TranscriptEntry};

/// Connection state of the live session
///
/// The only reachable transitions are
/// `Disconnected → Connecting → Connected → Disconnected`; `stop()` from any
/// state ends in `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// Resources acquired by `start()`, released exactly once on teardown
///
/// The controller holds at most one live handle per resource type; no handle
/// outlives the session that created it.
struct ActiveResources {
    capture: CaptureHandle,
    playback: Arc<Mutex<PlaybackScheduler>>,
    session: Arc<dyn ChannelSession>,
    billing: Arc<BillingMeter>,
    pump: JoinHandle<()>,
    events: JoinHandle<()>,
    started_at: DateTime<Utc>,
}

/// Orchestrates one live audio session end to end
///
/// Owns the session state machine and every acquired resource: microphone
/// capture, playback scheduling, the duplex channel session, and the billing
/// timer. All other components are state-blind.
pub struct SessionController {
    config: LiveSessionConfig,
    channel: Arc<dyn DuplexChannel>,
    capture_backend: Arc<dyn CaptureBackend>,
    playback_backend: Arc<dyn PlaybackBackend>,
    credit_sink: CreditSink,

    /// Single source of truth for the session state
    state: AtomicU8,

    /// Volume readout, stored as f32 bits so readers never block
    volume: AtomicU32,

    frames_sent: AtomicUsize,
    frames_gated: AtomicUsize,

    /// Finalized transcript, append-only
    transcripts: Mutex<Vec<TranscriptEntry>>,

    /// Last fatal error, surfaced through the status readout
    last_error: Mutex<Option<String>>,

    active: Mutex<Option<ActiveResources>>,
}

impl SessionController {
    pub fn new(
        config: LiveSessionConfig,
        channel: Arc<dyn DuplexChannel>,
        capture_backend: Arc<dyn CaptureBackend>,
        playback_backend: Arc<dyn PlaybackBackend>,
        credit_sink: CreditSink,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            channel,
            capture_backend,
            playback_backend,
            credit_sink,
            state: AtomicU8::new(SessionState::Disconnected as u8),
            volume: AtomicU32::new(0.0f32.to_bits()),
            frames_sent: AtomicUsize::new(0),
            frames_gated: AtomicUsize::new(0),
            transcripts: Mutex::new(Vec::new()),
            last_error: Mutex::new(None),
            active: Mutex::new(None),
        })
    }

    /// Start a live session
    ///
    /// No-op unless currently `Disconnected`. Acquires the microphone, the
    /// playback device and the duplex channel in that order; any failure
    /// releases whatever was already acquired and surfaces the error, leaving
    /// the controller `Disconnected` so a retry is always safe.
    pub async fn start(self: &Arc<Self>) -> Result<(), LiveError> {
        if self
            .state
            .compare_exchange(
                SessionState::Disconnected as u8,
                SessionState::Connecting as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            debug!("start() ignored, session already active");
            return Ok(());
        }

        info!("Starting live session {}", self.config.session_id);
        *self.last_error.lock().await = None;
        self.frames_sent.store(0, Ordering::SeqCst);
        self.frames_gated.store(0, Ordering::SeqCst);

        if let Err(e) = self.acquire().await {
            warn!("Failed to start live session: {}", e);
            self.teardown(Some(e.to_string())).await;
            return Err(e);
        }

        Ok(())
    }

    /// Acquire all session resources and spawn the worker tasks
    async fn acquire(self: &Arc<Self>) -> Result<(), LiveError> {
        let capture_config = CaptureConfig {
            sample_rate: self.config.capture_sample_rate,
            frame_samples: self.config.frame_samples(),
        };
        let mut capture = self.capture_backend.open(&capture_config)?;

        let playback_config = PlaybackConfig {
            sample_rate: self.config.playback_sample_rate,
        };
        let sink = match self.playback_backend.open(&playback_config) {
            Ok(sink) => sink,
            Err(e) => {
                capture.close();
                return Err(e);
            }
        };
        let mut scheduler = PlaybackScheduler::new(sink);
        scheduler.reset();
        let playback = Arc::new(Mutex::new(scheduler));

        let (session, events) = match self.channel.connect(&self.config.channel_config()).await {
            Ok(connected) => connected,
            Err(e) => {
                playback.lock().await.close();
                capture.close();
                return Err(e);
            }
        };

        let mut active = self.active.lock().await;

        // stop() may have preempted the connection attempt
        if self.state.load(Ordering::SeqCst) != SessionState::Connecting as u8 {
            info!("Session stopped during connect, rolling back");
            session.close();
            playback.lock().await.close();
            capture.close();
            return Ok(());
        }

        let Some(frames) = capture.take_frames() else {
            session.close();
            playback.lock().await.close();
            capture.close();
            return Err(LiveError::DeviceUnavailable(
                "capture handle yielded no frame stream".to_string(),
            ));
        };

        let tap = self.open_tap();
        let billing = Arc::new(BillingMeter::new(
            self.config.billing_cost,
            self.config.billing_interval,
            Arc::clone(&self.credit_sink),
        ));

        let pump = tokio::spawn(Arc::clone(self).pump_frames(
            frames,
            Arc::clone(&session),
            tap,
        ));
        let event_task = tokio::spawn(Arc::clone(self).drain_events(
            events,
            Arc::clone(&playback),
            Arc::clone(&billing),
        ));

        *active = Some(ActiveResources {
            capture,
            playback,
            session,
            billing,
            pump,
            events: event_task,
            started_at: Utc::now(),
        });

        Ok(())
    }

    /// Stop the session from any state; idempotent
    pub async fn stop(&self) {
        self.teardown(None).await;
    }

    /// Release every acquired resource and end `Disconnected`
    ///
    /// Billing is cancelled first so no tick can fire mid-teardown, then the
    /// remaining resources are released in reverse-acquisition order. Each
    /// release step stands alone: none of them can prevent the others.
    async fn teardown(&self, reason: Option<String>) {
        let resources = self.active.lock().await.take();

        if let Some(message) = reason {
            error!("Live session ended with error: {}", message);
            *self.last_error.lock().await = Some(message);
        }

        if let Some(mut resources) = resources {
            resources.billing.on_close().await;
            resources.session.close();
            resources.playback.lock().await.close();
            resources.capture.close();

            // Worker tasks end on their own once their inputs close; abort
            // covers the case where this teardown raced their next receive.
            // When the event task itself triggered teardown, the abort lands
            // after its final statement and is harmless.
            resources.pump.abort();
            resources.events.abort();

            info!("Live session {} stopped", self.config.session_id);
        }

        self.state
            .store(SessionState::Disconnected as u8, Ordering::SeqCst);
        self.volume.store(0.0f32.to_bits(), Ordering::SeqCst);
    }

    /// Forward an out-of-band asset to the endpoint, best-effort
    ///
    /// Silently dropped unless the session is `Connected`.
    pub async fn send_attachment(&self, attachment: Attachment) {
        if self.state() != SessionState::Connected {
            debug!(
                "Attachment '{}' dropped, session not connected",
                attachment.name
            );
            return;
        }

        let session = self
            .active
            .lock()
            .await
            .as_ref()
            .map(|r| Arc::clone(&r.session));

        if let Some(session) = session {
            session.send(OutboundFrame::Attachment(attachment));
        }
    }

    /// Pump captured frames through the gate and onto the wire
    ///
    /// Runs until the capture handle closes. The volume readout is updated
    /// for every frame; only frames above the silence threshold are encoded
    /// and sent. `send` is fire-and-forget; the pump never waits on it.
    async fn pump_frames(
        self: Arc<Self>,
        mut frames: mpsc::Receiver<Vec<f32>>,
        session: Arc<dyn ChannelSession>,
        mut tap: Option<CaptureTap>,
    ) {
        debug!("Capture pump started");

        while let Some(frame) = frames.recv().await {
            let rms = frame_rms(&frame);
            let level = (rms * self.config.volume_gain).min(1.0);
            self.volume.store(level.to_bits(), Ordering::Relaxed);

            if let Some(active_tap) = tap.as_mut() {
                if let Err(e) = active_tap.write_frame(&frame) {
                    warn!("Capture tap failed, disabling: {}", e);
                    tap = None;
                }
            }

            if rms < self.config.silence_rms {
                self.frames_gated.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            session.send(OutboundFrame::Audio(PcmChunk::from_samples(&frame)));
            self.frames_sent.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(active_tap) = tap {
            if let Err(e) = active_tap.finish() {
                warn!("Failed to finalize capture tap: {}", e);
            }
        }

        debug!("Capture pump finished");
    }

    /// Drain the ordered channel event stream
    ///
    /// Exactly one event is handled at a time, in arrival order. `Closed` and
    /// `Error` both tear the session down; `Error` additionally surfaces its
    /// reason.
    async fn drain_events(
        self: Arc<Self>,
        mut events: mpsc::Receiver<ChannelEvent>,
        playback: Arc<Mutex<PlaybackScheduler>>,
        billing: Arc<BillingMeter>,
    ) {
        let mut aggregator = TranscriptAggregator::new();

        while let Some(event) = events.recv().await {
            match event {
                ChannelEvent::Opened => {
                    if self
                        .state
                        .compare_exchange(
                            SessionState::Connecting as u8,
                            SessionState::Connected as u8,
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        )
                        .is_ok()
                    {
                        info!("Live session {} connected", self.config.session_id);
                        billing.on_open().await;
                    }
                }
                ChannelEvent::Message(message) => {
                    self.handle_message(message, &mut aggregator, &playback)
                        .await;
                }
                ChannelEvent::Closed => {
                    info!("Channel closed by endpoint");
                    // A close during Connecting is a failed open, not a
                    // normal shutdown
                    let reason = if self.state() == SessionState::Connecting {
                        Some("channel closed before the session opened".to_string())
                    } else {
                        None
                    };
                    self.teardown(reason).await;
                    break;
                }
                ChannelEvent::Error(reason) => {
                    self.teardown(Some(reason)).await;
                    break;
                }
            }
        }

        debug!("Event loop finished");
    }

    /// Demultiplex one server message into transcript and playback
    async fn handle_message(
        &self,
        message: ServerMessage,
        aggregator: &mut TranscriptAggregator,
        playback: &Arc<Mutex<PlaybackScheduler>>,
    ) {
        if let Some(text) = &message.input_transcription {
            aggregator.push(Direction::User, text);
        }
        if let Some(text) = &message.output_transcription {
            aggregator.push(Direction::Model, text);
        }

        if message.turn_complete {
            let entries = aggregator.complete_turn();
            if !entries.is_empty() {
                let mut transcripts = self.transcripts.lock().await;
                for entry in entries {
                    info!("Transcript [{:?}]: {}", entry.role, entry.text);
                    transcripts.push(entry);
                }
            }
        }

        for part in message.parts {
            if !part.is_audio() {
                continue;
            }

            // A malformed part is dropped on its own; the playback cursor is
            // untouched and later parts still play.
            match codec::decode_base64(&part.data) {
                Ok(bytes) => {
                    let buffer =
                        InboundAudioBuffer::from_pcm16(&bytes, self.config.playback_sample_rate);
                    playback.lock().await.enqueue(buffer);
                }
                Err(e) => {
                    warn!("Dropping malformed inbound audio part: {}", e);
                }
            }
        }
    }

    fn open_tap(&self) -> Option<CaptureTap> {
        let path = self.config.tap_path.as_ref()?;
        match CaptureTap::create(path, self.config.capture_sample_rate) {
            Ok(tap) => Some(tap),
            Err(e) => {
                // The tap is a debug aid; its failure never blocks a session
                warn!("Capture tap unavailable: {}", e);
                None
            }
        }
    }

    // ========================================================================
    // Readouts
    // ========================================================================

    /// Current session state
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Normalized input level in [0.0, 1.0]
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    /// Last fatal session error, if any
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.lock().await.clone()
    }

    /// Finalized transcript so far
    pub async fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcripts.lock().await.clone()
    }

    /// Point-in-time status snapshot
    pub async fn status(&self) -> SessionStatus {
        let started_at = self.active.lock().await.as_ref().map(|r| r.started_at);
        let transcript_entries = self.transcripts.lock().await.len();

        SessionStatus {
            state: self.state(),
            volume: self.volume(),
            started_at,
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_gated: self.frames_gated.load(Ordering::Relaxed),
            transcript_entries,
            error: self.last_error.lock().await.clone(),
        }
    }
}
