// Integration tests for the session controller state machine
//
// Real devices are replaced by the sim audio backends and the duplex channel
// by a scripted mock, so every lifecycle path runs without hardware or a
// network endpoint.

use async_trait::async_trait;
use halo_live::audio::{FailingCaptureBackend, SimCaptureBackend, SimPlaybackBackend};
use halo_live::billing::CreditSink;
use halo_live::channel::{
    Attachment, ChannelConfig, ChannelEvent, ChannelSession, DuplexChannel, OutboundFrame,
    ServerMessage,
};
use halo_live::codec;
use halo_live::error::LiveError;
use halo_live::session::{LiveSessionConfig, SessionController, SessionState};
use halo_live::transcript::Direction;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Mock channel
// ============================================================================

#[derive(Default)]
struct MockControl {
    connects: AtomicUsize,
    events: Mutex<Option<mpsc::Sender<ChannelEvent>>>,
    sent: Mutex<Vec<OutboundFrame>>,
    session_closed: AtomicBool,
}

impl MockControl {
    fn emit(&self, event: ChannelEvent) {
        let guard = self.events.lock().unwrap();
        if let Some(tx) = guard.as_ref() {
            tx.try_send(event).expect("mock event queue full");
        }
    }

    fn sent_audio(&self) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|f| matches!(f, OutboundFrame::Audio(_)))
            .count()
    }

    fn sent_attachments(&self) -> Vec<Attachment> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|f| match f {
                OutboundFrame::Attachment(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }
}

struct MockChannel {
    control: Arc<MockControl>,
}

impl MockChannel {
    fn new() -> (Self, Arc<MockControl>) {
        let control = Arc::new(MockControl::default());
        (
            Self {
                control: Arc::clone(&control),
            },
            control,
        )
    }
}

#[async_trait]
impl DuplexChannel for MockChannel {
    async fn connect(
        &self,
        _config: &ChannelConfig,
    ) -> Result<(Arc<dyn ChannelSession>, mpsc::Receiver<ChannelEvent>), LiveError> {
        self.control.connects.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(64);
        *self.control.events.lock().unwrap() = Some(tx);

        let session = Arc::new(MockSession {
            control: Arc::clone(&self.control),
        });
        Ok((session, rx))
    }
}

struct MockSession {
    control: Arc<MockControl>,
}

impl ChannelSession for MockSession {
    fn send(&self, frame: OutboundFrame) {
        self.control.sent.lock().unwrap().push(frame);
    }

    fn close(&self) {
        self.control.session_closed.store(true, Ordering::SeqCst);
        // Dropping the sender ends the event stream
        self.control.events.lock().unwrap().take();
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct Fixture {
    controller: Arc<SessionController>,
    control: Arc<MockControl>,
    capture: Arc<SimCaptureBackend>,
    playback_state: Arc<halo_live::audio::SimPlaybackState>,
    deltas: Arc<Mutex<Vec<i64>>>,
}

fn fixture_with_frames(frames: Vec<Vec<f32>>) -> Fixture {
    let (channel, control) = MockChannel::new();
    let capture = Arc::new(SimCaptureBackend::with_frames(frames));
    let (playback_backend, playback_state) = SimPlaybackBackend::new();

    let deltas = Arc::new(Mutex::new(Vec::new()));
    let sink_deltas = Arc::clone(&deltas);
    let sink: CreditSink = Arc::new(move |amount| {
        sink_deltas.lock().unwrap().push(amount);
    });

    let config = LiveSessionConfig {
        billing_cost: 40,
        billing_interval: Duration::from_millis(600_000),
        ..LiveSessionConfig::default()
    };

    let controller = SessionController::new(
        config,
        Arc::new(channel),
        Arc::clone(&capture) as Arc<dyn halo_live::audio::CaptureBackend>,
        Arc::new(playback_backend),
        sink,
    );

    Fixture {
        controller,
        control,
        capture,
        playback_state,
        deltas,
    }
}

fn fixture() -> Fixture {
    fixture_with_frames(Vec::new())
}

async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {}", what);
}

async fn connect(fx: &Fixture) {
    fx.controller.start().await.unwrap();
    fx.control.emit(ChannelEvent::Opened);
    let controller = Arc::clone(&fx.controller);
    wait_until(
        move || controller.state() == SessionState::Connected,
        "session to connect",
    )
    .await;
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_transitions_through_connecting_to_connected() {
    let fx = fixture();

    fx.controller.start().await.unwrap();
    assert_eq!(fx.controller.state(), SessionState::Connecting);
    assert_eq!(fx.control.connects.load(Ordering::SeqCst), 1);

    fx.control.emit(ChannelEvent::Opened);
    let controller = Arc::clone(&fx.controller);
    wait_until(
        move || controller.state() == SessionState::Connected,
        "connected state",
    )
    .await;

    // Opening charge issued exactly once
    assert_eq!(*fx.deltas.lock().unwrap(), vec![-40]);

    fx.controller.stop().await;
}

#[tokio::test]
async fn test_start_while_active_is_a_noop() {
    let fx = fixture();
    connect(&fx).await;

    fx.controller.start().await.unwrap();

    assert_eq!(fx.controller.state(), SessionState::Connected);
    assert_eq!(fx.control.connects.load(Ordering::SeqCst), 1);
    assert_eq!(*fx.deltas.lock().unwrap(), vec![-40]);

    fx.controller.stop().await;
}

#[tokio::test]
async fn test_stop_while_disconnected_is_a_noop() {
    let fx = fixture();

    fx.controller.stop().await;
    fx.controller.stop().await;

    assert_eq!(fx.controller.state(), SessionState::Disconnected);
    assert_eq!(fx.control.connects.load(Ordering::SeqCst), 0);
    assert!(fx.deltas.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stop_releases_everything_and_is_idempotent() {
    let fx = fixture();
    connect(&fx).await;

    fx.controller.stop().await;

    assert_eq!(fx.controller.state(), SessionState::Disconnected);
    assert!(fx.capture.was_closed());
    assert!(fx.playback_state.is_closed());
    assert!(fx.control.session_closed.load(Ordering::SeqCst));
    assert_eq!(fx.controller.volume(), 0.0);
    assert!(fx.controller.last_error().await.is_none());

    // Second stop has no additional effect
    fx.controller.stop().await;
    assert_eq!(fx.controller.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_restart_after_stop_is_safe() {
    let fx = fixture();
    connect(&fx).await;
    fx.controller.stop().await;

    fx.controller.start().await.unwrap();
    assert_eq!(fx.controller.state(), SessionState::Connecting);
    assert_eq!(fx.control.connects.load(Ordering::SeqCst), 2);

    fx.controller.stop().await;
}

// ============================================================================
// Failure paths
// ============================================================================

#[tokio::test]
async fn test_capture_failure_aborts_start_cleanly() {
    let (channel, control) = MockChannel::new();
    let (playback_backend, playback_state) = SimPlaybackBackend::new();
    let sink: CreditSink = Arc::new(|_| panic!("no charge without a connection"));

    let controller = SessionController::new(
        LiveSessionConfig::default(),
        Arc::new(channel),
        Arc::new(FailingCaptureBackend),
        Arc::new(playback_backend),
        sink,
    );

    let err = controller.start().await.unwrap_err();
    assert!(matches!(err, LiveError::DeviceUnavailable(_)));

    assert_eq!(controller.state(), SessionState::Disconnected);
    assert!(controller.last_error().await.is_some());
    // The channel was never reached, the playback device never opened
    assert_eq!(control.connects.load(Ordering::SeqCst), 0);
    assert!(!playback_state.is_closed());

    // Retrying after a failure is always safe
    let err = controller.start().await.unwrap_err();
    assert!(matches!(err, LiveError::DeviceUnavailable(_)));
}

struct FailingChannel;

#[async_trait]
impl DuplexChannel for FailingChannel {
    async fn connect(
        &self,
        _config: &ChannelConfig,
    ) -> Result<(Arc<dyn ChannelSession>, mpsc::Receiver<ChannelEvent>), LiveError> {
        Err(LiveError::Connect("endpoint unreachable".to_string()))
    }
}

#[tokio::test]
async fn test_connect_failure_releases_acquired_devices() {
    let capture = Arc::new(SimCaptureBackend::silent());
    let (playback_backend, playback_state) = SimPlaybackBackend::new();
    let sink: CreditSink = Arc::new(|_| panic!("no charge without a connection"));

    let controller = SessionController::new(
        LiveSessionConfig::default(),
        Arc::new(FailingChannel),
        Arc::clone(&capture) as Arc<dyn halo_live::audio::CaptureBackend>,
        Arc::new(playback_backend),
        sink,
    );

    let err = controller.start().await.unwrap_err();
    assert!(matches!(err, LiveError::Connect(_)));

    // Both devices were acquired before the connect attempt; neither leaks
    assert!(capture.was_closed());
    assert!(playback_state.is_closed());
    assert_eq!(controller.state(), SessionState::Disconnected);

    let error = controller.last_error().await.expect("error surfaced");
    assert!(error.contains("endpoint unreachable"));
}

#[tokio::test]
async fn test_channel_error_tears_down_end_to_end() {
    let fx = fixture();
    connect(&fx).await;
    assert_eq!(*fx.deltas.lock().unwrap(), vec![-40]);

    fx.control.emit(ChannelEvent::Error("net down".to_string()));

    let controller = Arc::clone(&fx.controller);
    wait_until(
        move || controller.state() == SessionState::Disconnected,
        "teardown after channel error",
    )
    .await;

    assert!(fx.capture.was_closed());
    assert!(fx.playback_state.is_closed());
    assert!(fx.control.session_closed.load(Ordering::SeqCst));
    assert_eq!(fx.controller.volume(), 0.0);

    let error = fx.controller.last_error().await.expect("error surfaced");
    assert!(error.contains("net down"));

    // Billing stopped with the session
    assert_eq!(*fx.deltas.lock().unwrap(), vec![-40]);
}

#[tokio::test]
async fn test_close_before_open_ends_disconnected() {
    let fx = fixture();

    fx.controller.start().await.unwrap();
    fx.control.emit(ChannelEvent::Closed);

    let controller = Arc::clone(&fx.controller);
    wait_until(
        move || controller.state() == SessionState::Disconnected,
        "teardown after early close",
    )
    .await;

    // Never connected, never charged, and the failed open is surfaced
    assert!(fx.deltas.lock().unwrap().is_empty());
    assert!(fx.capture.was_closed());
    let error = fx.controller.last_error().await.expect("error surfaced");
    assert!(error.contains("before the session opened"));
}

// ============================================================================
// Capture path
// ============================================================================

#[tokio::test]
async fn test_silence_gate_updates_volume_but_does_not_send() {
    let quiet = vec![0.005f32; 1600]; // rms 0.005, below the gate
    let voiced = vec![0.02f32; 1600]; // rms 0.02, above the gate
    let fx = fixture_with_frames(vec![quiet, voiced]);

    connect(&fx).await;

    let control = Arc::clone(&fx.control);
    wait_until(move || control.sent_audio() == 1, "voiced frame to send").await;

    let status = fx.controller.status().await;
    assert_eq!(status.frames_sent, 1);
    assert_eq!(status.frames_gated, 1);

    // The volume readout tracked the voiced frame: min(1, 0.02 * 6)
    assert!((fx.controller.volume() - 0.12).abs() < 1e-3);

    fx.controller.stop().await;
}

#[tokio::test]
async fn test_outbound_frames_carry_the_wire_format() {
    let fx = fixture_with_frames(vec![vec![0.5f32; 1600]]);
    connect(&fx).await;

    let control = Arc::clone(&fx.control);
    wait_until(move || control.sent_audio() == 1, "frame to send").await;

    let sent = fx.control.sent.lock().unwrap();
    let OutboundFrame::Audio(chunk) = &sent[0] else {
        panic!("expected an audio frame");
    };
    assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
    let bytes = codec::decode_base64(&chunk.data).unwrap();
    assert_eq!(bytes.len(), 3200); // 1600 samples, 2 bytes each
    drop(sent);

    fx.controller.stop().await;
}

// ============================================================================
// Inbound path
// ============================================================================

#[tokio::test]
async fn test_transcript_fragments_aggregate_per_turn() {
    let fx = fixture();
    connect(&fx).await;

    fx.control.emit(ChannelEvent::Message(ServerMessage {
        input_transcription: Some("a".to_string()),
        ..ServerMessage::default()
    }));
    fx.control.emit(ChannelEvent::Message(ServerMessage {
        output_transcription: Some("b".to_string()),
        ..ServerMessage::default()
    }));
    fx.control.emit(ChannelEvent::Message(ServerMessage {
        turn_complete: true,
        ..ServerMessage::default()
    }));

    let mut settled = false;
    for _ in 0..400 {
        if fx.controller.transcript().await.len() == 2 {
            settled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(settled, "timed out waiting for two transcript entries");

    let transcript = fx.controller.transcript().await;
    assert_eq!(transcript[0].role, Direction::User);
    assert_eq!(transcript[0].text, "a");
    assert_eq!(transcript[1].role, Direction::Model);
    assert_eq!(transcript[1].text, "b");

    fx.controller.stop().await;
}

#[tokio::test]
async fn test_inbound_audio_is_scheduled_for_playback() {
    let fx = fixture();
    connect(&fx).await;

    let pcm = codec::float_to_pcm16(&vec![0.25f32; 2400]); // 100ms at 24kHz
    fx.control.emit(ChannelEvent::Message(ServerMessage {
        parts: vec![halo_live::channel::InlinePart {
            mime_type: "audio/pcm;rate=24000".to_string(),
            data: codec::encode_base64(&pcm),
        }],
        ..ServerMessage::default()
    }));

    let playback_state = Arc::clone(&fx.playback_state);
    wait_until(
        move || playback_state.total_appended() == 2400,
        "inbound audio to reach the sink",
    )
    .await;

    fx.controller.stop().await;
}

#[tokio::test]
async fn test_malformed_audio_part_is_dropped_session_survives() {
    let fx = fixture();
    connect(&fx).await;

    let good = codec::float_to_pcm16(&vec![0.1f32; 240]);
    fx.control.emit(ChannelEvent::Message(ServerMessage {
        parts: vec![
            halo_live::channel::InlinePart {
                mime_type: "audio/pcm;rate=24000".to_string(),
                data: "!!!not base64!!!".to_string(),
            },
            halo_live::channel::InlinePart {
                mime_type: "audio/pcm;rate=24000".to_string(),
                data: codec::encode_base64(&good),
            },
        ],
        ..ServerMessage::default()
    }));

    let playback_state = Arc::clone(&fx.playback_state);
    wait_until(
        move || playback_state.total_appended() == 240,
        "valid part to play despite the malformed one",
    )
    .await;

    // Exactly one buffer reached the device; the session kept going
    assert_eq!(fx.playback_state.appended.lock().unwrap().len(), 1);
    assert_eq!(fx.controller.state(), SessionState::Connected);

    fx.controller.stop().await;
}

// ============================================================================
// Attachments
// ============================================================================

#[tokio::test]
async fn test_attachment_forwarded_when_connected() {
    let fx = fixture();
    connect(&fx).await;

    fx.controller
        .send_attachment(Attachment {
            name: "notes.png".to_string(),
            mime_type: "image/png".to_string(),
            data: "aGVsbG8=".to_string(),
        })
        .await;

    let attachments = fx.control.sent_attachments();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].name, "notes.png");
    assert_eq!(attachments[0].data, "aGVsbG8=");

    fx.controller.stop().await;
}

#[tokio::test]
async fn test_attachment_silently_dropped_when_disconnected() {
    let fx = fixture();

    fx.controller
        .send_attachment(Attachment {
            name: "ignored.png".to_string(),
            mime_type: "image/png".to_string(),
            data: "aGVsbG8=".to_string(),
        })
        .await;

    assert!(fx.control.sent_attachments().is_empty());
}
