// Live Session Demo: drive a voice session against a NATS endpoint
//
// Pipeline:
// 1. cpal captures the microphone at 16kHz mono
// 2. Frames above the silence gate are encoded and published to NATS
// 3. The inference endpoint answers with audio parts and transcription
// 4. Inbound audio is scheduled for gapless playback; finalized turns print
//
// Prerequisites:
// - NATS server running: docker run -p 4222:4222 nats
// - An inference bridge serving live.input.<id> / live.server.<id>
//
// Usage: cargo run --example live_session

use anyhow::Result;
use halo_live::audio::{AudioBackendFactory, AudioBackendKind};
use halo_live::channel::NatsChannel;
use halo_live::session::{LiveSessionConfig, SessionController, SessionState};
use halo_live::CreditSink;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = LiveSessionConfig::default();
    info!("Session id: {}", config.session_id);

    let (capture, playback) = AudioBackendFactory::create(AudioBackendKind::Device);

    let credit_sink: CreditSink = Arc::new(|delta: i64| {
        info!("Credit delta: {}", delta);
    });

    let controller = SessionController::new(
        config,
        Arc::new(NatsChannel::new()),
        capture,
        playback,
        credit_sink,
    );

    controller.start().await?;
    info!("Session starting; speak into the microphone (Ctrl-C to stop)");

    let mut printed = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                let transcript = controller.transcript().await;
                for entry in transcript.iter().skip(printed) {
                    println!("[{:?}] {}", entry.role, entry.text);
                }
                printed = transcript.len();

                if controller.state() == SessionState::Disconnected {
                    if let Some(error) = controller.last_error().await {
                        eprintln!("Session ended: {}", error);
                    }
                    break;
                }
            }
        }
    }

    controller.stop().await;
    info!("Session stopped");

    Ok(())
}
