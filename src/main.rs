use anyhow::{Context, Result};
use clap::Parser;
use halo_live::audio::{AudioBackendFactory, AudioBackendKind};
use halo_live::channel::NatsChannel;
use halo_live::{create_router, AppState, Config, SessionController};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "halo-live", about = "Live voice bridge to a multimodal inference endpoint")]
struct Args {
    /// Path to the configuration file (without extension)
    #[arg(long, default_value = "config/halo-live")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Channel endpoint: {}", cfg.channel.url);

    let kind = AudioBackendKind::parse(&cfg.audio.backend)?;
    let (capture_backend, playback_backend) = AudioBackendFactory::create(kind);

    // The credit balance itself lives with an external collaborator; this
    // process only reports the deltas it charges.
    let credit_sink: halo_live::CreditSink = Arc::new(|delta: i64| {
        info!(delta, "credit delta applied");
    });

    let controller = SessionController::new(
        cfg.session_config(),
        Arc::new(NatsChannel::new()),
        capture_backend,
        playback_backend,
        credit_sink,
    );

    let state = AppState::new(controller);
    let router = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);
    axum::serve(listener, router).await?;

    Ok(())
}
