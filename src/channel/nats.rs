//! NATS-backed duplex channel adapter
//!
//! Bridges the abstract channel capability onto NATS subjects:
//! - `live.control.<session>`: session setup (model, voice)
//! - `live.input.<session>`: outbound frames (audio chunks, attachments)
//! - `live.server.<session>`: inbound server messages
//!
//! The session core only ever sees the `DuplexChannel` trait; this adapter is
//! what the shipped binary wires in.

use async_trait::async_trait;
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{ChannelConfig, ChannelEvent, ChannelSession, DuplexChannel, OutboundFrame, ServerMessage};
use crate::error::LiveError;

/// Outbound frames queued beyond this are dropped rather than blocking
const SEND_QUEUE_DEPTH: usize = 256;

/// `DuplexChannel` implementation over NATS pub/sub
pub struct NatsChannel;

impl NatsChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NatsChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DuplexChannel for NatsChannel {
    async fn connect(
        &self,
        config: &ChannelConfig,
    ) -> Result<(Arc<dyn ChannelSession>, mpsc::Receiver<ChannelEvent>), LiveError> {
        info!("Connecting to NATS at {}", config.url);

        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| LiveError::Connect(format!("NATS connect to {}: {}", config.url, e)))?;

        let server_subject = format!("live.server.{}", config.session_id);
        let subscriber = client
            .subscribe(server_subject.clone())
            .await
            .map_err(|e| LiveError::Connect(format!("subscribe {}: {}", server_subject, e)))?;

        // Announce the session before any audio flows
        let control_subject = format!("live.control.{}", config.session_id);
        let setup = serde_json::to_vec(config)
            .map_err(|e| LiveError::Connect(format!("encode session setup: {}", e)))?;
        client
            .publish(control_subject, setup.into())
            .await
            .map_err(|e| LiveError::Connect(format!("publish session setup: {}", e)))?;

        info!("Connected to NATS, session {}", config.session_id);

        let (send_tx, send_rx) = mpsc::channel::<OutboundFrame>(SEND_QUEUE_DEPTH);
        let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>(64);

        let input_subject = format!("live.input.{}", config.session_id);
        let publisher = tokio::spawn(publish_outbound(client, input_subject, send_rx));
        let listener = tokio::spawn(drain_server_messages(subscriber, event_tx));

        let session = Arc::new(NatsSession {
            send_tx,
            closed: AtomicBool::new(false),
            tasks: Mutex::new(vec![publisher, listener]),
        });

        Ok((session, event_rx))
    }
}

/// Forward queued outbound frames to the input subject
async fn publish_outbound(
    client: async_nats::Client,
    subject: String,
    mut send_rx: mpsc::Receiver<OutboundFrame>,
) {
    while let Some(frame) = send_rx.recv().await {
        let payload = match serde_json::to_vec(&frame) {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to encode outbound frame: {}", e);
                continue;
            }
        };

        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
            error!("Failed to publish outbound frame: {}", e);
        }
    }
}

/// Map the server-message subscription onto the ordered event stream
async fn drain_server_messages(
    mut subscriber: async_nats::Subscriber,
    event_tx: mpsc::Sender<ChannelEvent>,
) {
    if event_tx.send(ChannelEvent::Opened).await.is_err() {
        return;
    }

    while let Some(msg) = subscriber.next().await {
        match serde_json::from_slice::<ServerMessage>(&msg.payload) {
            Ok(server_msg) => {
                if event_tx.send(ChannelEvent::Message(server_msg)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                // A malformed server payload is skipped; later ones still flow
                warn!("Failed to parse server message: {}", e);
            }
        }
    }

    let _ = event_tx.send(ChannelEvent::Closed).await;
}

struct NatsSession {
    send_tx: mpsc::Sender<OutboundFrame>,
    closed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChannelSession for NatsSession {
    fn send(&self, frame: OutboundFrame) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        // Fire-and-forget: a full queue drops the frame instead of blocking
        if self.send_tx.try_send(frame).is_err() {
            warn!("Outbound queue full, frame dropped");
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        for task in tasks {
            task.abort();
        }

        info!("NATS channel session closed");
    }
}

impl Drop for NatsSession {
    fn drop(&mut self) {
        self.close();
    }
}
