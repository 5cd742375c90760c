//! Duplex channel to the inference endpoint
//!
//! The session core consumes this capability but does not care how it is
//! transported: `connect` yields a send handle plus a single ordered event
//! stream. Exactly one event is processed at a time, in arrival order.
//!
//! One concrete adapter ships with the crate (`NatsChannel`); tests supply
//! their own scripted implementations.

pub mod nats;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::codec::PcmChunk;
use crate::error::LiveError;

pub use nats::NatsChannel;

/// Configuration handed to `DuplexChannel::connect`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Endpoint URL (transport-specific)
    pub url: String,

    /// Unique session identifier, scopes the wire subjects
    pub session_id: String,

    /// Model requested from the inference endpoint
    pub model: String,

    /// Prebuilt voice used for synthesized audio
    pub voice: String,
}

/// Out-of-band asset forwarded verbatim to the endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Base64-encoded payload, not validated beyond presence
    pub data: String,
}

/// One outbound wire frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundFrame {
    Audio(PcmChunk),
    Attachment(Attachment),
}

/// Inline data part of a server message (audio or image)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlinePart {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Base64-encoded payload
    pub data: String,
}

impl InlinePart {
    /// Inline audio parts carry 16-bit PCM, implicitly 24 kHz mono
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }
}

/// Message payload received from the inference endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Partial transcription of the user's audio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_transcription: Option<String>,

    /// Partial transcription of the model's audio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_transcription: Option<String>,

    /// Marks the end of one conversational turn
    #[serde(default, rename = "turnComplete")]
    pub turn_complete: bool,

    /// Inline audio/image parts, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<InlinePart>,
}

/// Channel lifecycle and payload events, delivered in arrival order
#[derive(Debug)]
pub enum ChannelEvent {
    /// The endpoint accepted the session
    Opened,
    /// A server payload arrived
    Message(ServerMessage),
    /// The endpoint closed the session
    Closed,
    /// Asynchronous failure after connect
    Error(String),
}

/// Live send handle for an open channel session
///
/// `send` is fire-and-forget: queuing and backpressure are the channel's
/// responsibility, and the capture path never waits on a send. `close` must
/// be safe to call when the session is already closed.
pub trait ChannelSession: Send + Sync {
    fn send(&self, frame: OutboundFrame);
    fn close(&self);
}

/// Bidirectional message channel to the inference endpoint
#[async_trait]
pub trait DuplexChannel: Send + Sync {
    /// Open a session, returning the send handle and the ordered event stream
    async fn connect(
        &self,
        config: &ChannelConfig,
    ) -> Result<(Arc<dyn ChannelSession>, mpsc::Receiver<ChannelEvent>), LiveError>;
}
