pub mod audio;
pub mod billing;
pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod transcript;

pub use audio::{
    AudioBackendFactory, AudioBackendKind, CaptureBackend, CaptureConfig, CaptureHandle,
    InboundAudioBuffer, PlaybackBackend, PlaybackConfig, PlaybackCursor, PlaybackScheduler,
    PlaybackSink,
};
pub use billing::{BillingMeter, CreditSink};
pub use channel::{
    Attachment, ChannelConfig, ChannelEvent, ChannelSession, DuplexChannel, InlinePart,
    NatsChannel, OutboundFrame, ServerMessage,
};
pub use codec::PcmChunk;
pub use config::Config;
pub use error::LiveError;
pub use http::{create_router, AppState};
pub use session::{LiveSessionConfig, SessionController, SessionState, SessionStatus};
pub use transcript::{Direction, TranscriptAggregator, TranscriptEntry};
