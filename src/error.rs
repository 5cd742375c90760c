use thiserror::Error;

/// Errors produced by the live-session subsystem
///
/// Everything except `Decode` is fatal to the session: the controller tears
/// down all resources and surfaces the message through the status readout.
/// `Decode` is recovered locally by dropping the offending payload.
#[derive(Debug, Error)]
pub enum LiveError {
    /// Microphone access was refused by the OS
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// Capture or playback device missing or unusable
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Duplex channel could not be opened
    #[error("channel connect failed: {0}")]
    Connect(String),

    /// Asynchronous channel failure after open
    #[error("channel error: {0}")]
    Channel(String),

    /// Malformed inbound payload (non-fatal, the buffer is dropped)
    #[error("decode error: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, LiveError>;
