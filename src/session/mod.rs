//! Live session management
//!
//! This module provides the `SessionController` abstraction that manages:
//! - Microphone capture and the silence gate
//! - Outbound PCM encoding and channel sends
//! - Inbound audio playback scheduling
//! - Transcript aggregation
//! - Connection-time billing
//! - Session state and deterministic teardown

mod config;
mod controller;
mod stats;

pub use config::LiveSessionConfig;
pub use controller::{SessionController, SessionState};
pub use stats::SessionStatus;
