//! HTTP API server for external control (presentation layer)
//!
//! This module provides a REST API for driving the live session:
//! - POST /live/start - Start the live session
//! - POST /live/stop - Stop the live session
//! - GET /live/status - Session state, volume and counters
//! - GET /live/transcript - Accumulated transcript
//! - POST /live/attachment - Forward an asset to the endpoint
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
