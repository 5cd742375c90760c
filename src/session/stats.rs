use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::controller::SessionState;

/// Point-in-time snapshot of a live session, for presentation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Connection state
    pub state: SessionState,

    /// Normalized input level in [0.0, 1.0], updated once per captured frame
    pub volume: f32,

    /// When the current session was started, if one is active
    pub started_at: Option<DateTime<Utc>>,

    /// Frames forwarded to the channel so far
    pub frames_sent: usize,

    /// Frames suppressed by the silence gate
    pub frames_gated: usize,

    /// Finalized transcript entries so far
    pub transcript_entries: usize,

    /// Last fatal session error, if any
    pub error: Option<String>,
}
