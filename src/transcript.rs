//! Transcript aggregation
//!
//! The endpoint streams transcription in fragments, interleaved for both
//! directions of the conversation. Fragments accumulate per direction until a
//! turn-complete marker, at which point each non-empty accumulator is drained
//! to exactly one finalized entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the conversation a fragment belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    User,
    Model,
}

/// One finalized conversational turn
///
/// Append-only: entries are never mutated after emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Direction,
    pub text: String,

    /// When the turn was finalized
    pub timestamp: DateTime<Utc>,
}

/// Accumulates transcription fragments and emits finalized turns
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    user_text: String,
    model_text: String,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment to its direction's accumulator
    pub fn push(&mut self, direction: Direction, text: &str) {
        match direction {
            Direction::User => self.user_text.push_str(text),
            Direction::Model => self.model_text.push_str(text),
        }
    }

    /// Drain the accumulators at a turn boundary
    ///
    /// Emits one entry per non-empty direction, user before model. A silent
    /// turn (both accumulators empty) emits nothing. Both accumulators are
    /// cleared either way.
    pub fn complete_turn(&mut self) -> Vec<TranscriptEntry> {
        let mut entries = Vec::new();
        let now = Utc::now();

        if !self.user_text.is_empty() {
            entries.push(TranscriptEntry {
                role: Direction::User,
                text: std::mem::take(&mut self.user_text),
                timestamp: now,
            });
        }

        if !self.model_text.is_empty() {
            entries.push(TranscriptEntry {
                role: Direction::Model,
                text: std::mem::take(&mut self.model_text),
                timestamp: now,
            });
        }

        entries
    }
}
