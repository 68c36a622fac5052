use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::SessionPhase;
use crate::transcript::TranscriptEntry;

/// Statistics about the current (or last) live session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// When the session started
    pub started_at: Option<DateTime<Utc>>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Microphone frames handed to the transport
    pub frames_sent: u64,

    /// Agent audio chunks placed on the playback timeline
    pub chunks_scheduled: u64,

    /// Chunks dropped as undecodable or stale
    pub chunks_dropped: u64,

    /// Barge-in signals received
    pub interruptions: u64,

    /// Turn-complete signals received
    pub turns_completed: u64,

    /// Buffers currently scheduled or sounding
    pub in_flight: usize,
}

/// Everything a UI needs to render the session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub phase: SessionPhase,
    pub status_text: String,
    pub last_error: Option<String>,
    pub transcript: Vec<TranscriptEntry>,
    pub stats: SessionStats,
}
