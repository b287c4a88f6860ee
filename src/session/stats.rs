use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics about a voice streaming session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Identifier of the current (or most recent) session
    pub session_id: Option<String>,

    /// Whether a session is currently streaming
    pub is_recording: bool,

    /// When the session started
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds elapsed since the session started
    pub duration_secs: f64,

    /// Voice chunks handed to the transport, including the final marker
    pub chunks_emitted: u64,

    /// Transcript segments received from the streaming endpoint
    pub transcript_segments: usize,

    /// Chunks waiting in the pending buffer for the next reconnect
    pub pending_chunks: usize,

    /// Chunks evicted from the pending buffer because it was full
    pub dropped_chunks: u64,

    /// Why the transport stopped for good, if it has
    pub terminal_error: Option<String>,
}

/// A single transcript segment from the streaming endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Sequence number echoed by the endpoint
    pub seq: u64,

    /// Transcribed text
    pub text: String,

    /// Language the endpoint detected, if reported
    pub detected_lang: Option<String>,

    /// Translation of the text, if the endpoint produced one
    pub translated_text: Option<String>,

    /// When this segment was received
    pub received_at: DateTime<Utc>,
}
