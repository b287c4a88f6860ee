//! Voice streaming session management
//!
//! This module provides the `VoiceStreamSession` abstraction that manages:
//! - Audio capture through a pluggable source
//! - Framing, encoding, and sequencing of outbound voice chunks
//! - The final end-of-stream marker on stop
//! - Transcript collection from the streaming endpoint
//! - Session statistics and state

mod config;
mod session;
mod stats;

pub use config::SessionConfig;
pub use session::{SessionState, VoiceStreamSession};
pub use stats::{SessionStats, TranscriptSegment};

/// A fresh unique session identifier
pub fn generate_session_id() -> String {
    format!("session-{}", uuid::Uuid::new_v4())
}
