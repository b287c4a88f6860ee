use crate::error::{Result, VoiceStreamError};
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Outbound message sent to the streaming endpoint, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    VoiceChunk(VoiceChunk),
}

/// One framed, sequenced unit of session audio (or the terminal marker)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceChunk {
    pub session_id: String,

    /// Position in the session's outbound sequence, starting at 0
    pub seq: u64,

    /// Base64-encoded PCM bytes; absent on the terminal marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    pub is_last: bool,

    /// Capture time, epoch milliseconds
    pub timestamp: i64,
}

impl VoiceChunk {
    /// Build an audio-bearing chunk from raw PCM bytes
    pub fn audio(session_id: impl Into<String>, seq: u64, pcm: &[u8]) -> Self {
        Self {
            session_id: session_id.into(),
            seq,
            data: Some(base64::engine::general_purpose::STANDARD.encode(pcm)),
            is_last: false,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Build the terminal marker closing a session's stream
    pub fn last(session_id: impl Into<String>, seq: u64) -> Self {
        Self {
            session_id: session_id.into(),
            seq,
            data: None,
            is_last: true,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Decode the base64 payload back into PCM bytes, if present
    pub fn payload_bytes(&self) -> Result<Option<Vec<u8>>> {
        match &self.data {
            Some(data) => base64::engine::general_purpose::STANDARD
                .decode(data)
                .map(Some)
                .map_err(|e| VoiceStreamError::InvalidChunk {
                    message: format!("undecodable payload: {e}"),
                }),
            None => Ok(None),
        }
    }
}

/// Transcription/translation result received from the streaming endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Session the result belongs to, when the server echoes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Sequence number of the chunk that produced this result
    pub seq: u64,

    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_lang: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
}
