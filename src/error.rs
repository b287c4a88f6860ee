use thiserror::Error;

/// Errors surfaced by the voice streaming pipeline
#[derive(Error, Debug)]
pub enum VoiceStreamError {
    /// A session is already recording; concurrent sessions are rejected
    #[error("A recording session is already active: {session_id}")]
    AlreadyRecording { session_id: String },

    /// The capture device could not be started
    #[error("Audio capture unavailable: {message}")]
    CaptureUnavailable { message: String },

    /// The capture device did not stop within the configured bound
    #[error("Audio capture did not stop within {timeout_ms} ms")]
    CaptureStopTimeout { timeout_ms: u64 },

    /// A chunk failed synchronous validation before transmission
    #[error("Invalid chunk: {message}")]
    InvalidChunk { message: String },

    /// The streaming endpoint rejected the auth token during the handshake
    #[error("Streaming endpoint rejected the auth token (HTTP {status})")]
    AuthRejected { status: u16 },

    /// The transport gave up after exhausting its reconnect budget
    #[error("Gave up reconnecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// WebSocket-level failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Wire message serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration load or parse failure
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Convenience result type for voice streaming operations
pub type Result<T> = std::result::Result<T, VoiceStreamError>;
