pub mod audio;
pub mod config;
pub mod error;
pub mod registry;
pub mod session;
pub mod transport;

pub use audio::{
    AudioCapture, AudioCaptureFactory, AudioFrame, CaptureConfig, CaptureSource, ScriptedCapture,
    ToneCapture, WavFileCapture,
};
pub use config::Config;
pub use error::{Result, VoiceStreamError};
pub use registry::SessionRegistry;
pub use session::{
    generate_session_id, SessionConfig, SessionState, SessionStats, TranscriptSegment,
    VoiceStreamSession,
};
pub use transport::{
    ClientMessage, ConnectionState, ServerMessage, TerminalReason, Transport, TransportConfig,
    TransportEvent, VoiceChunk, WsTransport,
};
