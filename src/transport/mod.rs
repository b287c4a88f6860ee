//! Reconnecting duplex channel to the streaming endpoint
//!
//! The transport owns the connection lifecycle: it dials the endpoint in a
//! background supervisor task, retries with exponential backoff when the link
//! drops, flushes chunks buffered in the `SessionRegistry` after each
//! reconnect, and delivers inbound server messages over an `mpsc` event
//! channel. Callers hand it chunks through [`Transport::send`], which never
//! blocks on the network.

mod messages;
mod ws;

pub use messages::{ClientMessage, ServerMessage, VoiceChunk};
pub use ws::WsTransport;

use crate::error::{Result, VoiceStreamError};
use std::time::Duration;

/// Tuning for the connection lifecycle
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base endpoint URL (`ws://` or `wss://`); the auth token is appended
    /// as a `token` query parameter
    pub endpoint: String,

    /// Bound on a single connection attempt
    pub connect_timeout: Duration,

    /// First reconnect delay; doubles on each consecutive failure
    pub reconnect_base: Duration,

    /// Ceiling on the reconnect delay
    pub reconnect_max: Duration,

    /// Consecutive failed attempts before giving up (0 = retry forever)
    pub max_reconnect_attempts: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8090/voice".to_string(),
            connect_timeout: Duration::from_secs(10),
            reconnect_base: Duration::from_millis(800),
            reconnect_max: Duration::from_secs(30),
            max_reconnect_attempts: 12,
        }
    }
}

impl TransportConfig {
    /// Backoff delay before reconnect attempt `attempt` (1-based):
    /// `base * 2^(attempt-1)`, clamped to the ceiling
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(10);
        let factor = 1u64 << exp;
        let base_ms = self.reconnect_base.as_millis() as u64;
        let max_ms = self.reconnect_max.as_millis() as u64;
        Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Events delivered to the transport's consumer, in arrival order
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The link is (re-)established; buffered chunks have been flushed
    Connected,
    /// A parsed inbound message from the endpoint
    Message(ServerMessage),
    /// The transport stopped on its own and will not retry
    Terminated(TerminalReason),
}

/// Why the transport stopped retrying
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalReason {
    /// The endpoint rejected the auth token; reconnecting with the same
    /// credential would fail again
    AuthRejected { status: u16 },
    /// The consecutive-failure ceiling was exceeded
    RetriesExhausted { attempts: u32 },
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthRejected { status } => {
                write!(f, "auth token rejected (HTTP {status})")
            }
            Self::RetriesExhausted { attempts } => {
                write!(f, "gave up after {attempts} reconnect attempts")
            }
        }
    }
}

impl From<TerminalReason> for VoiceStreamError {
    fn from(reason: TerminalReason) -> Self {
        match reason {
            TerminalReason::AuthRejected { status } => Self::AuthRejected { status },
            TerminalReason::RetriesExhausted { attempts } => Self::RetriesExhausted { attempts },
        }
    }
}

/// Outbound seam between the session and the wire, so tests can substitute a
/// recording fake
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Hand one chunk to the channel. Queued on the live link when connected,
    /// buffered in the registry otherwise; never blocks on the network.
    async fn send(&self, chunk: VoiceChunk) -> Result<()>;
}
