use super::messages::{ClientMessage, ServerMessage, VoiceChunk};
use super::{ConnectionState, TerminalReason, Transport, TransportConfig, TransportEvent};
use crate::error::{Result, VoiceStreamError};
use crate::registry::SessionRegistry;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

/// Size of the event channel handed to the consumer
const EVENT_QUEUE_DEPTH: usize = 256;

/// Reconnecting WebSocket channel to the streaming endpoint.
///
/// A background supervisor task owns the socket: it dials, flushes the
/// registry's pending buffer on every successful (re)connect, carries live
/// traffic, and backs off exponentially between attempts. `send` routes
/// chunks to the live link or the pending buffer without ever touching the
/// network itself.
pub struct WsTransport {
    config: TransportConfig,
    registry: Arc<SessionRegistry>,
    link: Arc<Mutex<LinkState>>,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
    event_tx: mpsc::Sender<TransportEvent>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

/// Connection state plus the outbound handle of the live link.
/// `outbound` is `Some` exactly while the state is `Connected`; `send` and
/// the supervisor take this same lock, so routing decisions and state
/// transitions cannot interleave.
struct LinkState {
    state: ConnectionState,
    outbound: Option<mpsc::UnboundedSender<VoiceChunk>>,
}

impl WsTransport {
    /// Build the transport and the event receiver its consumer reads from.
    /// The receiver survives reconnects; it only closes when the transport
    /// is dropped.
    pub fn new(
        config: TransportConfig,
        registry: Arc<SessionRegistry>,
    ) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let transport = Self {
            config,
            registry,
            link: Arc::new(Mutex::new(LinkState {
                state: ConnectionState::Disconnected,
                outbound: None,
            })),
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            event_tx,
            supervisor: Mutex::new(None),
        };
        (transport, event_rx)
    }

    /// Start the connection supervisor. Idempotent: calling while the
    /// supervisor is alive is a no-op, so a caller cannot accidentally race
    /// two connection loops. After a terminal stop, calling again (with a
    /// fresh token if auth failed) starts a new supervisor.
    pub async fn connect(&self, auth_token: &str) {
        let mut supervisor = self.supervisor.lock().await;
        if let Some(handle) = supervisor.as_ref() {
            if !handle.is_finished() {
                debug!("connect ignored, transport already active");
                return;
            }
        }
        self.shutdown.store(false, Ordering::SeqCst);
        let ctx = SupervisorCtx {
            url: endpoint_url(&self.config.endpoint, auth_token),
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
            link: Arc::clone(&self.link),
            shutdown: Arc::clone(&self.shutdown),
            wake: Arc::clone(&self.wake),
            event_tx: self.event_tx.clone(),
        };
        info!(endpoint = %self.config.endpoint, "starting transport");
        *supervisor = Some(tokio::spawn(run_supervisor(ctx)));
    }

    /// Stop the supervisor: cancels any pending reconnect timer, closes the
    /// socket if open, and waits for the background task to finish. Safe to
    /// call from any state; idempotent.
    pub async fn disconnect(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_one();
        let handle = { self.supervisor.lock().await.take() };
        if let Some(handle) = handle {
            {
                let mut link = self.link.lock().await;
                if link.state != ConnectionState::Disconnected {
                    link.state = ConnectionState::Closing;
                }
            }
            info!("disconnecting transport");
            if let Err(e) = handle.await {
                error!(error = %e, "transport supervisor failed to join");
            }
        }
        let mut link = self.link.lock().await;
        link.state = ConnectionState::Disconnected;
        link.outbound = None;
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        self.link.lock().await.state
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn send(&self, chunk: VoiceChunk) -> Result<()> {
        if chunk.session_id.is_empty() {
            return Err(VoiceStreamError::InvalidChunk {
                message: "empty session id".to_string(),
            });
        }
        let link = self.link.lock().await;
        let chunk = match link.outbound.as_ref() {
            Some(tx) => match tx.send(chunk) {
                Ok(()) => return Ok(()),
                // writer went away between transitions; buffer instead
                Err(mpsc::error::SendError(chunk)) => chunk,
            },
            None => chunk,
        };
        drop(link);
        self.registry.add_pending(chunk).await;
        Ok(())
    }
}

struct SupervisorCtx {
    url: String,
    config: TransportConfig,
    registry: Arc<SessionRegistry>,
    link: Arc<Mutex<LinkState>>,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
    event_tx: mpsc::Sender<TransportEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkOutcome {
    /// The link died and should be re-established
    Dropped,
    /// Shutdown was requested; do not reconnect
    Shutdown,
}

enum Reaction {
    Retry,
    Stop,
}

async fn run_supervisor(ctx: SupervisorCtx) {
    let mut failures: u32 = 0;
    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            break;
        }
        set_link(&ctx.link, ConnectionState::Connecting).await;

        match tokio::time::timeout(ctx.config.connect_timeout, connect_async(ctx.url.as_str()))
            .await
        {
            Err(_) => {
                failures += 1;
                warn!(attempt = failures, "connection attempt timed out");
                if let Reaction::Stop = after_failed_attempt(&ctx, failures).await {
                    break;
                }
            }
            Ok(Err(e)) if auth_status(&e).is_some_and(|s| s == 401 || s == 403) => {
                let status = auth_status(&e).unwrap_or(0);
                error!(status, "streaming endpoint rejected the auth token");
                let _ = ctx
                    .event_tx
                    .send(TransportEvent::Terminated(TerminalReason::AuthRejected {
                        status,
                    }))
                    .await;
                break;
            }
            Ok(Err(e)) => {
                failures += 1;
                warn!(attempt = failures, error = %e, "connection attempt failed");
                if let Reaction::Stop = after_failed_attempt(&ctx, failures).await {
                    break;
                }
            }
            Ok(Ok((socket, _response))) => {
                failures = 0;
                let (tx, mut outbound_rx) = mpsc::unbounded_channel();
                // One critical section for drain + transition: no chunk can
                // slip between the flush snapshot and the connected state.
                let backlog = {
                    let mut link = ctx.link.lock().await;
                    let backlog = ctx.registry.drain_pending().await;
                    link.state = ConnectionState::Connected;
                    link.outbound = Some(tx);
                    backlog
                };
                info!(backlog = backlog.len(), "connected to streaming endpoint");
                if let Err(e) = ctx.event_tx.try_send(TransportEvent::Connected) {
                    debug!(error = %e, "no room for connected event");
                }

                let (outcome, unsent) = run_link(socket, &mut outbound_rx, backlog, &ctx).await;

                // Stop routing sends to the dead link before salvaging, so
                // the restored chunks stay ahead of anything buffered next.
                {
                    let mut link = ctx.link.lock().await;
                    link.outbound = None;
                    link.state = match outcome {
                        LinkOutcome::Shutdown => ConnectionState::Closing,
                        LinkOutcome::Dropped => ConnectionState::Disconnected,
                    };
                }
                let mut salvage = unsent;
                while let Ok(chunk) = outbound_rx.try_recv() {
                    salvage.push(chunk);
                }
                ctx.registry.restore_front(salvage).await;

                match outcome {
                    LinkOutcome::Shutdown => break,
                    LinkOutcome::Dropped => {
                        warn!("connection lost, scheduling reconnect");
                        if backoff_sleep(&ctx, 1).await {
                            break;
                        }
                    }
                }
            }
        }
    }
    set_link(&ctx.link, ConnectionState::Disconnected).await;
    debug!("transport supervisor finished");
}

/// Flush the backlog, then shuttle traffic until the link dies or shutdown
/// is requested. Returns the outcome plus any chunks that were pulled off
/// the queues but never written.
async fn run_link(
    socket: WsStream,
    outbound_rx: &mut mpsc::UnboundedReceiver<VoiceChunk>,
    backlog: Vec<VoiceChunk>,
    ctx: &SupervisorCtx,
) -> (LinkOutcome, Vec<VoiceChunk>) {
    let (mut sink, mut stream) = socket.split();

    let mut backlog: VecDeque<VoiceChunk> = backlog.into();
    let mut flushed = 0usize;
    while let Some(chunk) = backlog.pop_front() {
        if !ctx.registry.is_current(&chunk.session_id).await {
            debug!(
                session_id = %chunk.session_id,
                seq = chunk.seq,
                "discarding stale buffered chunk"
            );
            continue;
        }
        if let Err(e) = write_chunk(&mut sink, &chunk).await {
            warn!(error = %e, "flush failed");
            backlog.push_front(chunk);
            return (LinkOutcome::Dropped, backlog.into_iter().collect());
        }
        flushed += 1;
    }
    if flushed > 0 {
        info!(flushed, "flushed buffered chunks");
    }

    loop {
        tokio::select! {
            chunk = outbound_rx.recv() => match chunk {
                Some(chunk) => {
                    if !ctx.registry.is_current(&chunk.session_id).await {
                        debug!(
                            session_id = %chunk.session_id,
                            seq = chunk.seq,
                            "discarding stale chunk"
                        );
                        continue;
                    }
                    if let Err(e) = write_chunk(&mut sink, &chunk).await {
                        warn!(error = %e, "send failed");
                        return (LinkOutcome::Dropped, vec![chunk]);
                    }
                }
                None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return (LinkOutcome::Shutdown, Vec::new());
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => handle_inbound(&ctx.event_tx, &text),
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(?frame, "endpoint closed the connection");
                    return (LinkOutcome::Dropped, Vec::new());
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Binary(_))) => debug!("ignoring binary frame"),
                Some(Err(e)) => {
                    warn!(error = %e, "socket error");
                    return (LinkOutcome::Dropped, Vec::new());
                }
                None => {
                    debug!("socket stream ended");
                    return (LinkOutcome::Dropped, Vec::new());
                }
            },
            _ = ctx.wake.notified() => {
                if ctx.shutdown.load(Ordering::SeqCst) {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return (LinkOutcome::Shutdown, Vec::new());
                }
            }
        }
    }
}

/// A parsed inbound frame goes to the consumer; a malformed one is dropped
/// with a diagnostic and affects nothing.
fn handle_inbound(event_tx: &mpsc::Sender<TransportEvent>, text: &str) {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(message) => {
            debug!(seq = message.seq, "inbound message");
            match event_tx.try_send(TransportEvent::Message(message)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("event channel not keeping up, dropping inbound message");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("event receiver dropped, discarding inbound message");
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "discarding malformed inbound message");
        }
    }
}

async fn write_chunk(sink: &mut WsSink, chunk: &VoiceChunk) -> Result<()> {
    let json = serde_json::to_string(&ClientMessage::VoiceChunk(chunk.clone()))?;
    sink.send(WsMessage::Text(json)).await?;
    debug!(
        session_id = %chunk.session_id,
        seq = chunk.seq,
        is_last = chunk.is_last,
        "chunk written"
    );
    Ok(())
}

/// Emit the retries-exhausted terminal event or sleep out the backoff delay
async fn after_failed_attempt(ctx: &SupervisorCtx, failures: u32) -> Reaction {
    if ctx.config.max_reconnect_attempts > 0 && failures >= ctx.config.max_reconnect_attempts {
        error!(attempts = failures, "exhausted reconnect attempts");
        let _ = ctx
            .event_tx
            .send(TransportEvent::Terminated(TerminalReason::RetriesExhausted {
                attempts: failures,
            }))
            .await;
        return Reaction::Stop;
    }
    if backoff_sleep(ctx, failures).await {
        return Reaction::Stop;
    }
    Reaction::Retry
}

/// Sleep the backoff delay for `attempt`; returns true if shutdown was
/// requested in the meantime
async fn backoff_sleep(ctx: &SupervisorCtx, attempt: u32) -> bool {
    let delay = ctx.config.retry_delay(attempt);
    debug!(
        attempt,
        delay_ms = delay.as_millis() as u64,
        "waiting before reconnect"
    );
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = ctx.wake.notified() => {}
    }
    ctx.shutdown.load(Ordering::SeqCst)
}

async fn set_link(link: &Mutex<LinkState>, state: ConnectionState) {
    let mut guard = link.lock().await;
    guard.state = state;
    guard.outbound = None;
}

/// HTTP status of a handshake rejection, if this error carries one
fn auth_status(err: &tungstenite::Error) -> Option<u16> {
    match err {
        tungstenite::Error::Http(response) => Some(response.status().as_u16()),
        _ => None,
    }
}

fn endpoint_url(base: &str, token: &str) -> String {
    if token.is_empty() {
        return base.to_string();
    }
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}token={token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::http::Response;

    fn http_error(status: u16) -> tungstenite::Error {
        let response: Response<Option<Vec<u8>>> = Response::builder()
            .status(status)
            .body(None)
            .expect("valid response");
        tungstenite::Error::Http(response)
    }

    #[test]
    fn auth_status_reads_handshake_rejections() {
        assert_eq!(auth_status(&http_error(401)), Some(401));
        assert_eq!(auth_status(&http_error(403)), Some(403));
        assert_eq!(auth_status(&http_error(500)), Some(500));
        assert_eq!(auth_status(&tungstenite::Error::ConnectionClosed), None);
    }

    #[test]
    fn endpoint_url_appends_token() {
        assert_eq!(
            endpoint_url("ws://host/voice", "abc"),
            "ws://host/voice?token=abc"
        );
        assert_eq!(
            endpoint_url("ws://host/voice?lang=es", "abc"),
            "ws://host/voice?lang=es&token=abc"
        );
        assert_eq!(endpoint_url("ws://host/voice", ""), "ws://host/voice");
    }
}
