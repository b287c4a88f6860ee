use super::config::SessionConfig;
use super::stats::{SessionStats, TranscriptSegment};
use crate::audio::encode::pcm16_bytes;
use crate::audio::{AudioCapture, AudioFrame};
use crate::error::{Result, VoiceStreamError};
use crate::registry::SessionRegistry;
use crate::transport::{TerminalReason, Transport, TransportEvent, VoiceChunk};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle of a voice streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session has started yet
    Idle,
    /// Capture is running and chunks are flowing
    Recording,
    /// `stop` is in progress
    Stopping,
    /// The last session finished; a new one may start
    Closed,
}

/// A voice streaming session that manages audio capture, chunk framing and
/// sequencing, hand-off to the transport, and transcript collection
pub struct VoiceStreamSession {
    /// Session configuration
    config: SessionConfig,

    /// Outbound channel for voice chunks
    transport: Arc<dyn Transport>,

    /// Shared session registry (also read by the transport's stale guard)
    registry: Arc<SessionRegistry>,

    /// The audio source frames are pulled from
    capture: Mutex<Box<dyn AudioCapture>>,

    /// State, session id, and start time under one lock
    core: Arc<Mutex<SessionCore>>,

    /// Next chunk sequence number; reset to zero on every start
    seq: Arc<AtomicU64>,

    /// Accumulated transcript segments
    transcript_segments: Arc<Mutex<Vec<TranscriptSegment>>>,

    /// Why the transport stopped for good, if it has
    terminal: Arc<Mutex<Option<TerminalReason>>>,

    /// Handle for the frame pump task
    pump_handle: Mutex<Option<JoinHandle<()>>>,
}

struct SessionCore {
    state: SessionState,
    session_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
}

impl VoiceStreamSession {
    /// Create a session over an already constructed transport and registry.
    /// The registry must be the same one the transport buffers into.
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        registry: Arc<SessionRegistry>,
        capture: Box<dyn AudioCapture>,
    ) -> Self {
        Self {
            config,
            transport,
            registry,
            capture: Mutex::new(capture),
            core: Arc::new(Mutex::new(SessionCore {
                state: SessionState::Idle,
                session_id: None,
                started_at: None,
            })),
            seq: Arc::new(AtomicU64::new(0)),
            transcript_segments: Arc::new(Mutex::new(Vec::new())),
            terminal: Arc::new(Mutex::new(None)),
            pump_handle: Mutex::new(None),
        }
    }

    /// Start streaming under `session_id`.
    ///
    /// Fails with `AlreadyRecording` if a session is active, and with the
    /// capture source's error if it cannot start; in both cases no state
    /// changes and no chunk is emitted. On success the sequence counter is
    /// reset and the registry adopts the new id.
    pub async fn start(&self, session_id: &str) -> Result<()> {
        let mut core = self.core.lock().await;
        match core.state {
            SessionState::Recording | SessionState::Stopping => {
                let active = core.session_id.clone().unwrap_or_default();
                warn!(session_id = %active, "session already active");
                return Err(VoiceStreamError::AlreadyRecording { session_id: active });
            }
            SessionState::Idle | SessionState::Closed => {}
        }

        info!(session_id, "starting voice session");

        let frames = {
            let mut capture = self.capture.lock().await;
            capture.start().await?
        };

        self.registry.set_session(session_id.to_string()).await;
        self.seq.store(0, Ordering::SeqCst);
        self.transcript_segments.lock().await.clear();

        core.state = SessionState::Recording;
        core.session_id = Some(session_id.to_string());
        core.started_at = Some(Utc::now());
        drop(core);

        let pump = tokio::spawn(run_pump(
            frames,
            session_id.to_string(),
            Arc::clone(&self.seq),
            Arc::clone(&self.transport),
        ));
        *self.pump_handle.lock().await = Some(pump);

        Ok(())
    }

    /// Stop streaming: wind down the capture source, let the pump drain the
    /// frames already delivered, emit the final end-of-stream marker, and
    /// release the session id. Calling with no active session returns the
    /// current stats unchanged.
    pub async fn stop(&self) -> Result<SessionStats> {
        let session_id = {
            let mut core = self.core.lock().await;
            if core.state != SessionState::Recording {
                debug!("stop called with no active session");
                drop(core);
                return Ok(self.stats().await);
            }
            core.state = SessionState::Stopping;
            core.session_id.clone().unwrap_or_default()
        };

        info!(session_id = %session_id, "stopping voice session");

        let mut timed_out = false;
        {
            let mut capture = self.capture.lock().await;
            match tokio::time::timeout(self.config.stop_timeout, capture.stop()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "capture source failed to stop"),
                Err(_) => {
                    warn!(
                        timeout_ms = self.config.stop_timeout.as_millis() as u64,
                        "capture source did not stop in time"
                    );
                    timed_out = true;
                }
            }
        }

        // The pump ends when the frame channel closes; a hung source keeps
        // the channel open, so its pump is cut off instead of joined.
        {
            let mut handle = self.pump_handle.lock().await;
            if let Some(task) = handle.take() {
                if timed_out {
                    task.abort();
                    let _ = task.await;
                } else if let Err(e) = task.await {
                    error!(error = %e, "audio pump panicked");
                }
            }
        }

        let final_seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let marker = VoiceChunk::last(session_id.clone(), final_seq);
        if let Err(e) = self.transport.send(marker).await {
            error!(error = %e, "failed to hand off final chunk");
        }

        self.core.lock().await.state = SessionState::Closed;
        self.registry.clear_session(&session_id).await;

        info!(session_id = %session_id, final_seq, "voice session stopped");

        if timed_out {
            return Err(VoiceStreamError::CaptureStopTimeout {
                timeout_ms: self.config.stop_timeout.as_millis() as u64,
            });
        }
        Ok(self.stats().await)
    }

    /// Fold transport events into the session: transcripts for the current
    /// session are accumulated, terminal failures are recorded. The task runs
    /// until the transport side of the channel is dropped, so it survives
    /// session restarts and still collects transcripts that arrive after the
    /// final chunk.
    pub fn collect_events(&self, mut events: mpsc::Receiver<TransportEvent>) {
        let core = Arc::clone(&self.core);
        let segments = Arc::clone(&self.transcript_segments);
        let terminal = Arc::clone(&self.terminal);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::Connected => debug!("transport connected"),
                    TransportEvent::Message(message) => {
                        if let Some(ref id) = message.session_id {
                            let core = core.lock().await;
                            if core.session_id.as_deref() != Some(id.as_str()) {
                                debug!(
                                    session_id = %id,
                                    "transcript for another session, skipping"
                                );
                                continue;
                            }
                        }
                        info!(seq = message.seq, text = %message.text, "transcript received");
                        let segment = TranscriptSegment {
                            seq: message.seq,
                            text: message.text,
                            detected_lang: message.detected_lang,
                            translated_text: message.translated_text,
                            received_at: Utc::now(),
                        };
                        segments.lock().await.push(segment);
                    }
                    TransportEvent::Terminated(reason) => {
                        error!(%reason, "transport terminated");
                        *terminal.lock().await = Some(reason);
                    }
                }
            }
            debug!("event collector finished");
        });
    }

    /// Current session statistics
    pub async fn stats(&self) -> SessionStats {
        let core = self.core.lock().await;
        let duration_secs = core
            .started_at
            .map(|t| Utc::now().signed_duration_since(t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);
        let transcript_segments = self.transcript_segments.lock().await.len();
        let terminal_error = self.terminal.lock().await.as_ref().map(|r| r.to_string());

        SessionStats {
            session_id: core.session_id.clone(),
            is_recording: core.state == SessionState::Recording,
            started_at: core.started_at,
            duration_secs,
            chunks_emitted: self.seq.load(Ordering::SeqCst),
            transcript_segments,
            pending_chunks: self.registry.pending_len().await,
            dropped_chunks: self.registry.dropped_count().await,
            terminal_error,
        }
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SessionState {
        self.core.lock().await.state
    }

    /// Accumulated transcript of the current (or most recent) session
    pub async fn transcript(&self) -> Vec<TranscriptSegment> {
        self.transcript_segments.lock().await.clone()
    }

    /// Why the transport stopped for good, if it has
    pub async fn terminal_error(&self) -> Option<TerminalReason> {
        self.terminal.lock().await.clone()
    }
}

/// Forward captured frames to the transport until the frame channel closes.
/// Transport errors are logged and never stop capture.
async fn run_pump(
    mut frames: mpsc::Receiver<AudioFrame>,
    session_id: String,
    seq: Arc<AtomicU64>,
    transport: Arc<dyn Transport>,
) {
    debug!(session_id = %session_id, "audio pump started");
    while let Some(frame) = frames.recv().await {
        let pcm = pcm16_bytes(&frame.samples);
        let n = seq.fetch_add(1, Ordering::SeqCst);
        let chunk = VoiceChunk::audio(session_id.clone(), n, &pcm);
        if let Err(e) = transport.send(chunk).await {
            error!(error = %e, seq = n, "failed to hand off audio chunk");
        }
    }
    debug!(session_id = %session_id, "audio pump finished");
}
