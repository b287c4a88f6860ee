// Demo: End-to-end loop against an in-process echo endpoint
//
// Spins up a local WebSocket server that answers every voice chunk with a
// mock transcript, then streams a synthetic tone through the full pipeline.
// Nothing leaves the machine; useful for watching the protocol without a
// real endpoint.
//
// Usage: cargo run --example local_loop

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use lingo_stream::{
    generate_session_id, AudioCaptureFactory, CaptureConfig, CaptureSource, ClientMessage,
    ServerMessage, SessionConfig, SessionRegistry, Transport, TransportConfig, VoiceStreamSession,
    WsTransport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, Level};

async fn run_echo_server(listener: TcpListener) {
    while let Ok((stream, _)) = listener.accept().await {
        tokio::spawn(async move {
            let Ok(socket) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            let (mut sink, mut source) = socket.split();
            while let Some(Ok(Message::Text(text))) = source.next().await {
                let Ok(ClientMessage::VoiceChunk(chunk)) = serde_json::from_str(&text) else {
                    continue;
                };
                let bytes = chunk.payload_bytes().ok().flatten().map_or(0, |b| b.len());
                let text = if chunk.is_last {
                    "end of stream".to_string()
                } else {
                    format!("heard {} bytes", bytes)
                };
                let reply = ServerMessage {
                    session_id: Some(chunk.session_id.clone()),
                    seq: chunk.seq,
                    text,
                    detected_lang: Some("en".to_string()),
                    translated_text: None,
                };
                let Ok(json) = serde_json::to_string(&reply) else {
                    continue;
                };
                if sink.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = format!("ws://{}/voice", listener.local_addr()?);
    tokio::spawn(run_echo_server(listener));
    info!("Echo endpoint at {}", endpoint);

    let registry = Arc::new(SessionRegistry::new(64));
    let (transport, events) = WsTransport::new(
        TransportConfig {
            endpoint,
            ..TransportConfig::default()
        },
        Arc::clone(&registry),
    );
    let transport = Arc::new(transport);
    transport.connect("").await;

    let capture = AudioCaptureFactory::create(
        CaptureSource::Tone { freq_hz: 440.0 },
        CaptureConfig::default(),
    )?;
    let session = VoiceStreamSession::new(
        SessionConfig::default(),
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::clone(&registry),
        capture,
    );
    session.collect_events(events);

    let session_id = generate_session_id();
    session.start(&session_id).await?;
    info!("Streaming a 440 Hz tone for 3 seconds");
    sleep(Duration::from_secs(3)).await;

    let stats = session.stop().await?;
    // let the replies to the last chunks land
    sleep(Duration::from_millis(300)).await;

    info!("Emitted {} chunks", stats.chunks_emitted);
    for segment in session.transcript().await {
        println!("[{}] {}", segment.seq, segment.text);
    }

    transport.disconnect().await;
    Ok(())
}
