// Demo: Stream a WAV file to a live transcription endpoint
//
// This demo walks the complete streaming pipeline:
// 1. Load a 16-bit PCM WAV file as the capture source
// 2. Connect the WebSocket transport (it reconnects on its own)
// 3. Start a session: frames are encoded and sequenced as voice chunks
// 4. Print the transcripts the endpoint sends back
//
// Usage: cargo run --example stream_wav -- --wav path/to/audio.wav
//
// Without a reachable endpoint the chunks pile up in the pending buffer and
// flush when the endpoint comes up.

use anyhow::Result;
use clap::Parser;
use lingo_stream::{
    generate_session_id, AudioCaptureFactory, CaptureConfig, CaptureSource, SessionConfig,
    SessionRegistry, Transport, TransportConfig, VoiceStreamSession, WsTransport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "stream_wav")]
#[command(about = "Stream a WAV file as voice chunks")]
struct Args {
    /// 16-bit PCM WAV file to stream
    #[arg(short, long)]
    wav: PathBuf,

    /// Streaming endpoint URL
    #[arg(short, long, default_value = "ws://localhost:8090/voice")]
    endpoint: String,

    /// Auth token appended to the endpoint URL
    #[arg(short, long, default_value = "")]
    token: String,

    /// Seconds to stream before stopping
    #[arg(short, long, default_value = "10")]
    duration: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let args = Args::parse();

    info!("Streaming {} to {}", args.wav.display(), args.endpoint);

    let registry = Arc::new(SessionRegistry::new(256));
    let transport_config = TransportConfig {
        endpoint: args.endpoint,
        ..TransportConfig::default()
    };
    let (transport, events) = WsTransport::new(transport_config, Arc::clone(&registry));
    let transport = Arc::new(transport);
    transport.connect(&args.token).await;

    let capture =
        AudioCaptureFactory::create(CaptureSource::WavFile(args.wav), CaptureConfig::default())?;

    let session = VoiceStreamSession::new(
        SessionConfig::default(),
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::clone(&registry),
        capture,
    );
    session.collect_events(events);

    let session_id = generate_session_id();
    info!("Session id: {}", session_id);
    session.start(&session_id).await?;

    sleep(Duration::from_secs(args.duration)).await;

    let stats = session.stop().await?;
    info!(
        "Emitted {} chunks, received {} transcript segments",
        stats.chunks_emitted, stats.transcript_segments
    );

    for segment in session.transcript().await {
        println!("[{}] {}", segment.seq, segment.text);
    }

    transport.disconnect().await;
    Ok(())
}
