use anyhow::Result;
use clap::Parser;
use lingo_stream::{
    generate_session_id, AudioCaptureFactory, CaptureSource, Config, SessionRegistry, Transport,
    VoiceStreamError, VoiceStreamSession, WsTransport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

#[derive(Parser)]
#[command(name = "lingo-stream")]
#[command(about = "Stream voice audio to a live transcription endpoint")]
struct Args {
    /// Config file (without extension)
    #[arg(short, long, default_value = "config/lingo-stream")]
    config: String,

    /// Streaming endpoint URL; overrides the config file
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Auth token; falls back to the LINGO_STREAM_TOKEN environment variable
    #[arg(short, long)]
    token: Option<String>,

    /// WAV file to stream instead of a synthetic tone
    #[arg(short, long)]
    wav: Option<PathBuf>,

    /// Tone frequency in Hz when no WAV file is given
    #[arg(long, default_value = "440.0")]
    tone_hz: f32,

    /// Session id; generated when omitted
    #[arg(short, long)]
    session_id: Option<String>,

    /// Seconds to stream before stopping; 0 streams until Ctrl-C
    #[arg(short, long, default_value = "10")]
    duration: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(endpoint) = args.endpoint {
        config.stream.endpoint = endpoint;
    }
    let token = args
        .token
        .or_else(|| std::env::var("LINGO_STREAM_TOKEN").ok())
        .unwrap_or_default();

    info!("{} v{}", config.service.name, env!("CARGO_PKG_VERSION"));
    info!("Streaming endpoint: {}", config.stream.endpoint);

    let registry = Arc::new(SessionRegistry::new(config.stream.max_pending_chunks));
    let (transport, events) = WsTransport::new(config.transport(), Arc::clone(&registry));
    let transport = Arc::new(transport);
    transport.connect(&token).await;

    let source = match args.wav {
        Some(path) => CaptureSource::WavFile(path),
        None => CaptureSource::Tone {
            freq_hz: args.tone_hz,
        },
    };
    let capture = AudioCaptureFactory::create(source, config.capture())?;

    let session = VoiceStreamSession::new(
        config.session(),
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::clone(&registry),
        capture,
    );
    session.collect_events(events);

    let session_id = args.session_id.unwrap_or_else(generate_session_id);
    session.start(&session_id).await?;

    if args.duration > 0 {
        info!("Streaming for {} seconds", args.duration);
        tokio::select! {
            _ = sleep(Duration::from_secs(args.duration)) => {}
            _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        }
    } else {
        info!("Streaming until Ctrl-C");
        tokio::signal::ctrl_c().await?;
    }

    let stats = session.stop().await?;

    info!(
        "Session {}: {} chunks in {:.1}s, {} transcript segments ({} pending, {} dropped)",
        session_id,
        stats.chunks_emitted,
        stats.duration_secs,
        stats.transcript_segments,
        stats.pending_chunks,
        stats.dropped_chunks,
    );
    for segment in session.transcript().await {
        println!("[{}] {}", segment.seq, segment.text);
        if let Some(translated) = &segment.translated_text {
            println!("    -> {}", translated);
        }
    }

    let terminal = session.terminal_error().await;
    transport.disconnect().await;

    if let Some(reason) = terminal {
        return Err(VoiceStreamError::from(reason).into());
    }
    Ok(())
}
