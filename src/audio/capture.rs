use crate::error::Result;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for a capture source
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate (sources resample if needed)
    pub sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Frame size in milliseconds (affects latency)
    pub frame_duration_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            frame_duration_ms: 100,
        }
    }
}

impl CaptureConfig {
    /// Samples per frame for one channel times the channel count
    pub fn samples_per_frame(&self) -> usize {
        let per_channel = (self.sample_rate as u64 * self.frame_duration_ms / 1000) as usize;
        per_channel.max(1) * self.channels as usize
    }
}

/// Audio capture contract
///
/// A device microphone is one implementation of this trait; the crate ships
/// replayable sources (WAV file, synthetic tone, scripted frames) for the
/// binary, demos, and tests. Implementations deliver frames over the returned
/// channel and must never block their producing thread on a slow consumer:
/// use a bounded channel and drop frames when it is full.
#[async_trait::async_trait]
pub trait AudioCapture: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames. Failure to
    /// start (missing device, unreadable file) must not leave the source in a
    /// half-started state.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio. Frames already in the channel are still
    /// delivered; the channel closes once delivery stops.
    async fn stop(&mut self) -> Result<()>;

    /// Check if the source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Selects which capture source the factory builds
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// Replay a 16-bit PCM WAV file, paced at the frame interval
    WavFile(PathBuf),
    /// Generate a continuous sine tone
    Tone { freq_hz: f32 },
}

/// Capture source factory
pub struct AudioCaptureFactory;

impl AudioCaptureFactory {
    pub fn create(source: CaptureSource, config: CaptureConfig) -> Result<Box<dyn AudioCapture>> {
        match source {
            CaptureSource::WavFile(path) => {
                Ok(Box::new(super::wav::WavFileCapture::new(path, config)))
            }
            CaptureSource::Tone { freq_hz } => {
                Ok(Box::new(super::tone::ToneCapture::new(freq_hz, config)))
            }
        }
    }
}
