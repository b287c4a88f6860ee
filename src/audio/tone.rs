use super::capture::{AudioCapture, AudioFrame, CaptureConfig};
use crate::error::{Result, VoiceStreamError};
use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const TONE_AMPLITUDE: f32 = 0.3;

/// Capture source that generates a continuous sine tone. Useful for running
/// the pipeline without a fixture file.
pub struct ToneCapture {
    freq_hz: f32,
    config: CaptureConfig,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl ToneCapture {
    pub fn new(freq_hz: f32, config: CaptureConfig) -> Self {
        Self {
            freq_hz,
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioCapture for ToneCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            return Err(VoiceStreamError::CaptureUnavailable {
                message: "already capturing".to_string(),
            });
        }
        if self.freq_hz <= 0.0 || self.freq_hz >= self.config.sample_rate as f32 / 2.0 {
            return Err(VoiceStreamError::CaptureUnavailable {
                message: format!(
                    "tone frequency {} Hz is outside (0, {}) Hz",
                    self.freq_hz,
                    self.config.sample_rate / 2
                ),
            });
        }

        info!(freq_hz = self.freq_hz, "starting tone capture");
        self.capturing.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(100);
        let capturing = Arc::clone(&self.capturing);
        let config = self.config.clone();
        let freq_hz = self.freq_hz;

        self.task = Some(tokio::spawn(async move {
            let per_channel = config.samples_per_frame() / config.channels as usize;
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(config.frame_duration_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            // Sample position carries across frames so the wave stays continuous
            let mut position: u64 = 0;
            let mut frame_index: u64 = 0;

            while capturing.load(Ordering::SeqCst) {
                interval.tick().await;
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }

                let mut samples = Vec::with_capacity(per_channel * config.channels as usize);
                for i in 0..per_channel {
                    let t = (position + i as u64) as f32 / config.sample_rate as f32;
                    let value = (TAU * freq_hz * t).sin() * TONE_AMPLITUDE * i16::MAX as f32;
                    for _ in 0..config.channels {
                        samples.push(value as i16);
                    }
                }
                position += per_channel as u64;

                let frame = AudioFrame {
                    samples,
                    sample_rate: config.sample_rate,
                    channels: config.channels,
                    timestamp_ms: frame_index * config.frame_duration_ms,
                };
                frame_index += 1;

                if tx.send(frame).await.is_err() {
                    debug!("frame receiver dropped, ending tone capture");
                    break;
                }
            }

            capturing.store(false, Ordering::SeqCst);
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "tone task failed to join");
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "tone"
    }
}
