use super::capture::{AudioCapture, AudioFrame, CaptureConfig};
use crate::error::{Result, VoiceStreamError};
use hound::{SampleFormat, WavReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capture source that replays a 16-bit PCM WAV file, paced at the configured
/// frame interval so the pipeline sees it like a live device.
pub struct WavFileCapture {
    path: PathBuf,
    config: CaptureConfig,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WavFileCapture {
    pub fn new(path: PathBuf, config: CaptureConfig) -> Self {
        Self {
            path,
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Load the file and convert it to the configured rate and channel count
    fn load_samples(&self) -> Result<Vec<i16>> {
        let reader = WavReader::open(&self.path).map_err(|e| {
            VoiceStreamError::CaptureUnavailable {
                message: format!("cannot open {}: {e}", self.path.display()),
            }
        })?;
        let spec = reader.spec();

        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(VoiceStreamError::CaptureUnavailable {
                message: format!(
                    "{} is not 16-bit PCM ({:?}, {} bits)",
                    self.path.display(),
                    spec.sample_format,
                    spec.bits_per_sample
                ),
            });
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| VoiceStreamError::CaptureUnavailable {
                message: format!("cannot read {}: {e}", self.path.display()),
            })?;

        info!(
            path = %self.path.display(),
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            samples = samples.len(),
            "loaded WAV file"
        );

        let samples = match (spec.channels, self.config.channels) {
            (from, to) if from == to => samples,
            (2, 1) => downmix_to_mono(&samples),
            (from, to) => {
                return Err(VoiceStreamError::CaptureUnavailable {
                    message: format!("cannot convert {from} channels to {to}"),
                });
            }
        };

        Ok(decimate(&samples, spec.sample_rate, self.config.sample_rate))
    }
}

#[async_trait::async_trait]
impl AudioCapture for WavFileCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            return Err(VoiceStreamError::CaptureUnavailable {
                message: "already capturing".to_string(),
            });
        }

        let samples = self.load_samples()?;

        self.capturing.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(100);
        let capturing = Arc::clone(&self.capturing);
        let config = self.config.clone();

        self.task = Some(tokio::spawn(async move {
            let frame_len = config.samples_per_frame();
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(config.frame_duration_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            for (index, block) in samples.chunks(frame_len).enumerate() {
                interval.tick().await;
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }
                let frame = AudioFrame {
                    samples: block.to_vec(),
                    sample_rate: config.sample_rate,
                    channels: config.channels,
                    timestamp_ms: index as u64 * config.frame_duration_ms,
                };
                if tx.send(frame).await.is_err() {
                    debug!("frame receiver dropped, ending WAV replay");
                    break;
                }
            }

            capturing.store(false, Ordering::SeqCst);
            debug!("WAV replay finished");
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.capturing.swap(false, Ordering::SeqCst) && self.task.is_none() {
            return Ok(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "WAV replay task failed to join");
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

/// Sum interleaved stereo pairs into mono, clamping to the i16 range
fn downmix_to_mono(samples: &[i16]) -> Vec<i16> {
    samples
        .chunks_exact(2)
        .map(|pair| {
            let sum = pair[0] as i32 + pair[1] as i32;
            sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16
        })
        .collect()
}

/// Downsample by decimation (integer stride). Rates that would require
/// upsampling or a fractional stride pass through unchanged.
fn decimate(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate {
        return samples.to_vec();
    }
    let ratio = from_rate / to_rate;
    if ratio <= 1 {
        warn!(from_rate, to_rate, "cannot upsample, passing samples through");
        return samples.to_vec();
    }
    samples.iter().step_by(ratio as usize).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_sums_and_clamps() {
        assert_eq!(downmix_to_mono(&[100, 200, -50, 25]), vec![300, -25]);
        assert_eq!(downmix_to_mono(&[i16::MAX, i16::MAX]), vec![i16::MAX]);
        assert_eq!(downmix_to_mono(&[i16::MIN, i16::MIN]), vec![i16::MIN]);
    }

    #[test]
    fn decimate_takes_every_nth_sample() {
        let samples: Vec<i16> = (0..8).collect();
        assert_eq!(decimate(&samples, 32000, 16000), vec![0, 2, 4, 6]);
        assert_eq!(decimate(&samples, 16000, 16000), samples);
    }

    #[test]
    fn decimate_never_upsamples() {
        let samples: Vec<i16> = vec![1, 2, 3];
        assert_eq!(decimate(&samples, 8000, 16000), samples);
    }
}
