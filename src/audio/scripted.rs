use super::capture::{AudioCapture, AudioFrame, CaptureConfig};
use crate::error::{Result, VoiceStreamError};
use tokio::sync::mpsc;

/// Deterministic capture source delivering a preset list of frames.
///
/// All frames are queued at `start` and the channel closes after the last
/// one, so tests get a fully reproducible run without timers.
pub struct ScriptedCapture {
    blocks: Vec<Vec<i16>>,
    config: CaptureConfig,
    fail_start: bool,
    capturing: bool,
}

impl ScriptedCapture {
    pub fn new(blocks: Vec<Vec<i16>>, config: CaptureConfig) -> Self {
        Self {
            blocks,
            config,
            fail_start: false,
            capturing: false,
        }
    }

    /// A source whose `start` always fails, for exercising the
    /// capture-unavailable path
    pub fn failing() -> Self {
        Self {
            blocks: Vec::new(),
            config: CaptureConfig::default(),
            fail_start: true,
            capturing: false,
        }
    }
}

#[async_trait::async_trait]
impl AudioCapture for ScriptedCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.fail_start {
            return Err(VoiceStreamError::CaptureUnavailable {
                message: "scripted capture configured to fail".to_string(),
            });
        }

        let (tx, rx) = mpsc::channel(self.blocks.len().max(1));
        for (index, block) in self.blocks.iter().enumerate() {
            let frame = AudioFrame {
                samples: block.clone(),
                sample_rate: self.config.sample_rate,
                channels: self.config.channels,
                timestamp_ms: index as u64 * self.config.frame_duration_ms,
            };
            // Capacity matches the block count, so this cannot fail
            let _ = tx.try_send(frame);
        }
        self.capturing = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
