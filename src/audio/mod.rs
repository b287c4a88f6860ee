pub mod capture;
pub mod encode;
pub mod scripted;
pub mod tone;
pub mod wav;

pub use capture::{AudioCapture, AudioCaptureFactory, AudioFrame, CaptureConfig, CaptureSource};
pub use scripted::ScriptedCapture;
pub use tone::ToneCapture;
pub use wav::WavFileCapture;
