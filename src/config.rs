use crate::audio::CaptureConfig;
use crate::error::Result;
use crate::session::SessionConfig;
use crate::transport::TransportConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub stream: StreamConfig,
    pub audio: AudioSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// WebSocket URL of the streaming endpoint
    pub endpoint: String,
    pub connect_timeout_secs: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    /// 0 retries forever
    pub max_reconnect_attempts: u32,
    /// 0 disables buffering while disconnected
    pub max_pending_chunks: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration_ms: u64,
    pub stop_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            stream: StreamConfig::default(),
            audio: AudioSettings::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "lingo-stream".to_string(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8090/voice".to_string(),
            connect_timeout_secs: 10,
            reconnect_base_ms: 800,
            reconnect_max_ms: 30_000,
            max_reconnect_attempts: 12,
            max_pending_chunks: 256,
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            frame_duration_ms: 100,
            stop_timeout_secs: 5,
        }
    }
}

impl Config {
    /// Load from `path` (any format the config crate understands). A missing
    /// file falls back to the built-in defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            endpoint: self.stream.endpoint.clone(),
            connect_timeout: Duration::from_secs(self.stream.connect_timeout_secs),
            reconnect_base: Duration::from_millis(self.stream.reconnect_base_ms),
            reconnect_max: Duration::from_millis(self.stream.reconnect_max_ms),
            max_reconnect_attempts: self.stream.max_reconnect_attempts,
        }
    }

    pub fn capture(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            frame_duration_ms: self.audio.frame_duration_ms,
        }
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            stop_timeout: Duration::from_secs(self.audio.stop_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load("/nonexistent/lingo-stream").unwrap();
        assert_eq!(config.stream.endpoint, "ws://localhost:8090/voice");
        assert_eq!(config.stream.max_pending_chunks, 256);
        assert_eq!(config.audio.sample_rate, 16000);
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lingo-stream.toml");
        std::fs::write(
            &path,
            "[stream]\nendpoint = \"ws://example.test/voice\"\nmax_pending_chunks = 8\n",
        )
        .unwrap();

        let name = dir.path().join("lingo-stream");
        let config = Config::load(name.to_str().unwrap()).unwrap();
        assert_eq!(config.stream.endpoint, "ws://example.test/voice");
        assert_eq!(config.stream.max_pending_chunks, 8);
        assert_eq!(config.stream.reconnect_base_ms, 800);
        assert_eq!(config.audio.channels, 1);
    }
}
