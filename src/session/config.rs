use std::time::Duration;

/// Configuration for a voice streaming session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long `stop` waits for the capture source to wind down
    /// Default: 5 seconds
    pub stop_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(5),
        }
    }
}
