//! Probe settings

use std::time::Duration;

use crate::{protocol::config::WebSocketConfig, stream::StreamOptions};

/// Path the DUT serves its WebSocket endpoint on.
pub const DEFAULT_PATH: &str = "/ws";
/// Applied to connecting, sending and waiting for the reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a probe run needs besides the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Endpoint path, appended to the host.
    pub path: String,
    /// Connect, read and write timeout.
    pub timeout: Duration,
    /// Transport limits.
    pub websocket: WebSocketConfig
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            path: DEFAULT_PATH.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            websocket: WebSocketConfig::default()
        }
    }
}

impl ProbeConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Socket settings derived from the timeout.
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions::with_timeout(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_the_ws_endpoint() {
        let config = ProbeConfig::default();
        assert_eq!(config.path, "/ws");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.websocket, WebSocketConfig::default());
    }

    #[test]
    fn timeout_drives_every_socket_timeout() {
        let options = ProbeConfig::default().with_timeout(Duration::from_secs(3)).stream_options();
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(3)));
        assert_eq!(options.read_timeout, Some(Duration::from_secs(3)));
        assert_eq!(options.write_timeout, Some(Duration::from_secs(3)));
        assert!(options.nodelay);
    }
}
