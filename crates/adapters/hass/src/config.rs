//! Home Assistant connection configuration.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Configuration for the Home Assistant websocket session.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct HassConfig {
    /// Hub hostname or IP address.
    pub host: String,
    /// URL scheme, `ws` or `wss`.
    pub protocol: String,
    /// Hub port.
    pub port: u16,
    /// Long-lived access token.
    pub token: String,
    /// How long a request waits for its response, in milliseconds.
    pub timeout_ms: u64,
    /// Delay between reconnection attempts, in milliseconds.
    pub retry_timeout_ms: u64,
    /// Reconnection attempts before giving up. Unlimited when absent.
    pub retry_count: Option<u32>,
}

impl HassConfig {
    /// The websocket endpoint, e.g. `ws://localhost:8123/api/websocket`.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}://{}:{}/api/websocket", self.protocol, self.host, self.port)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn retry_timeout(&self) -> Duration {
        Duration::from_millis(self.retry_timeout_ms)
    }
}

impl Default for HassConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            protocol: "ws".to_string(),
            port: 8123,
            token: String::new(),
            timeout_ms: 5000,
            retry_timeout_ms: 5000,
            retry_count: None,
        }
    }
}

impl fmt::Debug for HassConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HassConfig")
            .field("host", &self.host)
            .field("protocol", &self.protocol)
            .field("port", &self.port)
            .field("token", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .field("retry_timeout_ms", &self.retry_timeout_ms)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}
