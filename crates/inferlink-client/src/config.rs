//! Client configuration.
//!
//! Settings live in a single `config.toml` at
//! `~/.config/inferlink/config.toml` by default. Every field is optional;
//! missing ones take the defaults below.
//!
//! ```toml
//! [connection]
//! endpoint = "ws://localhost:8080/ws"
//! request_timeout_ms = 5000
//! heartbeat_interval_secs = 30
//! reconnect_base_delay_ms = 1000
//! max_reconnect_attempts = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use inferlink_protocol::DEFAULT_ENDPOINT;

use crate::error::{ClientError, ClientResult};

// ---------------------------------------------------------------------------
// ClientConfig (config.toml)
// ---------------------------------------------------------------------------

/// Configuration for the inferlink client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionSection,
}

/// `[connection]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    /// WebSocket endpoint of the inference server.
    pub endpoint: String,

    /// Time allowed for opening the socket.
    pub connect_timeout_ms: u64,

    /// Time a request waits for its response.
    pub request_timeout_ms: u64,

    /// Heartbeat period while connected; 0 disables heartbeats.
    pub heartbeat_interval_secs: u64,

    /// Base of the linear reconnect delay.
    pub reconnect_base_delay_ms: u64,

    /// Reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout_ms: 5000,
            request_timeout_ms: 5000,
            heartbeat_interval_secs: 30,
            reconnect_base_delay_ms: 1000,
            max_reconnect_attempts: 5,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if absent.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("failed to read config: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| ClientError::Config(format!("failed to parse config: {}", e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("inferlink")
    }

    /// Validates the file values and builds runtime settings.
    pub fn to_settings(&self) -> ClientResult<ConnectionSettings> {
        let conn = &self.connection;
        let endpoint = parse_endpoint(&conn.endpoint)?;

        if conn.connect_timeout_ms == 0 {
            return Err(ClientError::Config(
                "connect_timeout_ms must be greater than zero".into(),
            ));
        }
        if conn.request_timeout_ms == 0 {
            return Err(ClientError::Config(
                "request_timeout_ms must be greater than zero".into(),
            ));
        }

        let heartbeat = (conn.heartbeat_interval_secs > 0)
            .then(|| Duration::from_secs(conn.heartbeat_interval_secs));

        Ok(ConnectionSettings::new(endpoint)
            .with_connect_timeout(Duration::from_millis(conn.connect_timeout_ms))
            .with_request_timeout(Duration::from_millis(conn.request_timeout_ms))
            .with_heartbeat_interval(heartbeat)
            .with_reconnect(ReconnectPolicy::new(
                Duration::from_millis(conn.reconnect_base_delay_ms),
                conn.max_reconnect_attempts,
            )))
    }
}

/// Parses and validates a WebSocket endpoint.
pub fn parse_endpoint(endpoint: &str) -> ClientResult<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| ClientError::Config(format!("invalid endpoint {:?}: {}", endpoint, e)))?;
    if url.scheme() != "ws" {
        return Err(ClientError::Config(format!(
            "endpoint must use ws://, got {}://",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(ClientError::Config(format!(
            "endpoint {:?} has no host",
            endpoint
        )));
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// Runtime settings
// ---------------------------------------------------------------------------

/// Linear reconnect policy: attempt `n` waits `n × base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), 5)
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based), or `None` once the
    /// attempts are exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        (attempt >= 1 && attempt <= self.max_attempts).then(|| self.base_delay * attempt)
    }
}

/// Validated settings for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub endpoint: Url,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// `None` disables heartbeats.
    pub heartbeat_interval: Option<Duration>,
    pub reconnect: ReconnectPolicy,
}

impl ConnectionSettings {
    /// Creates settings with default timings for the given endpoint.
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            connect_timeout: Duration::from_millis(5000),
            request_timeout: Duration::from_millis(5000),
            heartbeat_interval: Some(Duration::from_secs(30)),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Builder: set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder: set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builder: set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Builder: set the reconnect policy.
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}
