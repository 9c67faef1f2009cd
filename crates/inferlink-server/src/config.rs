//! Server configuration.

use std::net::SocketAddr;

/// Default listen address, matching the client's default endpoint.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Default WebSocket path.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Reference server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,

    /// Only upgrades on this path are accepted. Must start with `/` and
    /// stay clear of the REST routes.
    pub ws_path: String,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Whether responses echo the request's `request_id`.
    ///
    /// Turning this off emulates servers that only answer with the model
    /// type, which forces clients back to model-type correlation.
    pub echo_request_id: bool,

    /// Anomaly score above which a reading is flagged.
    pub anomaly_threshold: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            ws_path: DEFAULT_WS_PATH.to_string(),
            max_connections: 100,
            echo_request_id: true,
            anomaly_threshold: 0.85,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration listening on the given address.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Builder: set the WebSocket path.
    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    /// Builder: set max connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Builder: set whether responses echo request ids.
    pub fn with_echo_request_id(mut self, echo: bool) -> Self {
        self.echo_request_id = echo;
        self
    }

    /// Builder: set the anomaly threshold.
    pub fn with_anomaly_threshold(mut self, threshold: f64) -> Self {
        self.anomaly_threshold = threshold;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.ws_path, "/ws");
        assert_eq!(config.max_connections, 100);
        assert!(config.echo_request_id);
        assert_eq!(config.anomaly_threshold, 0.85);
    }

    #[test]
    fn custom_config() {
        let addr: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        let config = ServerConfig::new(addr)
            .with_ws_path("/inference")
            .with_max_connections(4)
            .with_echo_request_id(false)
            .with_anomaly_threshold(0.5);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.ws_path, "/inference");
        assert_eq!(config.max_connections, 4);
        assert!(!config.echo_request_id);
        assert_eq!(config.anomaly_threshold, 0.5);
    }
}
