//! Server command: runs the reference inference server (WebSocket and REST)
//! in the foreground.

use std::net::SocketAddr;

use tracing::info;

use inferlink_server::{ServerConfig, SignalHandler, WsServer};

use crate::error::{ClientError, ClientResult};

/// Starts the server and blocks until SIGTERM/SIGINT.
pub async fn run(bind: SocketAddr, echo_request_id: bool) -> ClientResult<()> {
    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener();

    let config = ServerConfig::new(bind).with_echo_request_id(echo_request_id);
    let server = WsServer::bind(config)
        .await
        .map_err(|e| ClientError::Config(format!("failed to start server: {}", e)))?;

    let endpoint = server
        .endpoint()
        .map_err(|e| ClientError::Config(format!("server error: {}", e)))?;
    let addr = server
        .local_addr()
        .map_err(|e| ClientError::Config(format!("server error: {}", e)))?;
    info!(endpoint = %endpoint, echo_request_id, "Server ready");
    eprintln!("listening on {} (REST on http://{})", endpoint, addr);

    server
        .run_until_shutdown(signal_handler.shutdown().wait())
        .await
        .map_err(|e| ClientError::Config(format!("server error: {}", e)))?;

    info!("Server stopped");
    Ok(())
}
