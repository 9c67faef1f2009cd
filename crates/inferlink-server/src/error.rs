//! Server error types.

use std::io;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (bind, accept).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (encoding, payload shape).
    #[error("Protocol error: {0}")]
    Protocol(#[from] inferlink_protocol::ProtocolError),

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] axum::Error),

    /// WebSocket path cannot be mounted next to the REST routes.
    #[error("Invalid WebSocket path: {path}")]
    InvalidWsPath { path: String },

    /// Address already bound by another process.
    #[error("Address already in use: {addr}")]
    AddrInUse { addr: String },
}

impl ServerError {
    /// Creates an address in use error.
    pub fn addr_in_use(addr: impl Into<String>) -> Self {
        Self::AddrInUse { addr: addr.into() }
    }

    /// Creates an invalid WebSocket path error.
    pub fn invalid_ws_path(path: impl Into<String>) -> Self {
        Self::InvalidWsPath { path: path.into() }
    }
}
