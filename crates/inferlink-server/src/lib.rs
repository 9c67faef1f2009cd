//! Reference inference server.
//!
//! Speaks the inferlink protocol over WebSocket and answers every model type
//! with deterministic stand-in predictions. The same models are reachable
//! over plain HTTP at `POST /api/inference/{model}`, next to `GET /health`
//! and `GET /api/models`. Used by the CLI's `server`
//! command and by the client's integration tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use inferlink_server::{ServerConfig, SignalHandler, WsServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = WsServer::bind(ServerConfig::default()).await?;
//!     let signals = SignalHandler::new();
//!     signals.spawn_listener();
//!     server.run_until_shutdown(signals.shutdown().wait()).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod engine;
mod error;
mod handler;
mod rest;
mod signals;
mod socket;

pub use config::{DEFAULT_BIND_ADDR, DEFAULT_WS_PATH, ServerConfig};
pub use engine::InferenceEngine;
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use rest::{HEALTH_PATH, INFERENCE_PREFIX, MODELS_PATH, model_from_route};
pub use signals::{ShutdownSignal, SignalHandler};
pub use socket::WsServer;
