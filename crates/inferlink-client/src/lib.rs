//! Inference request router: connection manager, request correlation,
//! inference façade and the `inferlink` CLI.
//!
//! # Example
//!
//! ```rust,no_run
//! use inferlink_client::{ClientConfig, InferenceClient};
//! use inferlink_core::{TrajectoryInput, TrajectoryPoint};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = ClientConfig::load()?.to_settings()?;
//!     let client = InferenceClient::new(settings);
//!     client.connect().await?;
//!
//!     let history = vec![TrajectoryPoint::new(0.0, 0.0), TrajectoryPoint::new(1.0, 1.0)];
//!     let prediction = client.predict_trajectory(TrajectoryInput::new(history)).await?;
//!     println!("{:?}", prediction.predictions.first());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod facade;
pub mod state;
pub mod transport;

pub use cli::Cli;
pub use config::{ClientConfig, ConnectionSettings, ReconnectPolicy};
pub use connection::ConnectionHandle;
pub use correlator::{Correlator, PendingResponse, SubscriptionId};
pub use error::{ClientError, ClientResult};
pub use facade::InferenceClient;
pub use state::{ConnectionEvent, ConnectionState};
pub use transport::{Connector, Link, LinkPeer, WsConnector};
