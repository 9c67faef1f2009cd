//! Wire protocol for inferlink.
//!
//! Client and server exchange JSON text frames over a persistent WebSocket.
//! Each frame holds one [`Envelope`]:
//!
//! ```json
//! {"message_type": "inference_request",
//!  "payload": {"model_type": "trajectory_prediction", "data": {...}, "request_id": "..."}}
//! ```
//!
//! `message_type` is one of `inference_request`, `inference_response`,
//! `heartbeat` or `error`. The optional `request_id` lets a cooperating
//! server tie each response to the request that caused it; peers that do not
//! know the field ignore it.
//!
//! # Example
//!
//! ```rust
//! use inferlink_core::{ModelType, TrajectoryInput, TrajectoryPoint};
//! use inferlink_protocol::{decode, encode, Envelope, InferenceRequest};
//!
//! let input = TrajectoryInput::new(vec![TrajectoryPoint::new(0.0, 0.0)]);
//! let request = InferenceRequest::new(ModelType::TrajectoryPrediction, &input).unwrap();
//! let frame = encode(&Envelope::InferenceRequest(request)).unwrap();
//! let decoded = decode(&frame).unwrap();
//! assert_eq!(decoded.request_id(), None);
//! ```

mod codec;
mod error;
mod types;

pub use codec::{decode, encode};
pub use error::{ProtocolError, ProtocolResult};
pub use types::{
    Envelope, ErrorPayload, Heartbeat, InferenceRequest, InferenceResponse, MessageType,
};

/// Maximum frame size (1 MiB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Default endpoint of the inference server.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws";
