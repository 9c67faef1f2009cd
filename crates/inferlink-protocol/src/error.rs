//! Protocol error types.

use inferlink_core::ModelType;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds the maximum allowed size.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// Inbound frame is not a valid envelope.
    #[error("malformed frame: {0}")]
    Decode(#[source] serde_json::Error),

    /// Empty frame received.
    #[error("empty message")]
    EmptyMessage,

    /// Request data or prediction does not match the model's record shape.
    #[error("invalid {model_type} payload: {source}")]
    InvalidPayload {
        model_type: ModelType,
        #[source]
        source: serde_json::Error,
    },

    /// Request data parsed but holds a value the model refuses to run.
    #[error("invalid {model_type} input: {reason}")]
    InvalidInput {
        model_type: ModelType,
        reason: String,
    },
}

impl ProtocolError {
    /// Creates an invalid payload error for the given model.
    pub fn invalid_payload(model_type: ModelType, source: serde_json::Error) -> Self {
        Self::InvalidPayload { model_type, source }
    }

    /// Creates an invalid input error for the given model.
    pub fn invalid_input(model_type: ModelType, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            model_type,
            reason: reason.into(),
        }
    }

    /// Returns true if the request itself was at fault.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::InvalidPayload { .. } | Self::InvalidInput { .. })
    }

    /// Returns true if this error came from an unreadable inbound frame.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::EmptyMessage | Self::MessageTooLarge { .. })
    }
}
