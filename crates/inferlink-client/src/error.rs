//! Client error types.

use std::fmt;
use std::time::Duration;

use inferlink_core::ModelType;
use inferlink_protocol::ProtocolError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// Opening the socket failed.
    Connect(String),
    /// Encoding or payload error.
    Protocol(ProtocolError),
    /// No matching response arrived before the deadline.
    RequestTimeout {
        request_id: String,
        model_type: ModelType,
        timeout: Duration,
    },
    /// A frame could not be sent because the socket is not open.
    SendFailure(String),
    /// The socket closed while the request was waiting.
    DisconnectedWhilePending { request_id: String },
    /// The server answered with an error envelope.
    Server(String),
    /// The prediction does not have the expected shape.
    UnexpectedPrediction(String),
    /// IO error.
    Io(std::io::Error),
}

impl ClientError {
    /// Returns true if the request was abandoned without an answer.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Connect(msg) => write!(f, "connection failed: {}", msg),
            Self::Protocol(err) => write!(f, "protocol error: {}", err),
            Self::RequestTimeout {
                request_id,
                model_type,
                timeout,
            } => write!(
                f,
                "request {} ({}) timed out after {}ms",
                request_id,
                model_type,
                timeout.as_millis()
            ),
            Self::SendFailure(msg) => write!(f, "send failed: {}", msg),
            Self::DisconnectedWhilePending { request_id } => {
                write!(f, "disconnected while request {} was pending", request_id)
            }
            Self::Server(msg) => write!(f, "server error: {}", msg),
            Self::UnexpectedPrediction(msg) => write!(f, "unexpected prediction: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Protocol(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display() {
        let err = ClientError::RequestTimeout {
            request_id: "trajectory_prediction_1_a".into(),
            model_type: ModelType::TrajectoryPrediction,
            timeout: Duration::from_millis(5000),
        };
        assert_eq!(
            err.to_string(),
            "request trajectory_prediction_1_a (trajectory_prediction) timed out after 5000ms"
        );
        assert!(err.is_timeout());
    }

    #[test]
    fn protocol_error_has_source() {
        use std::error::Error;
        let err = ClientError::from(ProtocolError::EmptyMessage);
        assert!(err.source().is_some());
        assert!(!err.is_timeout());
    }
}
