//! Envelope and payload types for the inferlink wire protocol.

use chrono::{DateTime, Utc};
use inferlink_core::ModelType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};

/// Tag carried in the `message_type` field of every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    InferenceRequest,
    InferenceResponse,
    Heartbeat,
    Error,
}

/// Unit of wire exchange.
///
/// Serialized as `{"message_type": "...", "payload": {...}}` where the
/// payload shape is selected by the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", content = "payload", rename_all = "snake_case")]
pub enum Envelope {
    /// Client asks a model for a prediction.
    InferenceRequest(InferenceRequest),
    /// Server answers an inference request.
    InferenceResponse(InferenceResponse),
    /// Liveness ping, sent by both sides.
    Heartbeat(Heartbeat),
    /// Server-side failure report.
    Error(ErrorPayload),
}

impl Envelope {
    /// Returns the tag of this envelope.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::InferenceRequest(_) => MessageType::InferenceRequest,
            Self::InferenceResponse(_) => MessageType::InferenceResponse,
            Self::Heartbeat(_) => MessageType::Heartbeat,
            Self::Error(_) => MessageType::Error,
        }
    }

    /// Creates a heartbeat stamped with the current time.
    pub fn heartbeat() -> Self {
        Self::Heartbeat(Heartbeat::now())
    }

    /// Creates an error envelope not tied to any request.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload::new(message))
    }

    /// Returns the correlation id carried by this envelope, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::InferenceRequest(req) => req.request_id.as_deref(),
            Self::InferenceResponse(resp) => resp.request_id.as_deref(),
            Self::Error(err) => err.request_id.as_deref(),
            Self::Heartbeat(_) => None,
        }
    }
}

/// Payload of an `inference_request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub model_type: ModelType,
    /// Model-specific input record.
    pub data: Value,
    /// Pending-request id; a cooperating server echoes it in the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl InferenceRequest {
    /// Creates a request from a typed input record.
    pub fn new<T: Serialize>(model_type: ModelType, data: &T) -> ProtocolResult<Self> {
        let data = serde_json::to_value(data).map_err(ProtocolError::Encode)?;
        Ok(Self::from_value(model_type, data))
    }

    /// Creates a request from an already built JSON record.
    pub fn from_value(model_type: ModelType, data: Value) -> Self {
        Self {
            model_type,
            data,
            request_id: None,
        }
    }

    /// Builder: attach a correlation id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Decodes the input record into its typed form.
    pub fn decode_data<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| ProtocolError::invalid_payload(self.model_type, e))
    }
}

/// Payload of an `inference_response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub model_type: ModelType,
    /// Model-specific output record.
    pub prediction: Value,
    /// Echo of the request's correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Server-side processing time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl InferenceResponse {
    /// Creates a response with only the mandatory fields.
    pub fn new(model_type: ModelType, prediction: Value) -> Self {
        Self {
            model_type,
            prediction,
            request_id: None,
            latency_ms: None,
            timestamp: None,
        }
    }

    /// Builder: echo a correlation id.
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Builder: record processing latency and the current time.
    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self.timestamp = Some(Utc::now());
        self
    }

    /// Decodes the prediction into its typed form.
    pub fn decode_prediction<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        serde_json::from_value(self.prediction.clone())
            .map_err(|e| ProtocolError::invalid_payload(self.model_type, e))
    }
}

/// Payload of a `heartbeat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Sender's clock, ISO-8601.
    pub timestamp: DateTime<Utc>,
}

impl Heartbeat {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
        }
    }
}

/// Payload of an `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    /// Id of the request that failed, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<ModelType>,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            request_id: None,
            model_type: None,
        }
    }

    /// Creates an error tied to a specific request.
    pub fn for_request(
        message: impl Into<String>,
        model_type: ModelType,
        request_id: Option<String>,
    ) -> Self {
        Self {
            message: message.into(),
            request_id,
            model_type: Some(model_type),
        }
    }
}

impl std::fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.model_type {
            Some(model) => write!(f, "{}: {}", model, self.message),
            None => f.write_str(&self.message),
        }
    }
}
