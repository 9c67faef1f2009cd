//! Request handler for the reference server.
//!
//! Turns each decoded envelope into at most one reply envelope.

use std::time::Instant;

use tracing::{debug, warn};

use inferlink_protocol::{
    Envelope, ErrorPayload, InferenceRequest, InferenceResponse, ProtocolResult,
};

use crate::config::ServerConfig;
use crate::engine::InferenceEngine;

/// Handles client envelopes.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    engine: InferenceEngine,
    echo_request_id: bool,
}

impl RequestHandler {
    /// Creates a handler from the server configuration.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            engine: InferenceEngine::new(config.anomaly_threshold),
            echo_request_id: config.echo_request_id,
        }
    }

    /// Returns the engine used for inference.
    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    /// Handles one envelope, returning the reply to send back.
    pub fn handle(&self, envelope: Envelope) -> Option<Envelope> {
        match envelope {
            Envelope::InferenceRequest(request) => Some(self.handle_inference(request)),
            Envelope::Heartbeat(_) => Some(Envelope::heartbeat()),
            other => {
                debug!(message_type = ?other.message_type(), "Ignoring unexpected message");
                None
            }
        }
    }

    /// Runs one inference and wraps the prediction in a response.
    ///
    /// The response never carries a request id; the WebSocket path adds it
    /// when echoing is enabled.
    pub fn respond(&self, request: &InferenceRequest) -> ProtocolResult<InferenceResponse> {
        let start = Instant::now();
        let prediction = self.engine.infer(request)?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            model = %request.model_type,
            request_id = ?request.request_id,
            latency_ms,
            "Inference complete"
        );
        Ok(InferenceResponse::new(request.model_type, prediction).with_latency(latency_ms))
    }

    fn handle_inference(&self, request: InferenceRequest) -> Envelope {
        let request_id = if self.echo_request_id {
            request.request_id.clone()
        } else {
            None
        };

        match self.respond(&request) {
            Ok(response) => Envelope::InferenceResponse(response.with_request_id(request_id)),
            Err(e) => {
                warn!(model = %request.model_type, error = %e, "Inference failed");
                Envelope::Error(ErrorPayload::for_request(
                    e.to_string(),
                    request.model_type,
                    request_id,
                ))
            }
        }
    }
}

impl Default for RequestHandler {
    fn default() -> Self {
        Self::new(&ServerConfig::default())
    }
}
