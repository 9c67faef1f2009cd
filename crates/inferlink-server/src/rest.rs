//! REST routes served next to the WebSocket endpoint.
//!
//! `POST /api/inference/{model}` takes the model's `data` object as its body
//! and answers with the same response record the WebSocket path sends,
//! without a request id.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::warn;

use inferlink_core::ModelType;
use inferlink_protocol::InferenceRequest;

use crate::handler::RequestHandler;

/// Liveness check path.
pub const HEALTH_PATH: &str = "/health";

/// Model listing path.
pub const MODELS_PATH: &str = "/api/models";

/// Prefix of the per-model inference routes.
pub const INFERENCE_PREFIX: &str = "/api/inference";

pub(crate) const INFERENCE_ROUTE: &str = "/api/inference/:model";

/// Maps a route segment to its model.
pub fn model_from_route(name: &str) -> Option<ModelType> {
    match name {
        "trajectory" => Some(ModelType::TrajectoryPrediction),
        "anomaly" => Some(ModelType::AnomalyDetection),
        "objects" => Some(ModelType::ObjectDetection),
        "fusion" => Some(ModelType::SensorFusion),
        _ => None,
    }
}

pub(crate) async fn health() -> &'static str {
    "inferlink server is running"
}

pub(crate) async fn list_models() -> Json<[ModelType; 4]> {
    Json(ModelType::ALL)
}

pub(crate) async fn inference(
    Path(model): Path<String>,
    State(handler): State<Arc<RequestHandler>>,
    Json(data): Json<Value>,
) -> Response {
    let Some(model_type) = model_from_route(&model) else {
        return (StatusCode::BAD_REQUEST, format!("Unknown model: {}", model)).into_response();
    };

    match handler.respond(&InferenceRequest::from_value(model_type, data)) {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            warn!(model = %model_type, error = %e, "REST inference failed");
            let status = if e.is_bad_request() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, e.to_string()).into_response()
        }
    }
}
