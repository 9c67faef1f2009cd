//! Core types: model kinds, inference records, tracing

pub mod model;
pub mod tracing;

pub use model::{
    AnomalyInput, AnomalyReport, BoundingBox, DEFAULT_PREDICTION_HORIZON, DetectedObject,
    FusionInput, FusionQuality, FusionReport, MAX_PREDICTION_HORIZON, ModelType,
    ObjectDetectionInput, ObjectDetections, SensorReading, SensorStatus, TrajectoryInput,
    TrajectoryPoint, TrajectoryPrediction, now_millis,
};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
