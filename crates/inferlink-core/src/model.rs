//! Model kinds and the typed records exchanged with the inference server.
//!
//! Field names match the wire names produced and consumed by the server, so
//! every record here can be converted to and from the `data` / `prediction`
//! JSON objects carried in protocol envelopes.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Default number of future points requested from the trajectory model.
pub const DEFAULT_PREDICTION_HORIZON: usize = 20;

/// Largest prediction horizon a server will extrapolate.
pub const MAX_PREDICTION_HORIZON: usize = 1000;

/// The simulated models a server can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Predicts future positions from a position history.
    TrajectoryPrediction,
    /// Scores sensor readings for anomalies.
    AnomalyDetection,
    /// Detects objects in a camera frame.
    ObjectDetection,
    /// Combines sensor liveness into a fused confidence.
    SensorFusion,
}

impl ModelType {
    /// All model types, in declaration order.
    pub const ALL: [ModelType; 4] = [
        ModelType::TrajectoryPrediction,
        ModelType::AnomalyDetection,
        ModelType::ObjectDetection,
        ModelType::SensorFusion,
    ];

    /// Returns the wire name of this model type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrajectoryPrediction => "trajectory_prediction",
            Self::AnomalyDetection => "anomaly_detection",
            Self::ObjectDetection => "object_detection",
            Self::SensorFusion => "sensor_fusion",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the current time as unix milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Trajectory prediction
// ---------------------------------------------------------------------------

/// A 2D position, optionally stamped with unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl TrajectoryPoint {
    /// Creates an unstamped point.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            timestamp: None,
        }
    }

    /// Builder: set the timestamp.
    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Input for the trajectory model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryInput {
    pub history: Vec<TrajectoryPoint>,
    #[serde(default = "default_horizon")]
    pub prediction_horizon: usize,
}

fn default_horizon() -> usize {
    DEFAULT_PREDICTION_HORIZON
}

impl TrajectoryInput {
    /// Creates an input with the default prediction horizon.
    pub fn new(history: Vec<TrajectoryPoint>) -> Self {
        Self {
            history,
            prediction_horizon: DEFAULT_PREDICTION_HORIZON,
        }
    }

    /// Builder: set the prediction horizon.
    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.prediction_horizon = horizon;
        self
    }
}

/// Output of the trajectory model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPrediction {
    pub predictions: Vec<TrajectoryPoint>,
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Anomaly detection
// ---------------------------------------------------------------------------

/// A batch of values from one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_type: String,
    pub values: Vec<f64>,
    pub timestamp: i64,
}

impl SensorReading {
    /// Creates a reading stamped with the current time.
    pub fn new(sensor_type: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            sensor_type: sensor_type.into(),
            values,
            timestamp: now_millis(),
        }
    }
}

/// Input for the anomaly model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyInput {
    pub sensor_readings: Vec<SensorReading>,
}

/// Output of the anomaly model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub anomaly_score: f64,
    pub is_anomaly: bool,
    pub threshold: f64,
    /// Per-sensor scores as `(sensor_type, score)` pairs.
    pub sensor_scores: Vec<(String, f64)>,
}

// ---------------------------------------------------------------------------
// Object detection
// ---------------------------------------------------------------------------

/// Input for the object detection model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetectionInput {
    pub frame_id: String,
    pub timestamp: i64,
    #[serde(default)]
    pub simulate_complex: bool,
}

impl ObjectDetectionInput {
    /// Creates an input for a simple scene, stamped with the current time.
    pub fn new(frame_id: impl Into<String>) -> Self {
        Self {
            frame_id: frame_id.into(),
            timestamp: now_millis(),
            simulate_complex: false,
        }
    }

    /// Builder: request a busier scene.
    pub fn with_complex(mut self, complex: bool) -> Self {
        self.simulate_complex = complex;
        self
    }
}

/// Axis-aligned box in scene coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One detection in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub id: String,
    pub class_name: String,
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

/// Output of the object detection model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetections {
    pub frame_id: String,
    pub objects: Vec<DetectedObject>,
    pub processing_time_ms: f64,
}

// ---------------------------------------------------------------------------
// Sensor fusion
// ---------------------------------------------------------------------------

/// Input for the fusion model: which sensors are currently active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionInput {
    pub sensor_data: BTreeMap<String, bool>,
    pub timestamp: i64,
}

impl FusionInput {
    /// Creates an input stamped with the current time.
    pub fn new(sensor_data: BTreeMap<String, bool>) -> Self {
        Self {
            sensor_data,
            timestamp: now_millis(),
        }
    }
}

/// Fused view of a single sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorStatus {
    pub sensor_type: String,
    pub is_active: bool,
    pub confidence: f64,
    pub last_update: i64,
}

/// Qualitative band of the fused confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl FusionQuality {
    /// Maps an overall confidence to its band.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            Self::Excellent
        } else if confidence >= 0.6 {
            Self::Good
        } else if confidence >= 0.4 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

/// Output of the fusion model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionReport {
    pub overall_confidence: f64,
    pub sensor_statuses: Vec<SensorStatus>,
    pub fusion_quality: FusionQuality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_type_wire_names() {
        for model in ModelType::ALL {
            let json = serde_json::to_string(&model).unwrap();
            assert_eq!(json, format!("\"{}\"", model.as_str()));
            assert_eq!(model.to_string(), model.as_str());
        }
    }

    #[test]
    fn trajectory_point_without_timestamp() {
        let point: TrajectoryPoint = serde_json::from_str(r#"{"x":2,"y":2}"#).unwrap();
        assert_eq!(point, TrajectoryPoint::new(2.0, 2.0));

        let json = serde_json::to_string(&point).unwrap();
        assert_eq!(json, r#"{"x":2.0,"y":2.0}"#);
    }

    #[test]
    fn trajectory_input_default_horizon() {
        let input: TrajectoryInput = serde_json::from_str(r#"{"history":[]}"#).unwrap();
        assert_eq!(input.prediction_horizon, DEFAULT_PREDICTION_HORIZON);

        let input = TrajectoryInput::new(vec![]).with_horizon(5);
        assert_eq!(input.prediction_horizon, 5);
    }

    #[test]
    fn object_detection_input_defaults() {
        let input = ObjectDetectionInput::new("frame-1");
        assert!(!input.simulate_complex);
        assert!(input.timestamp > 0);

        let parsed: ObjectDetectionInput =
            serde_json::from_str(r#"{"frame_id":"f","timestamp":1}"#).unwrap();
        assert!(!parsed.simulate_complex);
    }

    #[test]
    fn anomaly_report_sensor_scores_are_pairs() {
        let report = AnomalyReport {
            anomaly_score: 0.5,
            is_anomaly: false,
            threshold: 0.85,
            sensor_scores: vec![("lidar".to_string(), 0.5)],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["sensor_scores"][0][0], "lidar");
        assert_eq!(json["sensor_scores"][0][1], 0.5);
    }

    #[test]
    fn fusion_quality_bands() {
        assert_eq!(FusionQuality::from_confidence(0.95), FusionQuality::Excellent);
        assert_eq!(FusionQuality::from_confidence(0.8), FusionQuality::Excellent);
        assert_eq!(FusionQuality::from_confidence(0.7), FusionQuality::Good);
        assert_eq!(FusionQuality::from_confidence(0.4), FusionQuality::Fair);
        assert_eq!(FusionQuality::from_confidence(0.1), FusionQuality::Poor);
        assert_eq!(
            serde_json::to_string(&FusionQuality::Excellent).unwrap(),
            r#""excellent""#
        );
    }
}
