//! Deterministic stand-in models.
//!
//! These produce well-formed predictions for every model type so clients
//! can be exercised end to end. The same input always yields the same
//! output (apart from measured processing times).

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use inferlink_core::{
    AnomalyInput, AnomalyReport, BoundingBox, DetectedObject, FusionInput, FusionQuality,
    FusionReport, MAX_PREDICTION_HORIZON, ModelType, ObjectDetectionInput, ObjectDetections,
    SensorStatus, TrajectoryInput, TrajectoryPoint, TrajectoryPrediction,
};
use inferlink_protocol::{InferenceRequest, ProtocolError, ProtocolResult};

/// Confidence reported for a trajectory extrapolated from two or more points.
const TRAJECTORY_CONFIDENCE: f64 = 0.9;

/// Confidence assigned to an active sensor during fusion.
const ACTIVE_SENSOR_CONFIDENCE: f64 = 0.95;

/// Weight of sensors without an explicit entry.
const DEFAULT_SENSOR_WEIGHT: f64 = 0.2;

const OBJECT_CLASSES: [&str; 8] = [
    "car",
    "truck",
    "pedestrian",
    "bicycle",
    "motorcycle",
    "bus",
    "traffic_light",
    "stop_sign",
];

/// Runs the stand-in models.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    anomaly_threshold: f64,
    sensor_weights: HashMap<String, f64>,
}

impl Default for InferenceEngine {
    fn default() -> Self {
        Self::new(0.85)
    }
}

impl InferenceEngine {
    /// Creates an engine flagging anomalies above `anomaly_threshold`.
    pub fn new(anomaly_threshold: f64) -> Self {
        let sensor_weights = [("lidar", 0.4), ("camera", 0.35), ("radar", 0.25)]
            .into_iter()
            .map(|(name, weight)| (name.to_string(), weight))
            .collect();
        Self {
            anomaly_threshold,
            sensor_weights,
        }
    }

    /// Returns the anomaly threshold.
    pub fn anomaly_threshold(&self) -> f64 {
        self.anomaly_threshold
    }

    /// Decodes the request's data for its model, runs it, and returns the
    /// prediction as JSON.
    pub fn infer(&self, request: &InferenceRequest) -> ProtocolResult<Value> {
        debug!(model = %request.model_type, "running model");
        match request.model_type {
            ModelType::TrajectoryPrediction => {
                let input: TrajectoryInput = request.decode_data()?;
                if input.prediction_horizon > MAX_PREDICTION_HORIZON {
                    return Err(ProtocolError::invalid_input(
                        request.model_type,
                        format!(
                            "prediction_horizon {} exceeds the maximum of {}",
                            input.prediction_horizon, MAX_PREDICTION_HORIZON
                        ),
                    ));
                }
                to_json(&self.predict_trajectory(&input))
            }
            ModelType::AnomalyDetection => to_json(&self.detect_anomaly(&request.decode_data()?)),
            ModelType::ObjectDetection => to_json(&self.detect_objects(&request.decode_data()?)),
            ModelType::SensorFusion => to_json(&self.fuse_sensors(&request.decode_data()?)),
        }
    }

    /// Linear extrapolation of the last two points.
    ///
    /// Predicted timestamps are dropped when extrapolating them would
    /// overflow. Callers are expected to bound `prediction_horizon`;
    /// [`InferenceEngine::infer`] caps it at [`MAX_PREDICTION_HORIZON`].
    pub fn predict_trajectory(&self, input: &TrajectoryInput) -> TrajectoryPrediction {
        let [.., prev, last] = input.history.as_slice() else {
            return TrajectoryPrediction {
                predictions: Vec::new(),
                confidence: 0.0,
            };
        };

        let dx = last.x - prev.x;
        let dy = last.y - prev.y;
        let dt = match (prev.timestamp, last.timestamp) {
            (Some(p), Some(l)) => l.checked_sub(p),
            _ => None,
        };

        let predictions = (1..=input.prediction_horizon)
            .map(|step| {
                let k = step as f64;
                TrajectoryPoint {
                    x: last.x + dx * k,
                    y: last.y + dy * k,
                    timestamp: last.timestamp.zip(dt).and_then(|(t, dt)| {
                        i64::try_from(step)
                            .ok()
                            .and_then(|step| dt.checked_mul(step))
                            .and_then(|offset| t.checked_add(offset))
                    }),
                }
            })
            .collect();

        TrajectoryPrediction {
            predictions,
            confidence: TRAJECTORY_CONFIDENCE,
        }
    }

    /// Scores each sensor by its coefficient of variation and averages.
    pub fn detect_anomaly(&self, input: &AnomalyInput) -> AnomalyReport {
        let sensor_scores: Vec<(String, f64)> = input
            .sensor_readings
            .iter()
            .map(|reading| (reading.sensor_type.clone(), variation_score(&reading.values)))
            .collect();

        let anomaly_score = if sensor_scores.is_empty() {
            0.0
        } else {
            sensor_scores.iter().map(|(_, s)| s).sum::<f64>() / sensor_scores.len() as f64
        };

        AnomalyReport {
            anomaly_score,
            is_anomaly: anomaly_score > self.anomaly_threshold,
            threshold: self.anomaly_threshold,
            sensor_scores,
        }
    }

    /// Produces a scene derived from the frame id.
    pub fn detect_objects(&self, input: &ObjectDetectionInput) -> ObjectDetections {
        let start = Instant::now();
        let mut rng = SceneRng::from_frame(&input.frame_id);

        let count = if input.simulate_complex {
            rng.range(5, 15)
        } else {
            rng.range(2, 8)
        };

        let objects = (0..count)
            .map(|i| DetectedObject {
                id: format!("obj_{}", i),
                class_name: OBJECT_CLASSES[rng.range(0, OBJECT_CLASSES.len())].to_string(),
                confidence: 0.7 + rng.unit() * 0.3,
                bounding_box: BoundingBox {
                    x: -50.0 + rng.unit() * 100.0,
                    y: -50.0 + rng.unit() * 100.0,
                    width: 5.0 + rng.unit() * 15.0,
                    height: 5.0 + rng.unit() * 15.0,
                },
            })
            .collect();

        ObjectDetections {
            frame_id: input.frame_id.clone(),
            objects,
            processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        }
    }

    /// Weighted confidence over active sensors.
    pub fn fuse_sensors(&self, input: &FusionInput) -> FusionReport {
        let mut total_weight = 0.0;
        let mut weighted_confidence = 0.0;

        let sensor_statuses = input
            .sensor_data
            .iter()
            .map(|(sensor_type, &is_active)| {
                let confidence = if is_active { ACTIVE_SENSOR_CONFIDENCE } else { 0.0 };
                if is_active {
                    let weight = self
                        .sensor_weights
                        .get(sensor_type)
                        .copied()
                        .unwrap_or(DEFAULT_SENSOR_WEIGHT);
                    total_weight += weight;
                    weighted_confidence += weight * confidence;
                }
                SensorStatus {
                    sensor_type: sensor_type.clone(),
                    is_active,
                    confidence,
                    last_update: input.timestamp,
                }
            })
            .collect();

        let overall_confidence = if total_weight > 0.0 {
            weighted_confidence / total_weight
        } else {
            0.0
        };

        FusionReport {
            overall_confidence,
            sensor_statuses,
            fusion_quality: FusionQuality::from_confidence(overall_confidence),
        }
    }
}

fn to_json<T: Serialize>(output: &T) -> ProtocolResult<Value> {
    serde_json::to_value(output).map_err(ProtocolError::Encode)
}

/// Standard deviation over mean magnitude; zero for empty input.
fn variation_score(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() / (mean.abs() + 0.001)
}

/// SplitMix64 seeded from an FNV-1a hash of the frame id.
struct SceneRng(u64);

impl SceneRng {
    fn from_frame(frame_id: &str) -> Self {
        let seed = frame_id
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
                (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
            });
        Self(seed)
    }

    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Uniform in `[0, 1)`.
    fn unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform in `[low, high)`.
    fn range(&mut self, low: usize, high: usize) -> usize {
        low + (self.next_u64() % (high - low) as u64) as usize
    }
}
