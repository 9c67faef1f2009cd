//! Inference commands: connect, send one request, print the result.

use std::collections::BTreeMap;

use serde::Serialize;

use inferlink_core::{ObjectDetectionInput, SensorReading, TrajectoryInput, TrajectoryPoint};

use crate::config::ConnectionSettings;
use crate::error::{ClientError, ClientResult};
use crate::facade::InferenceClient;

/// A single inference to run.
#[derive(Debug, Clone)]
pub enum Inference {
    Trajectory(TrajectoryInput),
    Anomaly(Vec<SensorReading>),
    Objects(ObjectDetectionInput),
    Fusion(BTreeMap<String, bool>),
}

impl Inference {
    pub fn trajectory(points: Vec<TrajectoryPoint>, horizon: usize) -> Self {
        Self::Trajectory(TrajectoryInput::new(points).with_horizon(horizon))
    }

    pub fn fusion(sensors: Vec<(String, bool)>) -> Self {
        Self::Fusion(sensors.into_iter().collect())
    }
}

/// Connects, runs the inference and prints the prediction as pretty JSON.
pub async fn run(settings: ConnectionSettings, inference: Inference) -> ClientResult<()> {
    let client = InferenceClient::new(settings);
    client.connect().await?;

    let output = match inference {
        Inference::Trajectory(input) => to_pretty(&client.predict_trajectory(input).await?),
        Inference::Anomaly(readings) => to_pretty(&client.detect_anomaly(readings).await?),
        Inference::Objects(input) => to_pretty(&client.detect_objects(input).await?),
        Inference::Fusion(sensors) => to_pretty(&client.fuse_sensors(sensors).await?),
    }?;

    client.disconnect().await;
    println!("{}", output);
    Ok(())
}

fn to_pretty<T: Serialize>(value: &T) -> ClientResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ClientError::UnexpectedPrediction(format!("failed to render output: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fusion_collects_sensor_map() {
        let Inference::Fusion(map) = Inference::fusion(vec![
            ("radar".into(), false),
            ("camera".into(), true),
        ]) else {
            panic!("expected fusion");
        };
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("camera"), Some(&true));
    }

    #[test]
    fn trajectory_applies_horizon() {
        let Inference::Trajectory(input) =
            Inference::trajectory(vec![TrajectoryPoint::new(0.0, 0.0)], 4)
        else {
            panic!("expected trajectory");
        };
        assert_eq!(input.prediction_horizon, 4);
    }
}
